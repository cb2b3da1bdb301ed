// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The heap of the RXL runtime: two indexed arenas, one for arrays and one
for structs. Values hold plain integer handles ([`ArrayId`], [`StructId`])
into these arenas, which is what gives the language its by-reference
sharing of heap objects across aliases without any ownership cycles on
the Rust side.

Every addressable slot is a [`Cell`]: either a concrete value or a
reactive cell that re-evaluates its stored expression on each read. A
[`Loc`] names one such slot and doubles as the identity key of the
reactive engine's cycle detection.

Reclamation is a straightforward mark and sweep over both arenas; the VM
hands in its roots and freed slots are reused through free lists, so
handles held by live values stay stable forever.
*/

use crate::reactive::LazyCell;
use crate::value::Value;
use fnv::FnvHashSet;

pub type ArrayId = usize;
pub type StructId = usize;

/// Identity of a storage slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Loc {
    Global(String),
    Elem(ArrayId, usize),
    Field(StructId, String),
    /// Produced when building a location failed (indexing a non-array
    /// and the like). Writes through it are no-ops, reads yield zero;
    /// the diagnostic was already emitted where the location was built.
    Null,
}

/// One storage slot: a concrete value or a reactive cell.
#[derive(Debug, Clone)]
pub enum Cell {
    Value(Value),
    Lazy(LazyCell),
}

impl Cell {
    /// Collects the heap-relevant values held by this cell, for GC
    /// tracing. A reactive cell retains its captured immutable snapshot.
    pub(crate) fn trace(&self, out: &mut Vec<Value>) {
        match self {
            Cell::Value(v) => out.push(v.clone()),
            Cell::Lazy(lc) => out.extend(lc.captured.values().cloned()),
        }
    }
}

#[derive(Debug)]
pub struct ArrayObj {
    pub cells: Vec<Cell>,
}

/// An open struct instance: insertion ordered fields, grown freely at
/// runtime. `frozen` records the fields declared with `:=`, which reject
/// reassignment for the lifetime of the instance.
#[derive(Debug, Default)]
pub struct StructObj {
    fields: Vec<(String, Cell)>,
    pub frozen: FnvHashSet<String>,
}

impl StructObj {
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Writes a field, appending it when it does not exist yet. The
    /// template is not a schema; unknown names are simply new fields.
    pub fn set(&mut self, name: &str, cell: Cell) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, c)) => *c = cell,
            None => self.fields.push((name.to_string(), cell)),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

// Allocation count between collections.
const GC_ALLOC_BUDGET: usize = 65536;

#[derive(Debug, Default)]
pub struct Heap {
    arrays: Vec<Option<ArrayObj>>,
    structs: Vec<Option<StructObj>>,
    free_arrays: Vec<ArrayId>,
    free_structs: Vec<StructId>,
    allocs: usize,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn new_array(&mut self, len: usize) -> ArrayId {
        self.allocs += 1;
        let obj = ArrayObj { cells: vec![Cell::Value(Value::Int(0)); len] };
        match self.free_arrays.pop() {
            Some(id) => {
                self.arrays[id] = Some(obj);
                id
            }
            None => {
                self.arrays.push(Some(obj));
                self.arrays.len() - 1
            }
        }
    }

    pub fn new_struct(&mut self) -> StructId {
        self.allocs += 1;
        match self.free_structs.pop() {
            Some(id) => {
                self.structs[id] = Some(StructObj::default());
                id
            }
            None => {
                self.structs.push(Some(StructObj::default()));
                self.structs.len() - 1
            }
        }
    }

    pub fn array(&self, id: ArrayId) -> Option<&ArrayObj> {
        self.arrays.get(id).and_then(|s| s.as_ref())
    }

    pub fn array_mut(&mut self, id: ArrayId) -> Option<&mut ArrayObj> {
        self.arrays.get_mut(id).and_then(|s| s.as_mut())
    }

    pub fn array_len(&self, id: ArrayId) -> Option<usize> {
        self.array(id).map(|a| a.cells.len())
    }

    pub fn structure(&self, id: StructId) -> Option<&StructObj> {
        self.structs.get(id).and_then(|s| s.as_ref())
    }

    pub fn structure_mut(&mut self, id: StructId) -> Option<&mut StructObj> {
        self.structs.get_mut(id).and_then(|s| s.as_mut())
    }

    /// True when enough allocations piled up that the VM should hand in
    /// its roots for a collection.
    pub fn wants_gc(&self) -> bool {
        self.allocs >= GC_ALLOC_BUDGET
    }

    /// Mark and sweep over both arenas. `roots` must cover every value
    /// reachable outside the heap itself: the operand stack, the global
    /// environment, all immutable frames (saved call scopes included)
    /// and in-flight locations.
    pub fn collect(&mut self, roots: Vec<Value>) {
        let mut amark = vec![false; self.arrays.len()];
        let mut smark = vec![false; self.structs.len()];

        let mut work = roots;
        while let Some(v) = work.pop() {
            match v {
                Value::Array(id) | Value::Str(id) => {
                    if let Some(false) = amark.get(id).copied() {
                        amark[id] = true;
                        if let Some(arr) = self.array(id) {
                            for cell in &arr.cells {
                                cell.trace(&mut work);
                            }
                        }
                    }
                }
                Value::Struct(id) => {
                    if let Some(false) = smark.get(id).copied() {
                        smark[id] = true;
                        if let Some(obj) = self.structure(id) {
                            for (_, cell) in &obj.fields {
                                cell.trace(&mut work);
                            }
                        }
                    }
                }
                Value::Loc(Loc::Elem(id, _)) => work.push(Value::Array(id)),
                Value::Loc(Loc::Field(id, _)) => work.push(Value::Struct(id)),
                _ => (),
            }
        }

        for (id, slot) in self.arrays.iter_mut().enumerate() {
            if slot.is_some() && !amark[id] {
                *slot = None;
                self.free_arrays.push(id);
            }
        }
        for (id, slot) in self.structs.iter_mut().enumerate() {
            if slot.is_some() && !smark[id] {
                *slot = None;
                self.free_structs.push(id);
            }
        }

        self.allocs = 0;
    }

    /// Live object counts, used by debug tracing.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.arrays.iter().filter(|s| s.is_some()).count(),
            self.structs.iter().filter(|s| s.is_some()).count(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_reclaims_unreferenced_objects_and_reuses_slots() {
        let mut heap = Heap::new();
        let keep = heap.new_array(2);
        let drop_ = heap.new_array(2);
        let s = heap.new_struct();
        heap.structure_mut(s)
            .unwrap()
            .set("a", Cell::Value(Value::Array(keep)));

        heap.collect(vec![Value::Struct(s)]);

        assert!(heap.array(keep).is_some());
        assert!(heap.array(drop_).is_none());
        assert!(heap.structure(s).is_some());

        // The freed slot is recycled for the next allocation.
        let fresh = heap.new_array(1);
        assert_eq!(fresh, drop_);
    }

    #[test]
    fn open_struct_appends_unknown_fields_in_order() {
        let mut heap = Heap::new();
        let s = heap.new_struct();
        let obj = heap.structure_mut(s).unwrap();
        obj.set("x", Cell::Value(Value::Int(1)));
        obj.set("y", Cell::Value(Value::Int(2)));
        obj.set("x", Cell::Value(Value::Int(3)));
        let names: Vec<&str> = obj.field_names().collect();
        assert_eq!(names, vec!["x", "y"]);
    }
}
