// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The reactive engine: storage and on-read evaluation of `::=` cells.

A reactive assignment stores a [`LazyCell`] at a location: the compiled
thunk of the right hand side plus a snapshot of the immutable `:=` frames
that were visible at assignment time. Nothing is evaluated at assignment.
Every read of the location replays the thunk against the *current* state
of the world: global locations resolve live, captured immutables resolve
to their snapshot, and reads of other reactive locations recurse. This is
the pull model: dependencies, not snapshots.

The dependency graph is never materialized. Cycles are caught by a set of
locations currently being forced: re-entering one breaks the read with an
`Int(0)` sentinel and a warning instead of recursing forever.
*/

use crate::heap::{Cell, Loc};
use crate::ops::ChunkRef;
use crate::value::Value;
use crate::vm::Vm;
use crate::RxError;
use fnv::FnvHashMap;
use std::fmt;
use tracing::warn;

/// A reactive cell: an unevaluated expression plus the immutable context
/// captured when it was stored.
#[derive(Clone)]
pub struct LazyCell {
    pub code: ChunkRef,
    pub captured: FnvHashMap<String, Value>,
}

impl fmt::Debug for LazyCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut keys: Vec<&str> = self.captured.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        write!(f, "LazyCell(cap={:?})", keys)
    }
}

impl Vm {
    /// Resolves an identifier the way `Load` sees the world: immutable
    /// frames innermost first, then the global environment. Values bound
    /// to locations (struct sibling bindings) read through. An unbound
    /// name is a recoverable fault yielding zero.
    pub(crate) fn lookup_var(&mut self, name: &str) -> Result<Value, RxError> {
        for i in (0..self.frames.len()).rev() {
            if let Some(v) = self.frames[i].get(name) {
                let v = v.clone();
                return match v {
                    Value::Loc(loc) => self.read_loc(&loc),
                    other => Ok(other),
                };
            }
        }

        if self.globals.contains_key(name) {
            return self.read_loc(&Loc::Global(name.to_string()));
        }

        warn!("undefined variable `{}`", name);
        Ok(Value::Int(0))
    }

    /// Reads the cell a location names, forcing it when it is reactive.
    /// All failure modes are recoverable and yield `Int(0)`.
    pub(crate) fn read_loc(&mut self, loc: &Loc) -> Result<Value, RxError> {
        let cell = match loc {
            Loc::Global(name) => match self.globals.get(name) {
                Some(c) => c.clone(),
                None => return Ok(Value::Int(0)),
            },
            Loc::Elem(id, idx) => {
                match self.heap.array(*id).and_then(|a| a.cells.get(*idx)) {
                    Some(c) => c.clone(),
                    None => {
                        warn!(
                            "array read out of bounds: index {}, length {}",
                            idx,
                            self.heap.array_len(*id).unwrap_or(0)
                        );
                        return Ok(Value::Int(0));
                    }
                }
            }
            Loc::Field(id, field) => {
                // Open structs: a missing field reads as zero, silently.
                match self.heap.structure(*id).and_then(|s| s.get(field)) {
                    Some(c) => c.clone(),
                    None => return Ok(Value::Int(0)),
                }
            }
            Loc::Null => return Ok(Value::Int(0)),
        };

        match cell {
            Cell::Value(v) => Ok(v),
            Cell::Lazy(lc) => self.force(loc.clone(), lc),
        }
    }

    /// Evaluates a reactive cell in the reader's observation context.
    ///
    /// Frame layout during evaluation, innermost last:
    /// the reader's own frames, the assignment time snapshot, and for
    /// struct fields a synthesized frame binding every sibling field to
    /// its location on the instance.
    fn force(&mut self, loc: Loc, lc: LazyCell) -> Result<Value, RxError> {
        if !self.forcing.insert(loc.clone()) {
            warn!("reactive cycle detected at {:?}", loc);
            return Ok(Value::Int(0));
        }

        self.frames.push(lc.captured.clone());
        let mut pushed = 1;
        if let Loc::Field(id, _) = &loc {
            let siblings = self.sibling_frame(*id);
            self.frames.push(siblings);
            pushed += 1;
        }

        let result = self.run_chunk_value(&lc.code);

        for _ in 0..pushed {
            self.frames.pop();
        }
        self.forcing.remove(&loc);

        result
    }

    /// The synthesized immutable frame a struct's reactive field sees:
    /// every current field of the instance, bound to its location as if
    /// by `:=` for the duration of the evaluation.
    pub(crate) fn sibling_frame(&self, id: usize) -> FnvHashMap<String, Value> {
        let mut frame = FnvHashMap::default();
        if let Some(obj) = self.heap.structure(id) {
            for name in obj.field_names() {
                frame.insert(name.to_string(), Value::Loc(Loc::Field(id, name.to_string())));
            }
        }
        frame
    }

    /// Writes a cell through a location. Out of bounds writes and writes
    /// to frozen fields are no-ops with a diagnostic; unknown struct
    /// fields are appended (open structs).
    pub(crate) fn write_loc(&mut self, loc: &Loc, cell: Cell) {
        match loc {
            Loc::Global(name) => {
                self.globals.insert(name.clone(), cell);
            }
            Loc::Elem(id, idx) => {
                let len = self.heap.array_len(*id).unwrap_or(0);
                match self.heap.array_mut(*id).and_then(|a| a.cells.get_mut(*idx)) {
                    Some(slot) => *slot = cell,
                    None => {
                        warn!("array write out of bounds: index {}, length {}", idx, len);
                    }
                }
            }
            Loc::Field(id, field) => match self.heap.structure_mut(*id) {
                Some(obj) => {
                    if obj.frozen.contains(field) {
                        warn!("cannot assign to immutable field `{}`", field);
                    } else {
                        obj.set(field, cell);
                    }
                }
                None => warn!("write through dangling struct reference"),
            },
            Loc::Null => (),
        }
    }

    /// The immutable frame snapshot stored into reactive cells at
    /// assignment time: all visible frames flattened, inner bindings
    /// shadowing outer ones.
    pub(crate) fn snapshot_frames(&self) -> FnvHashMap<String, Value> {
        let mut snap = FnvHashMap::default();
        for frame in &self.frames {
            for (k, v) in frame {
                snap.insert(k.clone(), v.clone());
            }
        }
        snap
    }
}
