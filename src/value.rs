// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The runtime value representation of RXL.

Every expression evaluates to a [`Value`]. Heap objects (arrays, strings,
structs) are referenced by arena handles from [`crate::heap`], so aliasing
a value aliases the object. Strings are arrays of chars that keep a
separate tag so the print sink can tell them apart from plain arrays.
*/

use crate::heap::{ArrayId, Heap, Loc, StructId};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    /// A char code point. Distinguishable from `Int` for printing, but
    /// transparently usable in integer arithmetic.
    Char(i32),
    Array(ArrayId),
    /// An array of chars; same cell arena as `Array`.
    Str(ArrayId),
    Struct(StructId),
    /// Index into the VM's function registry.
    Func(usize),
    /// Produced by statements; never observable from user programs.
    Unit,
    /// An assignment target built by l-value instructions. Internal.
    Loc(Loc),
}

impl Value {
    pub fn is_char(&self) -> bool {
        matches!(self, Value::Char(_))
    }

    /// Integer context coercion: arrays and strings coerce to their
    /// length, chars to their code point. `None` is a type mismatch,
    /// which callers report and replace with the zero sentinel.
    pub fn as_int(&self, heap: &Heap) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Char(c) => Some(*c),
            Value::Array(id) | Value::Str(id) => {
                Some(heap.array_len(*id).unwrap_or(0) as i32)
            }
            Value::Struct(_) | Value::Func(_) | Value::Unit | Value::Loc(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Char(_) => "char",
            Value::Array(_) => "array",
            Value::Str(_) => "string",
            Value::Struct(_) => "struct",
            Value::Func(_) => "function",
            Value::Unit => "unit",
            Value::Loc(_) => "location",
        }
    }
}
