// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The bytecode representation of a compiled RXL program.

A [`Prog`] is one flat instruction stream (the top level statements) plus a
constant [`Pool`]: interned string literals, the function table, the struct
template table and the thunk table holding the compiled bodies of `::=`
expressions. All jump operands are absolute instruction indices inside
their chunk; the compiler patches forward jumps, there are no symbolic
labels at this level.

`Prog::dump()` renders the whole program, including every nested chunk, as
the listing printed by `rxl --dump-bytecode`.
*/

use crate::ast::FieldKind;
use std::fmt;
use std::rc::Rc;

/// One VM instruction.
///
/// Index operands reference the constant pool of the chunk's program;
/// name operands are resolved against the runtime environments.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    PushInt(i32),
    PushChar(i32),
    /// Allocate a fresh char cell array from the interned string literal.
    PushStr(usize),
    /// Pop the length, push a zero filled array.
    NewArray,
    /// Instantiate the named struct template.
    NewStruct(String),

    Load(String),
    Store(String),
    StoreImmut(String),
    /// Store a reactive cell for the named global; operand is the thunk
    /// table index.
    ReactivePut(String, usize),

    /// Pop a base value (or location), push the location of its field.
    FieldLoc(String),
    /// Pop index and base value (or location), push the cell location.
    ElemLoc,
    /// Pop value and location, write the value through.
    PutLoc,
    /// Pop a location, store a reactive cell there.
    ReactivePutLoc(usize),

    GetField(String),
    GetIndex,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    Jump(usize),
    JumpIfZero(usize),

    PushFrame,
    PopFrame,
    ClearFrame,

    /// Bind the function table entry under its declared name.
    DefineFunc(usize),
    /// Register the template table entry under its declared name.
    DefineStruct(usize),
    /// Pop argc arguments and a callee, push the return value.
    Call(usize),
    Ret,

    /// Load and run a module; operand is the interned dotted path.
    Import(usize),

    Print,
    Println,
    Pop,
    Halt,
}

/// A linear run of instructions: the top level stream, a function body, a
/// struct field initializer or a reactive thunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    pub ops: Vec<Op>,
}

/// A compiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncProto {
    pub name: String,
    pub params: Vec<String>,
    pub chunk: Rc<Chunk>,
}

/// The initializer of one struct template field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInit {
    /// Bare declaration; the slot starts as integer zero.
    Zero,
    /// `=` or `:=` initializer, evaluated at instantiation.
    Eager(Rc<Chunk>),
    /// `::=` initializer, stored as a reactive cell without evaluation.
    Reactive(Rc<Chunk>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateField {
    pub name: String,
    pub kind: FieldKind,
    pub init: FieldInit,
}

/// A struct definition: the list of initial field entries copied into
/// every fresh instance. Never consulted again after instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructTemplate {
    pub name: String,
    pub fields: Vec<TemplateField>,
}

/// The constant pool of one compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pool {
    pub strings: Vec<String>,
    pub funcs: Vec<Rc<FuncProto>>,
    pub templates: Vec<Rc<StructTemplate>>,
    pub thunks: Vec<Rc<Chunk>>,
}

/// A compiled program: the top level chunk plus its constant pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Prog {
    pub main: Rc<Chunk>,
    pub pool: Rc<Pool>,
}

/// A chunk bundled with the pool its index operands refer to. Reactive
/// cells and registered functions carry this across module boundaries.
#[derive(Debug, Clone)]
pub struct ChunkRef {
    pub chunk: Rc<Chunk>,
    pub pool: Rc<Pool>,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Op::PushInt(n) => write!(f, "push_int {}", n),
            Op::PushChar(c) => write!(f, "push_char {}", c),
            Op::PushStr(i) => write!(f, "push_str str[{}]", i),
            Op::NewArray => write!(f, "new_array"),
            Op::NewStruct(name) => write!(f, "new_struct {}", name),
            Op::Load(name) => write!(f, "load {}", name),
            Op::Store(name) => write!(f, "store {}", name),
            Op::StoreImmut(name) => write!(f, "store_immut {}", name),
            Op::ReactivePut(name, t) => write!(f, "reactive_put {} thunk[{}]", name, t),
            Op::FieldLoc(name) => write!(f, "field_loc {}", name),
            Op::ElemLoc => write!(f, "elem_loc"),
            Op::PutLoc => write!(f, "put_loc"),
            Op::ReactivePutLoc(t) => write!(f, "reactive_put_loc thunk[{}]", t),
            Op::GetField(name) => write!(f, "get_field {}", name),
            Op::GetIndex => write!(f, "get_index"),
            Op::Add => write!(f, "add"),
            Op::Sub => write!(f, "sub"),
            Op::Mul => write!(f, "mul"),
            Op::Div => write!(f, "div"),
            Op::Rem => write!(f, "rem"),
            Op::Lt => write!(f, "lt"),
            Op::Le => write!(f, "le"),
            Op::Gt => write!(f, "gt"),
            Op::Ge => write!(f, "ge"),
            Op::Eq => write!(f, "eq"),
            Op::Ne => write!(f, "ne"),
            Op::Jump(ip) => write!(f, "jump {}", ip),
            Op::JumpIfZero(ip) => write!(f, "jump_if_zero {}", ip),
            Op::PushFrame => write!(f, "push_frame"),
            Op::PopFrame => write!(f, "pop_frame"),
            Op::ClearFrame => write!(f, "clear_frame"),
            Op::DefineFunc(i) => write!(f, "define_func func[{}]", i),
            Op::DefineStruct(i) => write!(f, "define_struct template[{}]", i),
            Op::Call(argc) => write!(f, "call {}", argc),
            Op::Ret => write!(f, "ret"),
            Op::Import(i) => write!(f, "import str[{}]", i),
            Op::Print => write!(f, "print"),
            Op::Println => write!(f, "println"),
            Op::Pop => write!(f, "pop"),
            Op::Halt => write!(f, "halt"),
        }
    }
}

fn dump_chunk(out: &mut String, chunk: &Chunk, indent: &str) {
    use std::fmt::Write;
    for (i, op) in chunk.ops.iter().enumerate() {
        let _ = writeln!(out, "{}{:4}  {}", indent, i, op);
    }
}

impl Prog {
    /// Renders the instruction listing of the whole program, nested
    /// chunks included. This is what `--dump-bytecode` prints.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let _ = writeln!(out, "main:");
        dump_chunk(&mut out, &self.main, "  ");

        if !self.pool.strings.is_empty() {
            let _ = writeln!(out, "strings:");
            for (i, s) in self.pool.strings.iter().enumerate() {
                let _ = writeln!(out, "  [{}] {:?}", i, s);
            }
        }

        if !self.pool.funcs.is_empty() {
            let _ = writeln!(out, "funcs:");
            for (i, fp) in self.pool.funcs.iter().enumerate() {
                let _ = writeln!(out, "  [{}] {}({})", i, fp.name, fp.params.join(", "));
                dump_chunk(&mut out, &fp.chunk, "    ");
            }
        }

        if !self.pool.templates.is_empty() {
            let _ = writeln!(out, "templates:");
            for (i, tpl) in self.pool.templates.iter().enumerate() {
                let _ = writeln!(out, "  [{}] struct {}", i, tpl.name);
                for tf in &tpl.fields {
                    let kind = match tf.kind {
                        FieldKind::Mutable => "=",
                        FieldKind::Immutable => ":=",
                        FieldKind::Reactive => "::=",
                    };
                    match &tf.init {
                        FieldInit::Zero => {
                            let _ = writeln!(out, "    {} (zero)", tf.name);
                        }
                        FieldInit::Eager(chunk) | FieldInit::Reactive(chunk) => {
                            let _ = writeln!(out, "    {} {}", tf.name, kind);
                            dump_chunk(&mut out, chunk, "      ");
                        }
                    }
                }
            }
        }

        if !self.pool.thunks.is_empty() {
            let _ = writeln!(out, "thunks:");
            for (i, chunk) in self.pool.thunks.iter().enumerate() {
                let _ = writeln!(out, "  [{}]", i);
                dump_chunk(&mut out, chunk, "    ");
            }
        }

        out
    }
}
