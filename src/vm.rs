// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The stack based virtual machine executing compiled [`crate::ops::Prog`]s.

The VM drives three runtime surfaces:

- the *global environment*, one process wide map from names to cells,
- the *immutable frame chain*, a stack of `:=` binding frames grown by
  blocks and loop iterations and swapped wholesale around function calls,
- the *heap*, two arenas shared by reference across aliases.

Runtime faults are recoverable at the operation level: reads yield an
`Int(0)` sentinel, writes become no-ops, and a diagnostic goes to the
`tracing` subscriber. The only fatal fault is exceeding the call depth
bound, which aborts the run with [`Fault::StackOverflow`].

The forcing half of the reactive engine lives in [`crate::reactive`] as
further methods on [`Vm`].
*/

use crate::ast::FieldKind;
use crate::heap::{Cell, Heap, Loc};
use crate::modules::ModuleLoader;
use crate::ops::{Chunk, ChunkRef, FieldInit, FuncProto, Op, Pool, Prog, StructTemplate};
use crate::reactive::LazyCell;
use crate::value::Value;
use crate::RxError;
use fnv::{FnvHashMap, FnvHashSet};
use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// Bound on the language level call depth. Crossing it is the one fatal
/// runtime fault.
pub const MAX_CALL_DEPTH: usize = 500;

/// Fatal runtime faults. Everything else degrades to sentinels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error("stack overflow: function call depth exceeded {0}")]
    StackOverflow(usize),
}

/// The hook `print`/`println` write through. Receives already formatted
/// text, newline included for `println`.
pub type PrintSink = Box<dyn FnMut(&str)>;

type Frame = FnvHashMap<String, Value>;

pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) globals: FnvHashMap<String, Cell>,
    /// Immutable `:=` frames of the current call, innermost last.
    pub(crate) frames: Vec<Frame>,
    /// Frame chains of the callers of the active calls, kept on the VM
    /// so the garbage collector can reach them.
    pub(crate) saved_scopes: Vec<Vec<Frame>>,
    /// Function registry; `Value::Func` indexes into this.
    pub(crate) funcs: Vec<(Rc<FuncProto>, Rc<Pool>)>,
    /// Struct templates by declared name, registered in execution order.
    pub(crate) templates: FnvHashMap<String, (Rc<StructTemplate>, Rc<Pool>)>,
    pub(crate) heap: Heap,
    /// Locations currently being forced; the reactive cycle detector.
    pub(crate) forcing: FnvHashSet<Loc>,
    pub(crate) loader: ModuleLoader,
    sink: PrintSink,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    /// A VM printing to stdout and resolving imports against the
    /// current directory.
    pub fn new() -> Self {
        Vm {
            stack: Vec::new(),
            globals: FnvHashMap::default(),
            frames: vec![Frame::default()],
            saved_scopes: Vec::new(),
            funcs: Vec::new(),
            templates: FnvHashMap::default(),
            heap: Heap::new(),
            forcing: FnvHashSet::default(),
            loader: ModuleLoader::new(PathBuf::from(".")),
            sink: Box::new(|s| print!("{}", s)),
        }
    }

    pub fn set_print_sink(&mut self, sink: PrintSink) {
        self.sink = sink;
    }

    /// Sets the directory dotted import paths resolve under.
    pub fn set_module_root(&mut self, root: PathBuf) {
        self.loader = ModuleLoader::new(root);
    }

    /// Runs a compiled program to completion or to a fatal fault.
    pub fn run(&mut self, prog: &Prog) -> Result<(), RxError> {
        self.exec_chunk(&prog.main, &prog.pool)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    /// Runs a chunk and returns its value: what `Ret` produced, or zero
    /// for a chunk that fell off its end.
    pub(crate) fn run_chunk_value(&mut self, code: &ChunkRef) -> Result<Value, RxError> {
        Ok(self
            .exec_chunk(&code.chunk, &code.pool)?
            .unwrap_or(Value::Int(0)))
    }

    /// The dispatch loop. Returns `Some(value)` when the chunk executed
    /// a `Ret`, `None` when it ran to its end or hit `Halt`.
    fn exec_chunk(&mut self, chunk: &Chunk, pool: &Rc<Pool>) -> Result<Option<Value>, RxError> {
        let mut pc = 0;

        while pc < chunk.ops.len() {
            match &chunk.ops[pc] {
                Op::PushInt(n) => self.stack.push(Value::Int(*n)),
                Op::PushChar(c) => self.stack.push(Value::Char(*c)),

                Op::PushStr(i) => {
                    self.gc_if_needed();
                    let s = &pool.strings[*i];
                    let id = self.heap.new_array(s.chars().count());
                    {
                        let arr = self.heap.array_mut(id).expect("fresh array");
                        for (ix, ch) in s.chars().enumerate() {
                            arr.cells[ix] = Cell::Value(Value::Char(ch as i32));
                        }
                    }
                    self.stack.push(Value::Str(id));
                }

                Op::NewArray => {
                    let size_v = self.pop();
                    let mut size = self.coerce_int(&size_v);
                    if size < 0 {
                        warn!("array size {} is negative, allocating empty", size);
                        size = 0;
                    }
                    self.gc_if_needed();
                    let id = self.heap.new_array(size as usize);
                    self.stack.push(Value::Array(id));
                }

                Op::NewStruct(name) => {
                    let entry = self.templates.get(name).cloned();
                    let v = match entry {
                        Some((tpl, tpl_pool)) => self.instantiate(&tpl, &tpl_pool)?,
                        None => {
                            warn!("unknown struct type `{}`", name);
                            Value::Int(0)
                        }
                    };
                    self.stack.push(v);
                }

                Op::Load(name) => {
                    let v = self.lookup_var(name)?;
                    self.stack.push(v);
                }

                Op::Store(name) => {
                    let v = self.pop();
                    self.store_global(name, Cell::Value(v));
                }

                Op::StoreImmut(name) => {
                    let v = self.pop();
                    let frame = self.frames.last_mut().expect("immutable root frame");
                    if frame.contains_key(name) {
                        warn!("cannot rebind immutable `{}` in the same scope", name);
                    } else {
                        frame.insert(name.clone(), v);
                    }
                }

                Op::ReactivePut(name, t) => {
                    let cell = self.make_lazy(pool, *t);
                    self.store_global(name, cell);
                }

                Op::FieldLoc(field) => {
                    let base = self.pop();
                    let base = self.deref_loc(base)?;
                    let loc = match base {
                        Value::Struct(id) => Loc::Field(id, field.clone()),
                        other => {
                            warn!("field access on a {} value", other.type_name());
                            Loc::Null
                        }
                    };
                    self.stack.push(Value::Loc(loc));
                }

                Op::ElemLoc => {
                    let idx_v = self.pop();
                    let idx = self.coerce_int(&idx_v);
                    let base = self.pop();
                    let base = self.deref_loc(base)?;
                    let loc = match base {
                        Value::Array(id) | Value::Str(id) => {
                            // Negative indices map to an always out of
                            // bounds slot; the write site diagnoses.
                            Loc::Elem(id, if idx < 0 { usize::MAX } else { idx as usize })
                        }
                        other => {
                            warn!("indexing into a {} value", other.type_name());
                            Loc::Null
                        }
                    };
                    self.stack.push(Value::Loc(loc));
                }

                Op::PutLoc => {
                    let v = self.pop();
                    match self.pop() {
                        Value::Loc(loc) => self.write_loc(&loc, Cell::Value(v)),
                        other => {
                            warn!("assignment target is a {} value", other.type_name())
                        }
                    }
                }

                Op::ReactivePutLoc(t) => {
                    let cell = self.make_lazy(pool, *t);
                    match self.pop() {
                        Value::Loc(loc) => self.write_loc(&loc, cell),
                        other => {
                            warn!("assignment target is a {} value", other.type_name())
                        }
                    }
                }

                Op::GetField(field) => {
                    let base = self.pop();
                    let v = match base {
                        Value::Struct(id) => self.read_loc(&Loc::Field(id, field.clone()))?,
                        other => {
                            warn!("field access on a {} value", other.type_name());
                            Value::Int(0)
                        }
                    };
                    self.stack.push(v);
                }

                Op::GetIndex => {
                    let idx_v = self.pop();
                    let idx = self.coerce_int(&idx_v);
                    let base = self.pop();
                    let v = match base {
                        Value::Array(id) | Value::Str(id) => {
                            let slot = if idx < 0 { usize::MAX } else { idx as usize };
                            self.read_loc(&Loc::Elem(id, slot))?
                        }
                        other => {
                            warn!("indexing into a {} value", other.type_name());
                            Value::Int(0)
                        }
                    };
                    self.stack.push(v);
                }

                Op::Add => self.exec_arith(Arith::Add),
                Op::Sub => self.exec_arith(Arith::Sub),
                Op::Mul => self.exec_arith(Arith::Mul),
                Op::Div => self.exec_arith(Arith::Div),
                Op::Rem => self.exec_arith(Arith::Rem),

                Op::Lt => self.exec_cmp(|a, b| a < b),
                Op::Le => self.exec_cmp(|a, b| a <= b),
                Op::Gt => self.exec_cmp(|a, b| a > b),
                Op::Ge => self.exec_cmp(|a, b| a >= b),
                Op::Eq => self.exec_cmp(|a, b| a == b),
                Op::Ne => self.exec_cmp(|a, b| a != b),

                Op::Jump(target) => {
                    pc = *target;
                    continue;
                }

                Op::JumpIfZero(target) => {
                    let v = self.pop();
                    if self.coerce_int(&v) == 0 {
                        pc = *target;
                        continue;
                    }
                }

                Op::PushFrame => self.frames.push(Frame::default()),
                Op::PopFrame => {
                    self.frames.pop().expect("balanced immutable frames");
                }
                Op::ClearFrame => {
                    self.frames.last_mut().expect("immutable root frame").clear();
                }

                Op::DefineFunc(i) => {
                    let proto = pool.funcs[*i].clone();
                    let name = proto.name.clone();
                    self.funcs.push((proto, pool.clone()));
                    let fid = self.funcs.len() - 1;
                    self.store_global(&name, Cell::Value(Value::Func(fid)));
                }

                Op::DefineStruct(i) => {
                    let tpl = pool.templates[*i].clone();
                    self.templates.insert(tpl.name.clone(), (tpl, pool.clone()));
                }

                Op::Call(argc) => {
                    let mut args = Vec::with_capacity(*argc);
                    for _ in 0..*argc {
                        args.push(self.pop());
                    }
                    args.reverse();
                    let callee = self.pop();
                    let ret = self.call_value(callee, args)?;
                    self.stack.push(ret);
                }

                Op::Ret => return Ok(Some(self.pop())),

                Op::Import(i) => {
                    let dotted = pool.strings[*i].clone();
                    if let Some(module) = self.loader.load(&dotted)? {
                        // Modules execute in the importing program's top
                        // level scope; their definitions land in the
                        // shared global environment.
                        self.exec_chunk(&module.main, &module.pool)?;
                    }
                }

                Op::Print => {
                    let v = self.pop();
                    if let Some(s) = self.render(&v)? {
                        (self.sink)(&s);
                    } else {
                        warn!("cannot print a {} value", v.type_name());
                    }
                }

                Op::Println => {
                    let v = self.pop();
                    if let Some(mut s) = self.render(&v)? {
                        s.push('\n');
                        (self.sink)(&s);
                    } else {
                        warn!("cannot print a {} value", v.type_name());
                    }
                }

                Op::Pop => {
                    self.pop();
                }

                // Halt only terminates top level chunks; their value is
                // the statement result, which is no value at all.
                Op::Halt => return Ok(Some(Value::Unit)),
            }

            pc += 1;
        }

        Ok(None)
    }

    // -----------------------------------------------------------------
    // Stores and calls
    // -----------------------------------------------------------------

    /// `=` and `::=` on a bare identifier target the global location,
    /// also from inside functions, unless an immutable binding shadows
    /// the name, which makes the write a diagnosed no-op.
    fn store_global(&mut self, name: &str, cell: Cell) {
        if self.frames.iter().any(|f| f.contains_key(name)) {
            warn!("cannot assign to immutable binding `{}`", name);
            return;
        }
        self.globals.insert(name.to_string(), cell);
    }

    fn make_lazy(&mut self, pool: &Rc<Pool>, thunk: usize) -> Cell {
        Cell::Lazy(LazyCell {
            code: ChunkRef { chunk: pool.thunks[thunk].clone(), pool: pool.clone() },
            captured: self.snapshot_frames(),
        })
    }

    /// Reads through a location value left by l-value instructions;
    /// other values pass unchanged.
    fn deref_loc(&mut self, v: Value) -> Result<Value, RxError> {
        match v {
            Value::Loc(loc) => self.read_loc(&loc),
            other => Ok(other),
        }
    }

    pub(crate) fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RxError> {
        let fid = match callee {
            Value::Func(fid) => fid,
            other => {
                warn!("call of a non-function ({})", other.type_name());
                return Ok(Value::Int(0));
            }
        };

        if self.saved_scopes.len() >= MAX_CALL_DEPTH {
            self.trace_state("call depth exceeded");
            return Err(Fault::StackOverflow(MAX_CALL_DEPTH).into());
        }

        let (proto, pool) = self.funcs[fid].clone();

        // The callee sees one fresh frame holding only its parameters;
        // the caller's `:=` chain is parked until the call returns.
        let mut frame = Frame::default();
        for (p, a) in proto.params.iter().zip(args) {
            frame.insert(p.clone(), a);
        }
        let caller_frames = std::mem::replace(&mut self.frames, vec![frame]);
        self.saved_scopes.push(caller_frames);

        let code = ChunkRef { chunk: proto.chunk.clone(), pool };
        let result = self.run_chunk_value(&code);

        self.frames = self.saved_scopes.pop().expect("saved caller scope");
        result
    }

    /// Copies a struct template into a fresh instance: all declared
    /// slots exist before any initializer runs, eager (`=`/`:=`)
    /// initializers evaluate with the siblings visible as locations,
    /// reactive fields get their thunk stored unevaluated.
    fn instantiate(
        &mut self,
        tpl: &Rc<StructTemplate>,
        pool: &Rc<Pool>,
    ) -> Result<Value, RxError> {
        self.gc_if_needed();
        let id = self.heap.new_struct();

        {
            let obj = self.heap.structure_mut(id).expect("fresh struct");
            for tf in &tpl.fields {
                let cell = match &tf.init {
                    FieldInit::Reactive(chunk) => Cell::Lazy(LazyCell {
                        code: ChunkRef { chunk: chunk.clone(), pool: pool.clone() },
                        captured: FnvHashMap::default(),
                    }),
                    _ => Cell::Value(Value::Int(0)),
                };
                obj.set(&tf.name, cell);
                if tf.kind == FieldKind::Immutable {
                    obj.frozen.insert(tf.name.clone());
                }
            }
        }

        // Keep the fresh instance rooted while initializers run; they
        // may allocate and trigger a sweep.
        self.stack.push(Value::Struct(id));

        for tf in &tpl.fields {
            if let FieldInit::Eager(chunk) = &tf.init {
                let siblings = self.sibling_frame(id);
                self.frames.push(siblings);
                let code = ChunkRef { chunk: chunk.clone(), pool: pool.clone() };
                let result = self.run_chunk_value(&code);
                self.frames.pop();
                let v = result?;
                // Direct slot write: the frozen guard must not block the
                // one-time initialization of a `:=` field.
                self.heap
                    .structure_mut(id)
                    .expect("fresh struct")
                    .set(&tf.name, Cell::Value(v));
            }
        }

        self.stack.pop();
        Ok(Value::Struct(id))
    }

    // -----------------------------------------------------------------
    // Coercion and arithmetic
    // -----------------------------------------------------------------

    /// Integer context coercion with the recoverable fault rule: a
    /// value without an integer reading warns and counts as zero.
    pub(crate) fn coerce_int(&mut self, v: &Value) -> i32 {
        match v.as_int(&self.heap) {
            Some(n) => n,
            None => {
                warn!("type mismatch: {} used in integer context", v.type_name());
                0
            }
        }
    }

    fn exec_arith(&mut self, op: Arith) {
        let bv = self.pop();
        let av = self.pop();
        // Char arithmetic stays printable: the result is a char iff
        // either operand is one.
        let char_out = av.is_char() || bv.is_char();
        let a = self.coerce_int(&av);
        let b = self.coerce_int(&bv);

        let n = match op {
            Arith::Add => a.wrapping_add(b),
            Arith::Sub => a.wrapping_sub(b),
            Arith::Mul => a.wrapping_mul(b),
            Arith::Div => {
                if b == 0 {
                    warn!("division by zero");
                    0
                } else {
                    a.wrapping_div(b)
                }
            }
            Arith::Rem => {
                if b == 0 {
                    warn!("modulo by zero");
                    0
                } else {
                    a.wrapping_rem(b)
                }
            }
        };

        self.stack
            .push(if char_out { Value::Char(n) } else { Value::Int(n) });
    }

    fn exec_cmp(&mut self, f: fn(i32, i32) -> bool) {
        let bv = self.pop();
        let av = self.pop();
        let a = self.coerce_int(&av);
        let b = self.coerce_int(&bv);
        self.stack.push(Value::Int(f(a, b) as i32));
    }

    // -----------------------------------------------------------------
    // Printing
    // -----------------------------------------------------------------

    /// Stringification for the print sink. `None` means the value has no
    /// printable form (functions, structs).
    fn render(&mut self, v: &Value) -> Result<Option<String>, RxError> {
        match v {
            Value::Int(n) => Ok(Some(n.to_string())),
            Value::Char(c) => {
                Ok(Some(char::from_u32(*c as u32).unwrap_or('\u{FFFD}').to_string()))
            }

            Value::Str(id) => {
                let len = self.heap.array_len(*id).unwrap_or(0);
                let mut s = String::with_capacity(len);
                for ix in 0..len {
                    let cv = self.read_loc(&Loc::Elem(*id, ix))?;
                    let code = self.coerce_int(&cv);
                    s.push(char::from_u32(code as u32).unwrap_or('\u{FFFD}'));
                }
                Ok(Some(s))
            }

            Value::Array(id) => {
                // An array whose cells all read as chars prints as text,
                // anything else prints its length.
                let len = self.heap.array_len(*id).unwrap_or(0);
                let mut cells = Vec::with_capacity(len);
                for ix in 0..len {
                    cells.push(self.read_loc(&Loc::Elem(*id, ix))?);
                }
                if !cells.is_empty() && cells.iter().all(|c| c.is_char()) {
                    let mut s = String::with_capacity(len);
                    for c in &cells {
                        let code = self.coerce_int(c);
                        s.push(char::from_u32(code as u32).unwrap_or('\u{FFFD}'));
                    }
                    Ok(Some(s))
                } else {
                    Ok(Some(len.to_string()))
                }
            }

            Value::Struct(_) | Value::Func(_) | Value::Unit | Value::Loc(_) => Ok(None),
        }
    }

    // -----------------------------------------------------------------
    // Garbage collection and debugging
    // -----------------------------------------------------------------

    /// Runs a collection when the heap asks for one. Called from the
    /// allocation sites only, where every live value is reachable from
    /// the VM surfaces handed in as roots.
    fn gc_if_needed(&mut self) {
        if !self.heap.wants_gc() {
            return;
        }

        let mut roots: Vec<Value> = self.stack.clone();
        for frame in &self.frames {
            roots.extend(frame.values().cloned());
        }
        for scope in &self.saved_scopes {
            for frame in scope {
                roots.extend(frame.values().cloned());
            }
        }
        for cell in self.globals.values() {
            cell.trace(&mut roots);
        }
        for loc in &self.forcing {
            roots.push(Value::Loc(loc.clone()));
        }

        let before = self.heap.stats();
        self.heap.collect(roots);
        let after = self.heap.stats();
        debug!(
            "gc: arrays {} -> {}, structs {} -> {}",
            before.0, after.0, before.1, after.1
        );
    }

    /// One `tracing` event describing the VM surfaces, emitted at fatal
    /// faults and useful under `RUST_LOG=debug`.
    fn trace_state(&self, headline: &str) {
        let (arrays, structs) = self.heap.stats();
        debug!(
            "{}: stack={} frames={} calls={} globals={} heap=({} arrays, {} structs)",
            headline,
            self.stack.len(),
            self.frames.len(),
            self.saved_scopes.len(),
            self.globals.len(),
            arrays,
            structs,
        );
    }
}

enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}
