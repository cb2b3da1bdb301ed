// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
Lowers the AST to bytecode.

Control flow compiles to absolute jumps patched after the target is
known: ternaries, `&&`/`||` short-circuits, `if`/`else`, `loop` (a
backward jump) and `break` (a forward jump patched when the loop
closes). The short-circuit operators use the zero/non-zero truth rule
and always leave a plain `0`/`1` on the stack.

A `::=` right hand side never becomes inline code: it is compiled into
its own chunk in the thunk table and referenced by the reactive put
instructions, which snapshot the immutable frames at run time. Struct
definitions compile each field initializer the same way, into the
template table.

Blocks open an immutable frame; `break` emits one `pop_frame` per block
it jumps out of before leaving the loop, keeping the frame chain
balanced on every path.
*/

use crate::ast::{Access, BinOp, Expr, FieldKind, LPath, Stmt};
use crate::ops::{Chunk, FieldInit, FuncProto, Op, Pool, Prog, StructTemplate, TemplateField};
use fnv::FnvHashMap;
use std::rc::Rc;
use thiserror::Error;

/// Errors of the lowering stage; fatal, exit code 2 like parse errors.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("compile error: {msg}")]
pub struct CompileError {
    pub msg: String,
}

struct LoopCtx {
    /// Indices of `break` jump placeholders, patched at loop close.
    break_sites: Vec<usize>,
    /// Frame depth at the loop body, so `break` can unwind blocks
    /// opened inside the loop.
    frame_depth: usize,
}

struct Compiler {
    strings: Vec<String>,
    str_index: FnvHashMap<String, usize>,
    funcs: Vec<Rc<FuncProto>>,
    templates: Vec<Rc<StructTemplate>>,
    thunks: Vec<Rc<Chunk>>,
    loops: Vec<LoopCtx>,
    frame_depth: usize,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            strings: Vec::new(),
            str_index: FnvHashMap::default(),
            funcs: Vec::new(),
            templates: Vec::new(),
            thunks: Vec::new(),
            loops: Vec::new(),
            frame_depth: 0,
        }
    }

    fn intern(&mut self, s: &str) -> usize {
        if let Some(&i) = self.str_index.get(s) {
            return i;
        }
        self.strings.push(s.to_string());
        let i = self.strings.len() - 1;
        self.str_index.insert(s.to_string(), i);
        i
    }

    /// Emits a jump placeholder and returns its site for later patching.
    fn emit_jump(&mut self, code: &mut Vec<Op>, op: Op) -> usize {
        code.push(op);
        code.len() - 1
    }

    fn patch_jump(&mut self, code: &mut [Op], site: usize, target: usize) {
        match &mut code[site] {
            Op::Jump(t) | Op::JumpIfZero(t) => *t = target,
            other => unreachable!("patching a non-jump op {:?}", other),
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn expr(&mut self, e: &Expr, code: &mut Vec<Op>) {
        match e {
            Expr::Int(n) => code.push(Op::PushInt(*n)),
            Expr::Char(c) => code.push(Op::PushChar(*c)),
            Expr::Str(s) => {
                let i = self.intern(s);
                code.push(Op::PushStr(i));
            }
            Expr::Var(name) => code.push(Op::Load(name.clone())),

            Expr::Neg(inner) => {
                code.push(Op::PushInt(0));
                self.expr(inner, code);
                code.push(Op::Sub);
            }

            Expr::Bin(l, op, r) => {
                self.expr(l, code);
                self.expr(r, code);
                code.push(match op {
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    BinOp::Rem => Op::Rem,
                    BinOp::Lt => Op::Lt,
                    BinOp::Le => Op::Le,
                    BinOp::Gt => Op::Gt,
                    BinOp::Ge => Op::Ge,
                    BinOp::Eq => Op::Eq,
                    BinOp::Ne => Op::Ne,
                });
            }

            Expr::And(l, r) => {
                self.expr(l, code);
                let to_false_1 = self.emit_jump(code, Op::JumpIfZero(0));
                self.expr(r, code);
                let to_false_2 = self.emit_jump(code, Op::JumpIfZero(0));
                code.push(Op::PushInt(1));
                let to_end = self.emit_jump(code, Op::Jump(0));
                let false_ip = code.len();
                code.push(Op::PushInt(0));
                let end_ip = code.len();
                self.patch_jump(code, to_false_1, false_ip);
                self.patch_jump(code, to_false_2, false_ip);
                self.patch_jump(code, to_end, end_ip);
            }

            Expr::Or(l, r) => {
                self.expr(l, code);
                let try_rhs = self.emit_jump(code, Op::JumpIfZero(0));
                code.push(Op::PushInt(1));
                let to_end_1 = self.emit_jump(code, Op::Jump(0));
                let rhs_ip = code.len();
                self.expr(r, code);
                let to_false = self.emit_jump(code, Op::JumpIfZero(0));
                code.push(Op::PushInt(1));
                let to_end_2 = self.emit_jump(code, Op::Jump(0));
                let false_ip = code.len();
                code.push(Op::PushInt(0));
                let end_ip = code.len();
                self.patch_jump(code, try_rhs, rhs_ip);
                self.patch_jump(code, to_false, false_ip);
                self.patch_jump(code, to_end_1, end_ip);
                self.patch_jump(code, to_end_2, end_ip);
            }

            Expr::Ternary { cond, then_e, else_e } => {
                self.expr(cond, code);
                let to_else = self.emit_jump(code, Op::JumpIfZero(0));
                self.expr(then_e, code);
                let to_end = self.emit_jump(code, Op::Jump(0));
                let else_ip = code.len();
                self.expr(else_e, code);
                let end_ip = code.len();
                self.patch_jump(code, to_else, else_ip);
                self.patch_jump(code, to_end, end_ip);
            }

            Expr::NewArray(size) => {
                self.expr(size, code);
                code.push(Op::NewArray);
            }

            Expr::NewStruct(name) => code.push(Op::NewStruct(name.clone())),

            Expr::Index(base, idx) => {
                self.expr(base, code);
                self.expr(idx, code);
                code.push(Op::GetIndex);
            }

            Expr::Field(base, field) => {
                self.expr(base, code);
                code.push(Op::GetField(field.clone()));
            }

            Expr::Call { callee, args } => {
                self.expr(callee, code);
                for a in args {
                    self.expr(a, code);
                }
                code.push(Op::Call(args.len()));
            }
        }
    }

    /// Compiles an expression into its own chunk, for thunks and field
    /// initializers.
    fn expr_chunk(&mut self, e: &Expr) -> Rc<Chunk> {
        let mut code = Vec::new();
        self.expr(e, &mut code);
        code.push(Op::Ret);
        Rc::new(Chunk { ops: code })
    }

    fn add_thunk(&mut self, e: &Expr) -> usize {
        let chunk = self.expr_chunk(e);
        self.thunks.push(chunk);
        self.thunks.len() - 1
    }

    // -----------------------------------------------------------------
    // L-values
    // -----------------------------------------------------------------

    fn lvalue(&mut self, lp: &LPath, code: &mut Vec<Op>) {
        code.push(Op::Load(lp.root.clone()));
        for acc in &lp.path {
            match acc {
                Access::Field(f) => code.push(Op::FieldLoc(f.clone())),
                Access::Index(i) => {
                    self.expr(i, code);
                    code.push(Op::ElemLoc);
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    /// A `{ … }` block: one fresh immutable frame around the statements.
    fn block(&mut self, stmts: &[Stmt], code: &mut Vec<Op>) -> Result<(), CompileError> {
        code.push(Op::PushFrame);
        self.frame_depth += 1;
        for s in stmts {
            self.stmt(s, code)?;
        }
        self.frame_depth -= 1;
        code.push(Op::PopFrame);
        Ok(())
    }

    fn stmt(&mut self, s: &Stmt, code: &mut Vec<Op>) -> Result<(), CompileError> {
        match s {
            Stmt::Expr(e) => {
                self.expr(e, code);
                code.push(Op::Pop);
            }

            Stmt::Assign(lp, e) => {
                if lp.is_bare() {
                    self.expr(e, code);
                    code.push(Op::Store(lp.root.clone()));
                } else {
                    self.lvalue(lp, code);
                    self.expr(e, code);
                    code.push(Op::PutLoc);
                }
            }

            Stmt::ReactAssign(lp, e) => {
                let t = self.add_thunk(e);
                if lp.is_bare() {
                    code.push(Op::ReactivePut(lp.root.clone(), t));
                } else {
                    self.lvalue(lp, code);
                    code.push(Op::ReactivePutLoc(t));
                }
            }

            Stmt::ImmutBind(name, e) => {
                self.expr(e, code);
                code.push(Op::StoreImmut(name.clone()));
            }

            Stmt::If { cond, then_b, else_b } => {
                self.expr(cond, code);
                if else_b.is_empty() {
                    let to_end = self.emit_jump(code, Op::JumpIfZero(0));
                    self.block(then_b, code)?;
                    let end_ip = code.len();
                    self.patch_jump(code, to_end, end_ip);
                } else {
                    let to_else = self.emit_jump(code, Op::JumpIfZero(0));
                    self.block(then_b, code)?;
                    let to_end = self.emit_jump(code, Op::Jump(0));
                    let else_ip = code.len();
                    self.block(else_b, code)?;
                    let end_ip = code.len();
                    self.patch_jump(code, to_else, else_ip);
                    self.patch_jump(code, to_end, end_ip);
                }
            }

            Stmt::Loop(body) => {
                // The loop's own frame is the per iteration frame; it is
                // cleared at the head of every pass so `j := i` capture
                // patterns get a fresh identity each time around.
                code.push(Op::PushFrame);
                self.frame_depth += 1;
                let start_ip = code.len();
                code.push(Op::ClearFrame);

                self.loops.push(LoopCtx {
                    break_sites: Vec::new(),
                    frame_depth: self.frame_depth,
                });

                for s in body {
                    self.stmt(s, code)?;
                }

                code.push(Op::Jump(start_ip));

                let end_ip = code.len();
                let ctx = self.loops.pop().expect("loop context");
                for site in ctx.break_sites {
                    self.patch_jump(code, site, end_ip);
                }

                self.frame_depth -= 1;
                code.push(Op::PopFrame);
            }

            Stmt::Break => {
                let depth = self.frame_depth;
                let ctx = match self.loops.last_mut() {
                    Some(ctx) => ctx,
                    None => {
                        return Err(CompileError {
                            msg: "break used outside of a loop".to_string(),
                        })
                    }
                };
                // Unwind the block frames between here and the loop; the
                // loop frame itself is popped right after the jump target.
                let unwind = depth - ctx.frame_depth;
                for _ in 0..unwind {
                    code.push(Op::PopFrame);
                }
                let site = code.len();
                code.push(Op::Jump(0));
                self.loops
                    .last_mut()
                    .expect("loop context")
                    .break_sites
                    .push(site);
            }

            Stmt::Return(e) => {
                match e {
                    Some(e) => self.expr(e, code),
                    None => code.push(Op::PushInt(0)),
                }
                code.push(Op::Ret);
            }

            Stmt::Print(e) => {
                self.expr(e, code);
                code.push(Op::Print);
            }

            Stmt::Println(e) => {
                self.expr(e, code);
                code.push(Op::Println);
            }

            Stmt::FuncDef { name, params, body } => {
                let chunk = self.func_chunk(body)?;
                self.funcs.push(Rc::new(FuncProto {
                    name: name.clone(),
                    params: params.clone(),
                    chunk,
                }));
                code.push(Op::DefineFunc(self.funcs.len() - 1));
            }

            Stmt::StructDef { name, fields } => {
                let mut tfields = Vec::with_capacity(fields.len());
                for fd in fields {
                    let init = match (&fd.init, fd.kind) {
                        (None, _) => FieldInit::Zero,
                        (Some(e), FieldKind::Reactive) => FieldInit::Reactive(self.expr_chunk(e)),
                        (Some(e), _) => FieldInit::Eager(self.expr_chunk(e)),
                    };
                    tfields.push(TemplateField { name: fd.name.clone(), kind: fd.kind, init });
                }
                self.templates.push(Rc::new(StructTemplate {
                    name: name.clone(),
                    fields: tfields,
                }));
                code.push(Op::DefineStruct(self.templates.len() - 1));
            }

            Stmt::Import(path) => {
                let i = self.intern(&path.join("."));
                code.push(Op::Import(i));
            }
        }

        Ok(())
    }

    /// Compiles a function body into its own chunk. Loop and frame
    /// bookkeeping restart from zero: a `break` inside the body cannot
    /// target a loop around the definition.
    fn func_chunk(&mut self, body: &[Stmt]) -> Result<Rc<Chunk>, CompileError> {
        let saved_loops = std::mem::take(&mut self.loops);
        let saved_depth = std::mem::replace(&mut self.frame_depth, 0);

        let mut code = Vec::new();
        let mut result = Ok(());
        for s in body {
            result = self.stmt(s, &mut code);
            if result.is_err() {
                break;
            }
        }

        self.loops = saved_loops;
        self.frame_depth = saved_depth;
        result?;

        // Falling off the end returns zero.
        code.push(Op::PushInt(0));
        code.push(Op::Ret);
        Ok(Rc::new(Chunk { ops: code }))
    }
}

/// Compiles a parsed program into an executable [`Prog`].
pub fn compile(stmts: &[Stmt]) -> Result<Prog, CompileError> {
    let mut c = Compiler::new();
    let mut code = Vec::new();
    for s in stmts {
        c.stmt(s, &mut code)?;
    }
    code.push(Op::Halt);

    Ok(Prog {
        main: Rc::new(Chunk { ops: code }),
        pool: Rc::new(Pool {
            strings: c.strings,
            funcs: c.funcs,
            templates: c.templates,
            thunks: c.thunks,
        }),
    })
}
