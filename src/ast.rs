// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The abstract syntax tree of RXL.

Produced by [`crate::parser::parse`] and consumed by
[`crate::compiler::compile`]. The tree also knows how to write itself back
out as source code (see [`program_to_src`]), which is used by the parser
round-trip tests.
*/

use std::fmt::Write;

/// Binary operators that evaluate both operands.
///
/// The short-circuit operators `&&` and `||` are not in here; they are
/// distinct [`Expr`] nodes because they compile to conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Char(i32),
    Str(String),
    Var(String),
    Neg(Box<Expr>),
    Bin(Box<Expr>, BinOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then_e: Box<Expr>,
        else_e: Box<Expr>,
    },
    /// `[n]`: allocate a zero filled array of n cells.
    NewArray(Box<Expr>),
    /// `struct Name`: instantiate a struct template.
    NewStruct(String),
    Index(Box<Expr>, Box<Expr>),
    Field(Box<Expr>, String),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

/// One step of an l-value access chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Field(String),
    Index(Expr),
}

/// An assignment target: a root identifier plus an access chain.
///
/// `a.b[i].c` becomes `{ root: "a", path: [Field(b), Index(i), Field(c)] }`.
/// An empty path addresses the variable itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LPath {
    pub root: String,
    pub path: Vec<Access>,
}

impl LPath {
    pub fn is_bare(&self) -> bool {
        self.path.is_empty()
    }
}

/// The three field kinds a struct template can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Mutable,
    Immutable,
    Reactive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    /// `None` for a bare `x;` declaration, which is a mutable slot
    /// initialized to integer zero.
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `lpath = expr`
    Assign(LPath, Expr),
    /// `lpath ::= expr`
    ReactAssign(LPath, Expr),
    /// `name := expr`, bare identifiers only.
    ImmutBind(String, Expr),
    If {
        cond: Expr,
        then_b: Vec<Stmt>,
        else_b: Vec<Stmt>,
    },
    Loop(Vec<Stmt>),
    Break,
    Return(Option<Expr>),
    Print(Expr),
    Println(Expr),
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    StructDef {
        name: String,
        fields: Vec<FieldDecl>,
    },
    Import(Vec<String>),
}

// ---------------------------------------------------------------------------
// Source writer
// ---------------------------------------------------------------------------

// Binding strength, used to decide where parentheses are required so that
// re-parsing the output yields the identical tree.
fn prec(e: &Expr) -> u8 {
    match e {
        Expr::Ternary { .. } => 0,
        Expr::Or(_, _) => 1,
        Expr::And(_, _) => 2,
        Expr::Bin(_, op, _) if op.is_comparison() => 3,
        Expr::Bin(_, BinOp::Add, _) | Expr::Bin(_, BinOp::Sub, _) => 4,
        Expr::Bin(_, _, _) => 5,
        Expr::Neg(_) => 6,
        _ => 7,
    }
}

fn escape_char(c: i32) -> String {
    match char::from_u32(c as u32) {
        Some('\n') => "\\n".to_string(),
        Some('\t') => "\\t".to_string(),
        Some('\r') => "\\r".to_string(),
        Some('\0') => "\\0".to_string(),
        Some('\'') => "\\'".to_string(),
        Some('"') => "\\\"".to_string(),
        Some('\\') => "\\\\".to_string(),
        Some(ch) => ch.to_string(),
        None => '\u{FFFD}'.to_string(),
    }
}

fn write_expr(out: &mut String, e: &Expr, min: u8) {
    let p = prec(e);
    if p < min {
        out.push('(');
    }
    match e {
        Expr::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Expr::Char(c) => {
            let _ = write!(out, "'{}'", escape_char(*c));
        }
        Expr::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                out.push_str(&escape_char(ch as i32));
            }
            out.push('"');
        }
        Expr::Var(name) => out.push_str(name),
        Expr::Neg(inner) => {
            out.push('-');
            write_expr(out, inner, 6);
        }
        Expr::Bin(l, op, r) => {
            // Comparisons are non associative: a nested comparison must
            // keep its parentheses or re-parsing would reject the output.
            // Everything else chains to the left, so only the right
            // operand needs one level more.
            if op.is_comparison() {
                write_expr(out, l, 4);
                let _ = write!(out, " {} ", op.symbol());
                write_expr(out, r, 4);
            } else {
                write_expr(out, l, p);
                let _ = write!(out, " {} ", op.symbol());
                write_expr(out, r, p + 1);
            }
        }
        Expr::And(l, r) => {
            write_expr(out, l, 2);
            out.push_str(" && ");
            write_expr(out, r, 3);
        }
        Expr::Or(l, r) => {
            write_expr(out, l, 1);
            out.push_str(" || ");
            write_expr(out, r, 2);
        }
        Expr::Ternary { cond, then_e, else_e } => {
            write_expr(out, cond, 1);
            out.push_str(" ? ");
            write_expr(out, then_e, 0);
            out.push_str(" : ");
            write_expr(out, else_e, 0);
        }
        Expr::NewArray(size) => {
            out.push('[');
            write_expr(out, size, 0);
            out.push(']');
        }
        Expr::NewStruct(name) => {
            let _ = write!(out, "struct {}", name);
        }
        Expr::Index(base, idx) => {
            write_expr(out, base, 7);
            out.push('[');
            write_expr(out, idx, 0);
            out.push(']');
        }
        Expr::Field(base, field) => {
            write_expr(out, base, 7);
            let _ = write!(out, ".{}", field);
        }
        Expr::Call { callee, args } => {
            write_expr(out, callee, 7);
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, a, 0);
            }
            out.push(')');
        }
    }
    if p < min {
        out.push(')');
    }
}

fn write_lpath(out: &mut String, lp: &LPath) {
    out.push_str(&lp.root);
    for acc in &lp.path {
        match acc {
            Access::Field(f) => {
                let _ = write!(out, ".{}", f);
            }
            Access::Index(i) => {
                out.push('[');
                write_expr(out, i, 0);
                out.push(']');
            }
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn write_block(out: &mut String, stmts: &[Stmt], depth: usize) {
    out.push_str("{\n");
    for s in stmts {
        write_stmt(out, s, depth + 1);
    }
    indent(out, depth);
    out.push('}');
}

fn write_stmt(out: &mut String, s: &Stmt, depth: usize) {
    indent(out, depth);
    match s {
        Stmt::Expr(e) => {
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::Assign(lp, e) => {
            write_lpath(out, lp);
            out.push_str(" = ");
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::ReactAssign(lp, e) => {
            write_lpath(out, lp);
            out.push_str(" ::= ");
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::ImmutBind(name, e) => {
            out.push_str(name);
            out.push_str(" := ");
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::If { cond, then_b, else_b } => {
            out.push_str("if ");
            write_expr(out, cond, 0);
            out.push(' ');
            write_block(out, then_b, depth);
            if !else_b.is_empty() {
                out.push_str(" else ");
                write_block(out, else_b, depth);
            }
            out.push('\n');
        }
        Stmt::Loop(body) => {
            out.push_str("loop ");
            write_block(out, body, depth);
            out.push('\n');
        }
        Stmt::Break => out.push_str("break;\n"),
        Stmt::Return(None) => out.push_str("return;\n"),
        Stmt::Return(Some(e)) => {
            out.push_str("return ");
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::Print(e) => {
            out.push_str("print ");
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::Println(e) => {
            out.push_str("println ");
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        Stmt::FuncDef { name, params, body } => {
            let _ = write!(out, "func {}(", name);
            for (i, p) in params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(p);
            }
            out.push_str(") ");
            write_block(out, body, depth);
            out.push('\n');
        }
        Stmt::StructDef { name, fields } => {
            let _ = write!(out, "struct {} {{\n", name);
            for fd in fields {
                indent(out, depth + 1);
                out.push_str(&fd.name);
                if let Some(init) = &fd.init {
                    let op = match fd.kind {
                        FieldKind::Mutable => " = ",
                        FieldKind::Immutable => " := ",
                        FieldKind::Reactive => " ::= ",
                    };
                    out.push_str(op);
                    write_expr(out, init, 0);
                }
                out.push_str(";\n");
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::Import(path) => {
            out.push_str("import ");
            out.push_str(&path.join("."));
            out.push_str(";\n");
        }
    }
}

/// Writes a whole program back out as parsable source code.
///
/// Parsing the output again yields a tree equal to the input (comments and
/// the original layout are not preserved).
pub fn program_to_src(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for s in stmts {
        write_stmt(&mut out, s, 0);
    }
    out
}
