// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
This is the grammar parser for RXL.

It consumes the token stream made by [`crate::lexer::tokenize`] and
produces the AST from [`crate::ast`], which is then lowered by
`rxl::compiler::compile()` into bytecode.

## Full RXL Grammar

White space and comments are handled by the lexer and omitted here:

```ebnf
    program       = { statement, [ ";" ] } ;

    statement     = import | func_def | struct_def
                  | "if", ternary, block, [ "else", block ]
                  | "loop", block
                  | "break"
                  | "return", [ ternary ]
                  | "print", ternary
                  | "println", ternary
                  | assignment
                  | ternary (* expression statement *)
                  ;

    import        = "import", ident, { ".", ident } ;
    func_def      = "func", ident, "(", [ ident, { ",", ident } ], ")", block ;
    struct_def    = "struct", ident, "{", { field_decl }, "}" ;
    field_decl    = ident, [ ( "=" | ":=" | "::=" ), ternary ], [ ";" ] ;
    block         = "{", { statement, [ ";" ] }, "}" ;

    assignment    = ident, ":=", ternary          (* bare identifiers only *)
                  | lvalue, ( "=" | "::=" ), ternary
                  ;
    lvalue        = ident, { ".", ident | "[", ternary, "]" } ;

    ternary       = or, [ "?", ternary, ":", ternary ] ;   (* right assoc *)
    or            = and, { "||", and } ;
    and           = comparison, { "&&", comparison } ;
    comparison    = additive,
                    [ ( "<" | ">" | "<=" | ">=" | "==" | "!=" ), additive ] ;
                    (* non associative: a second comparison operator
                       at the same level is a parse error *)
    additive      = multiplicative, { ( "+" | "-" ), multiplicative } ;
    multiplicative= unary, { ( "*" | "/" | "%" ), unary } ;
    unary         = "-", unary | postfix ;
    postfix       = primary, { ".", ident
                             | "[", ternary, "]"
                             | "(", [ ternary, { ",", ternary } ], ")" } ;
    primary       = number | char | string | ident
                  | "struct", ident              (* instantiation *)
                  | "(", ternary, ")"
                  | "[", ternary, "]"            (* array allocation *)
                  ;
```

Note the double role of `[ expr ]`: in primary position it allocates an
array, in postfix position it indexes one.

The parser does not attempt error recovery; the first syntax error is
returned with its source position.
*/

use crate::ast::{Access, BinOp, Expr, FieldDecl, FieldKind, LPath, Stmt};
use crate::lexer::{Tok, Token};
use thiserror::Error;

/// A fatal syntax error with the position of the offending token.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("error[{line}:{col}] {msg}")]
pub struct ParseError {
    pub msg: String,
    pub line: u32,
    pub col: u32,
}

struct Parser {
    tokens: Vec<Tok>,
    index: usize,
}

impl Parser {
    fn new(tokens: Vec<Tok>) -> Self {
        Parser { tokens, index: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.tok)
    }

    fn peek_n(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.index + n).map(|t| &t.tok)
    }

    /// Position of the token under the parse head, or of the last token
    /// when the stream is exhausted.
    fn pos(&self) -> (u32, u32) {
        match self.tokens.get(self.index).or_else(|| self.tokens.last()) {
            Some(t) => (t.line, t.col),
            None => (1, 1),
        }
    }

    fn err<T>(&self, msg: impl Into<String>) -> Result<T, ParseError> {
        let (line, col) = self.pos();
        Err(ParseError { msg: msg.into(), line, col })
    }

    fn expect(&mut self, expected: &Token, ctx: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(t) if t == expected => {
                self.index += 1;
                Ok(())
            }
            Some(t) => {
                let t = t.clone();
                self.err(format!("expected {:?} {}, got {:?}", expected, ctx, t))
            }
            None => self.err(format!("expected {:?} {}, got end of input", expected, ctx)),
        }
    }

    fn expect_ident(&mut self, ctx: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(s)) => {
                let s = s.clone();
                self.index += 1;
                Ok(s)
            }
            Some(t) => {
                let t = t.clone();
                self.err(format!("expected identifier {}, got {:?}", ctx, t))
            }
            None => self.err(format!("expected identifier {}, got end of input", ctx)),
        }
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().cloned() {
            Some(Token::Int(n)) => {
                self.index += 1;
                Ok(Expr::Int(n))
            }
            Some(Token::Char(c)) => {
                self.index += 1;
                Ok(Expr::Char(c))
            }
            Some(Token::Str(s)) => {
                self.index += 1;
                Ok(Expr::Str(s))
            }
            Some(Token::Ident(name)) => {
                self.index += 1;
                Ok(Expr::Var(name))
            }
            Some(Token::Struct) => {
                self.index += 1;
                let name = self.expect_ident("after 'struct'")?;
                Ok(Expr::NewStruct(name))
            }
            Some(Token::LParen) => {
                self.index += 1;
                let e = self.parse_ternary()?;
                self.expect(&Token::RParen, "to close '('")?;
                Ok(e)
            }
            Some(Token::LBracket) => {
                self.index += 1;
                let size = self.parse_ternary()?;
                self.expect(&Token::RBracket, "to close array allocation")?;
                Ok(Expr::NewArray(Box::new(size)))
            }
            Some(t) => self.err(format!("expected expression, got {:?}", t)),
            None => self.err("expected expression, got end of input"),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_primary()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.index += 1;
                    let field = self.expect_ident("after '.'")?;
                    e = Expr::Field(Box::new(e), field);
                }
                Some(Token::LBracket) => {
                    self.index += 1;
                    let idx = self.parse_ternary()?;
                    self.expect(&Token::RBracket, "to close index")?;
                    e = Expr::Index(Box::new(e), Box::new(idx));
                }
                Some(Token::LParen) => {
                    self.index += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_ternary()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "to close call arguments")?;
                    e = Expr::Call { callee: Box::new(e), args };
                }
                _ => break,
            }
        }

        Ok(e)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            let e = self.parse_unary()?;
            Ok(Expr::Neg(Box::new(e)))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.index += 1;
            let rhs = self.parse_unary()?;
            e = Expr::Bin(Box::new(e), op, Box::new(rhs));
        }
        Ok(e)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.index += 1;
            let rhs = self.parse_multiplicative()?;
            e = Expr::Bin(Box::new(e), op, Box::new(rhs));
        }
        Ok(e)
    }

    fn comparison_op(&self) -> Option<BinOp> {
        match self.peek() {
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Ge) => Some(BinOp::Ge),
            Some(Token::Eq) => Some(BinOp::Eq),
            Some(Token::Ne) => Some(BinOp::Ne),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_additive()?;

        if let Some(op) = self.comparison_op() {
            self.index += 1;
            let rhs = self.parse_additive()?;
            if self.comparison_op().is_some() {
                return self
                    .err("comparison operators are non-associative, use parentheses");
            }
            Ok(Expr::Bin(Box::new(lhs), op, Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_comparison()?;
            e = Expr::And(Box::new(e), Box::new(rhs));
        }
        Ok(e)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            e = Expr::Or(Box::new(e), Box::new(rhs));
        }
        Ok(e)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;

        if self.eat(&Token::Question) {
            let then_e = self.parse_ternary()?;
            self.expect(&Token::Colon, "in ternary")?;
            let else_e = self.parse_ternary()?;
            Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_e: Box::new(then_e),
                else_e: Box::new(else_e),
            })
        } else {
            Ok(cond)
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&Token::LBrace, "to open block")?;
        let mut stmts = Vec::new();
        while let Some(tok) = self.peek() {
            if *tok == Token::RBrace {
                break;
            }
            stmts.push(self.parse_statement()?);
            self.eat(&Token::Semicolon);
        }
        self.expect(&Token::RBrace, "to close block")?;
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.index += 1;
        let cond = self.parse_ternary()?;
        let then_b = self.parse_block()?;
        let else_b = if self.eat(&Token::Else) { self.parse_block()? } else { Vec::new() };
        Ok(Stmt::If { cond, then_b, else_b })
    }

    fn parse_func_def(&mut self) -> Result<Stmt, ParseError> {
        self.index += 1;
        let name = self.expect_ident("after 'func'")?;
        self.expect(&Token::LParen, "after function name")?;

        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                params.push(self.expect_ident("in parameter list")?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "to close parameter list")?;

        let body = self.parse_block()?;
        Ok(Stmt::FuncDef { name, params, body })
    }

    fn parse_struct_def(&mut self) -> Result<Stmt, ParseError> {
        self.index += 1;
        let name = self.expect_ident("after 'struct'")?;
        self.expect(&Token::LBrace, "after struct name")?;

        let mut fields = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            let field_name = self.expect_ident("as struct field name")?;

            let kind = match self.peek() {
                Some(Token::Assign) => Some(FieldKind::Mutable),
                Some(Token::ImmutAssign) => Some(FieldKind::Immutable),
                Some(Token::ReactAssign) => Some(FieldKind::Reactive),
                _ => None,
            };
            let fd = match kind {
                Some(kind) => {
                    self.index += 1;
                    FieldDecl { name: field_name, kind, init: Some(self.parse_ternary()?) }
                }
                // A bare field is a mutable slot starting at zero.
                None => FieldDecl { name: field_name, kind: FieldKind::Mutable, init: None },
            };
            fields.push(fd);

            self.eat(&Token::Semicolon);
        }

        self.expect(&Token::RBrace, "to close struct definition")?;
        Ok(Stmt::StructDef { name, fields })
    }

    fn parse_import(&mut self) -> Result<Stmt, ParseError> {
        self.index += 1;
        let mut path = vec![self.expect_ident("after 'import'")?];
        while self.eat(&Token::Dot) {
            path.push(self.expect_ident("in import path")?);
        }
        Ok(Stmt::Import(path))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.index += 1;
        match self.peek() {
            Some(Token::Semicolon) | Some(Token::RBrace) | None => Ok(Stmt::Return(None)),
            _ => Ok(Stmt::Return(Some(self.parse_ternary()?))),
        }
    }

    /// Re-reads a parsed expression as an assignment target. Only
    /// identifiers with field/index access chains qualify.
    fn lpath_of(&self, e: Expr) -> Result<LPath, ParseError> {
        match e {
            Expr::Var(root) => Ok(LPath { root, path: Vec::new() }),
            Expr::Field(base, f) => {
                let mut lp = self.lpath_of(*base)?;
                lp.path.push(Access::Field(f));
                Ok(lp)
            }
            Expr::Index(base, i) => {
                let mut lp = self.lpath_of(*base)?;
                lp.path.push(Access::Index(*i));
                Ok(lp)
            }
            other => self.err(format!("invalid assignment target: {:?}", other)),
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(Token::Import) => return self.parse_import(),
            Some(Token::Func) => return self.parse_func_def(),
            Some(Token::Return) => return self.parse_return(),
            Some(Token::If) => return self.parse_if(),
            Some(Token::Break) => {
                self.index += 1;
                return Ok(Stmt::Break);
            }
            Some(Token::Loop) => {
                self.index += 1;
                return Ok(Stmt::Loop(self.parse_block()?));
            }
            Some(Token::Print) => {
                self.index += 1;
                return Ok(Stmt::Print(self.parse_ternary()?));
            }
            Some(Token::Println) => {
                self.index += 1;
                return Ok(Stmt::Println(self.parse_ternary()?));
            }
            Some(Token::Struct) => {
                // `struct T { … }` defines, `struct T` instantiates; the
                // brace two tokens ahead decides.
                if matches!(self.peek_n(2), Some(Token::LBrace)) {
                    return self.parse_struct_def();
                }
            }
            _ => (),
        }

        let e = self.parse_ternary()?;

        match self.peek() {
            Some(Token::Assign) => {
                self.index += 1;
                let target = self.lpath_of(e)?;
                let value = self.parse_ternary()?;
                Ok(Stmt::Assign(target, value))
            }
            Some(Token::ReactAssign) => {
                self.index += 1;
                let target = self.lpath_of(e)?;
                let value = self.parse_ternary()?;
                Ok(Stmt::ReactAssign(target, value))
            }
            Some(Token::ImmutAssign) => {
                self.index += 1;
                match e {
                    Expr::Var(name) => {
                        let value = self.parse_ternary()?;
                        Ok(Stmt::ImmutBind(name, value))
                    }
                    other => self.err(format!(
                        "':=' takes a bare identifier on the left, got {:?}",
                        other
                    )),
                }
            }
            _ => Ok(Stmt::Expr(e)),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.parse_statement()?);
            self.eat(&Token::Semicolon);
        }
        Ok(stmts)
    }
}

/// Parses a token stream into a program.
pub fn parse(tokens: Vec<Tok>) -> Result<Vec<Stmt>, ParseError> {
    let mut p = Parser::new(tokens);
    let prog = p.parse_program()?;
    if p.index != p.tokens.len() {
        return p.err("trailing tokens after program end");
    }
    Ok(prog)
}
