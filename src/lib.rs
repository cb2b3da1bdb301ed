// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
# RXL, a small reactive expression language

This crate provides a small scripting language whose defining feature is
that it has three assignment forms instead of one:

- `x = e` is a plain mutable assignment,
- `x := e` is an immutable binding in the current lexical frame,
- `x ::= e` is a *reactive* assignment: the expression itself is stored,
  and every read of `x` re-evaluates it against the current state of the
  world.

Reactivity works across scalars, struct fields and array cells, with a
lazy pull model: nothing propagates on write, reads are the observation
points. Here is the flavor of it:

```text
base = 1;
arr = [5];
arr[0] ::= base;
arr[1] ::= arr[0] + 1;
println arr[1];     # prints 2 #
base = 10;
println arr[1];     # prints 11, nothing was re-assigned #
```

Some other features:

- Integers, chars, fixed size arrays, strings (arrays of chars) and open
  structs whose field sets may grow at runtime.
- Heap objects alias by reference; reclamation is a mark and sweep over
  an arena of integer handles.
- Runtime faults are recoverable: reads yield `0` with a diagnostic on
  stderr instead of aborting the program.
- A bytecode compiler and stack VM; `rxl --dump-bytecode file.rx` shows
  the listing.
- `import a.b.c` loads `a/b/c.rx` exactly once.

# Basic API Usage

The simplest way to run RXL code from Rust is [`eval`], which returns
everything the program printed:

```rust
let out = rxl::eval("x = 1; y ::= x + 1; println y; x = 10; println y;").unwrap();
assert_eq!(out, "2\n11\n");
```

For more control, compile and run the pieces yourself:

```rust
use rxl::vm::Vm;

let prog = rxl::compile_str("println 40 + 2;").unwrap();
let mut vm = Vm::new();
vm.run(&prog).unwrap();
```
*/

pub mod ast;
pub mod compiler;
pub mod heap;
pub mod lexer;
pub mod modules;
pub mod ops;
pub mod parser;
pub mod reactive;
pub mod value;
pub mod vm;

use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Everything that can go wrong between source text and a finished run.
///
/// The variants map to the process exit codes of the `rxl` binary:
/// compile-time failures (lex, parse, lowering, module loading) exit
/// with 2, fatal runtime faults with 1.
#[derive(Debug, Error)]
pub enum RxError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Compile(#[from] compiler::CompileError),
    #[error(transparent)]
    Load(#[from] modules::LoadError),
    #[error(transparent)]
    Fault(#[from] vm::Fault),
}

impl RxError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RxError::Lex(_) | RxError::Parse(_) | RxError::Compile(_) | RxError::Load(_) => 2,
            RxError::Fault(_) => 1,
        }
    }
}

/// Tokenizes, parses and lowers a source string to bytecode.
pub fn compile_str(code: &str) -> Result<ops::Prog, RxError> {
    let tokens = lexer::tokenize(code)?;
    let ast = parser::parse(tokens)?;
    Ok(compiler::compile(&ast)?)
}

/// Compiles and runs a source string, returning everything it printed.
///
/// Imports resolve against the current directory. This is the
/// convenience entry point used by the test suite.
pub fn eval(code: &str) -> Result<String, RxError> {
    let prog = compile_str(code)?;

    let out = Rc::new(RefCell::new(String::new()));
    let sink_out = out.clone();

    let mut vm = vm::Vm::new();
    vm.set_print_sink(Box::new(move |s| sink_out.borrow_mut().push_str(s)));
    vm.run(&prog)?;

    let result = out.borrow().clone();
    Ok(result)
}
