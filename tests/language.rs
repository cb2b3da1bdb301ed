// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

use rxl::ast::program_to_src;
use rxl::vm::Vm;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Evaluates a string of RXL code and returns everything it printed.
/// Errors are not panic!'ed but returned as an informal string, so the
/// assert tables below can check failure cases too.
fn run(code: &str) -> String {
    match rxl::eval(code) {
        Ok(out) => out,
        Err(e) => format!("ERROR: {}", e),
    }
}

/// Like [`run`], but with the module root pointed somewhere explicit.
fn run_with_root(code: &str, root: &Path) -> String {
    let prog = match rxl::compile_str(code) {
        Ok(p) => p,
        Err(e) => return format!("ERROR: {}", e),
    };

    let out = Rc::new(RefCell::new(String::new()));
    let sink_out = out.clone();

    let mut vm = Vm::new();
    vm.set_print_sink(Box::new(move |s| sink_out.borrow_mut().push_str(s)));
    vm.set_module_root(root.to_path_buf());

    match vm.run(&prog) {
        Ok(()) => {
            let s = out.borrow().clone();
            s
        }
        Err(e) => format!("ERROR: {}", e),
    }
}

#[test]
fn check_print_forms() {
    assert_eq!(run("println 0;"), "0\n");
    assert_eq!(run("println -17;"), "-17\n");
    assert_eq!(run("print 1; print 2; print 3;"), "123");
    assert_eq!(run("println 'x';"), "x\n");
    assert_eq!(run("println \"hello\";"), "hello\n");
    assert_eq!(run("println \"\";"), "\n");
    // Arrays of non-chars print their length.
    assert_eq!(run("arr = [4]; println arr;"), "4\n");
    assert_eq!(run("arr = [0]; println arr;"), "0\n");
    // A plain array that only holds chars prints as text.
    assert_eq!(run("a = [2]; a[0] = 'h'; a[1] = 'i'; println a;"), "hi\n");
    assert_eq!(run("a = [2]; a[0] = 'h'; a[1] = 5; println a;"), "2\n");
}

#[test]
fn check_arithmetic() {
    assert_eq!(run("println 1 + 2 * 3;"), "7\n");
    assert_eq!(run("println (1 + 2) * 3;"), "9\n");
    assert_eq!(run("println 7 / 2;"), "3\n");
    assert_eq!(run("println 7 % 3;"), "1\n");
    assert_eq!(run("println -5 + 2;"), "-3\n");
    assert_eq!(run("println --5;"), "5\n");
    assert_eq!(run("println 10 - 3 - 4;"), "3\n");
    // 32 bit two's complement wrap around.
    assert_eq!(run("println 2147483647 + 1;"), "-2147483648\n");
    // Division and modulo by zero degrade to the zero sentinel.
    assert_eq!(run("println 5 / 0;"), "0\n");
    assert_eq!(run("println 5 % 0;"), "0\n");
}

#[test]
fn check_char_arithmetic_stays_printable() {
    assert_eq!(run("println 'a' + 1;"), "b\n");
    assert_eq!(run("println 1 + 'a';"), "b\n");
    assert_eq!(run("println 'b' - 1;"), "a\n");
    assert_eq!(run("t = \"abc\"; println t[1] + 1;"), "c\n");
    // Comparisons on chars yield plain integers.
    assert_eq!(run("println 'a' < 'b';"), "1\n");
    assert_eq!(run("println 'a' == 97;"), "1\n");
}

#[test]
fn check_comparisons_and_logic() {
    assert_eq!(run("println 1 < 2;"), "1\n");
    assert_eq!(run("println 2 <= 1;"), "0\n");
    assert_eq!(run("println 3 == 3;"), "1\n");
    assert_eq!(run("println 3 != 3;"), "0\n");
    assert_eq!(run("println 1 && 2;"), "1\n");
    assert_eq!(run("println 1 && 0;"), "0\n");
    assert_eq!(run("println 0 || 3;"), "1\n");
    assert_eq!(run("println 0 || 0;"), "0\n");
    // Non-zero is true, sign does not matter.
    assert_eq!(run("println -1 && 1;"), "1\n");
    // Short-circuit: the decisive operand stops evaluation before the
    // division by zero is ever reached.
    assert_eq!(run("println 0 && (1 / 0);"), "0\n");
    assert_eq!(run("println 1 || (1 / 0);"), "1\n");
}

#[test]
fn check_comparisons_are_non_associative() {
    let out = run("println 1 < 2 < 3;");
    assert!(out.starts_with("ERROR:"), "got: {}", out);
    assert!(out.contains("non-associative"), "got: {}", out);
    // Parenthesized nesting is fine.
    assert_eq!(run("println (1 < 2) < 3;"), "1\n");
}

#[test]
fn check_ternary() {
    assert_eq!(run("println 1 ? 10 : 20;"), "10\n");
    assert_eq!(run("println 0 ? 10 : 20;"), "20\n");
    // Right associative chaining.
    assert_eq!(run("x = 2; println x == 1 ? 10 : x == 2 ? 20 : 30;"), "20\n");
    // Only the taken branch evaluates.
    assert_eq!(run("println 1 ? 5 : 1 / 0;"), "5\n");
}

#[test]
fn check_mutable_assignment() {
    assert_eq!(run("x = 4; println x;"), "4\n");
    assert_eq!(run("x = 4; x = 5; println x;"), "5\n");
    assert_eq!(run("x = 1; y = x; x = 2; println y;"), "1\n");
    // Reading an undefined variable is a recoverable fault.
    assert_eq!(run("println nothing;"), "0\n");
}

#[test]
fn check_immutable_bindings() {
    assert_eq!(run("x := 1; println x;"), "1\n");
    // Reassignment of an immutable binding is a diagnosed no-op.
    assert_eq!(run("x := 1; x = 2; println x;"), "1\n");
    assert_eq!(run("x := 1; x := 2; println x;"), "1\n");
    // Inner blocks may shadow; the binding dies with its frame.
    assert_eq!(
        run("x := 1; if 1 { x := 2; println x; } println x;"),
        "2\n1\n"
    );
    // An immutable binding shadows a global of the same name.
    assert_eq!(run("x = 7; if 1 { x := 2; println x; } println x;"), "2\n7\n");
}

#[test]
fn check_loop_and_break() {
    assert_eq!(
        run("i = 0; loop { if i >= 3 { break; } println i; i = i + 1; }"),
        "0\n1\n2\n"
    );
    // The loop guard coerces an array to its length.
    assert_eq!(
        run("arr = [4]; i = 0; loop { if i >= arr { break; } println i; i = i + 1; }"),
        "0\n1\n2\n3\n"
    );
    // break out of nested blocks keeps scopes intact.
    assert_eq!(
        run(concat!(
            "x := 9; i = 0;\n",
            "loop { i = i + 1; if i > 1 { if 1 { break; } } }\n",
            "println x; println i;"
        )),
        "9\n2\n"
    );
    assert!(run("break;").starts_with("ERROR:"));
}

#[test]
fn check_functions() {
    assert_eq!(run("func f(a, b) { return a + b; } println f(2, 3);"), "5\n");
    // Falling off the end and bare return both yield zero.
    assert_eq!(run("func f() { } println f();"), "0\n");
    assert_eq!(run("func f() { return; } println f();"), "0\n");
    // Parameters are immutable bindings.
    assert_eq!(run("func f(a) { a = 9; return a; } println f(1);"), "1\n");
    // `=` inside a function writes the global environment.
    assert_eq!(run("func f() { g = 5; } f(); println g;"), "5\n");
    // The callee does not see the caller's `:=` frames.
    assert_eq!(run("k := 3; func f() { return k; } println f();"), "0\n");
    // Recursion.
    assert_eq!(
        run("func fact(n) { return n <= 1 ? 1 : n * fact(n - 1); } println fact(10);"),
        "3628800\n"
    );
    // Functions are first class values under their declared name.
    assert_eq!(
        run("func double(n) { return n * 2; } d = double; println d(21);"),
        "42\n"
    );
    assert_eq!(run("x = 3; println x(1);"), "0\n");
}

#[test]
fn check_call_depth_is_bounded() {
    let out = run("func f() { return f(); } f();");
    assert!(out.starts_with("ERROR:"), "got: {}", out);
    assert!(out.contains("stack overflow"), "got: {}", out);
}

#[test]
fn check_arrays() {
    assert_eq!(run("a = [3]; println a[0];"), "0\n");
    assert_eq!(run("a = [3]; a[1] = 5; println a[1];"), "5\n");
    assert_eq!(run("a = [2]; b = a; b[0] = 9; println a[0];"), "9\n");
    // Out of bounds reads yield zero and the program continues.
    assert_eq!(run("a = [2]; println a[5]; println 7;"), "0\n7\n");
    assert_eq!(run("a = [2]; println a[-1];"), "0\n");
    // Out of bounds writes are no-ops.
    assert_eq!(run("a = [2]; a[5] = 1; println a;"), "2\n");
    // Negative sizes allocate empty.
    assert_eq!(run("a = [-3]; println a;"), "0\n");
    // Nested arrays through index chains.
    assert_eq!(
        run("a = [2]; a[0] = [3]; a[0][1] = 8; println a[0][1];"),
        "8\n"
    );
    // Indexing a non-array degrades to zero.
    assert_eq!(run("x = 5; println x[0];"), "0\n");
}

#[test]
fn check_strings() {
    assert_eq!(run("s = \"hi\"; println s[0]; println s[1];"), "h\ni\n");
    // Length through integer coercion.
    assert_eq!(run("s = \"hello\"; println s + 0;"), "5\n");
    // String cells are ordinary locations.
    assert_eq!(run("s = \"cat\"; s[0] = 'h'; println s;"), "hat\n");
    // Escapes survive to the output.
    assert_eq!(run("println \"a\\tb\";"), "a\tb\n");
}

#[test]
fn check_structs() {
    assert_eq!(run("struct P { x = 3; y; } p = struct P; println p.x; println p.y;"), "3\n0\n");
    // Later template fields see earlier ones at instantiation.
    assert_eq!(run("struct Q { a = 2; b = a + 1; } q = struct Q; println q.b;"), "3\n");
    // Open structs: new fields appear on assignment, missing fields
    // read as zero, and both stay per instance.
    assert_eq!(
        run(concat!(
            "struct P { x = 0; }\n",
            "a = struct P; b = struct P;\n",
            "a.fresh = 7;\n",
            "println a.fresh; println b.fresh;"
        )),
        "7\n0\n"
    );
    // Instances alias by reference.
    assert_eq!(
        run("struct P { x = 0; } a = struct P; b = a; a.x = 7; println b.x;"),
        "7\n"
    );
    // `:=` fields reject reassignment per instance.
    assert_eq!(
        run("struct C { step := 1; } c = struct C; c.step = 5; println c.step;"),
        "1\n"
    );
    // Heap valued initializers are evaluated per instance, not shared.
    assert_eq!(
        run(concat!(
            "struct H { buf = [2]; }\n",
            "a = struct H; b = struct H;\n",
            "a.buf[0] = 9;\n",
            "println a.buf[0]; println b.buf[0];"
        )),
        "9\n0\n"
    );
    assert_eq!(run("p = struct Unknown; println p;"), "0\n");
}

#[test]
fn check_struct_field_paths() {
    assert_eq!(
        run(concat!(
            "struct Inner { v = 1; }\n",
            "struct Outer { in; }\n",
            "o = struct Outer; o.in = struct Inner;\n",
            "o.in.v = 42;\n",
            "println o.in.v;"
        )),
        "42\n"
    );
    assert_eq!(
        run(concat!(
            "struct P { x = 0; }\n",
            "arr = [2]; arr[0] = struct P;\n",
            "arr[0].x = 5;\n",
            "println arr[0].x;"
        )),
        "5\n"
    );
}

#[test]
fn check_comments_and_separators() {
    assert_eq!(run("# leading # println 1; # mid \n comment # println 2;"), "1\n2\n");
    // Trailing semicolons are optional noise.
    assert_eq!(run("println 1"), "1\n");
    assert_eq!(run("println 1;;"), "ERROR: error[1:11] expected expression, got Semicolon");
}

#[test]
fn check_lex_and_parse_errors() {
    assert!(run("x = $;").starts_with("ERROR:"));
    assert!(run("x = ;").starts_with("ERROR:"));
    assert!(run("1 + 2 := 3;").starts_with("ERROR:"));
    assert!(run("f(0) = 1;").starts_with("ERROR:"));
    assert!(run("x.y := 1;").starts_with("ERROR:"));
    assert!(run("if 1 {").starts_with("ERROR:"));
}

#[test]
fn check_parse_print_roundtrip() {
    let src = concat!(
        "import util.math;\n",
        "struct C { x = 0; step := 1; next ::= x + step; bare; }\n",
        "func mk(n, m) { s := struct C; s.x = n * m; return s; }\n",
        "a = [3];\n",
        "a[0] ::= base + 1;\n",
        "a[1].f = -2;\n",
        "b := (1 < 2) < 3;\n",
        "c = 1 && 0 || 1 ? 'x' : \"y\\n\";\n",
        "loop { if c { break; } else { print c; } }\n",
        "println mk(1, 2).x;\n",
        "return 0;\n",
    );

    let parse = |s: &str| rxl::parser::parse(rxl::lexer::tokenize(s).unwrap()).unwrap();

    let ast1 = parse(src);
    let printed = program_to_src(&ast1);
    let ast2 = parse(&printed);
    assert_eq!(ast1, ast2, "printed form was:\n{}", printed);
}

#[test]
fn check_bytecode_dump() {
    let prog = rxl::compile_str(
        "struct C { n ::= x; } func f() { return 1; } y ::= 2; println \"s\";",
    )
    .unwrap();
    let dump = prog.dump();
    assert!(dump.contains("main:"), "{}", dump);
    assert!(dump.contains("strings:"), "{}", dump);
    assert!(dump.contains("funcs:"), "{}", dump);
    assert!(dump.contains("templates:"), "{}", dump);
    assert!(dump.contains("thunks:"), "{}", dump);
    assert!(dump.contains("reactive_put y thunk["), "{}", dump);
    assert!(dump.contains("halt"), "{}", dump);
}

#[test]
fn check_gc_survives_allocation_churn() {
    // Enough garbage to force several sweeps; the live results must
    // survive them.
    assert_eq!(
        run(concat!(
            "keep = [1]; keep[0] = 42;\n",
            "i = 0;\n",
            "loop { tmp = [8]; i = i + 1; if i >= 70000 { break; } }\n",
            "println keep[0];"
        )),
        "42\n"
    );
}

// ---------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------

fn module_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("rxl-test-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn check_module_import_runs_once() {
    let dir = module_dir("once");
    std::fs::write(
        dir.join("util.rx"),
        "println 7; func util_double(x) { return x * 2; }",
    )
    .unwrap();

    let out = run_with_root("import util; import util; println util_double(21);", &dir);
    assert_eq!(out, "7\n42\n");
}

#[test]
fn check_module_dotted_paths() {
    let dir = module_dir("dotted");
    std::fs::create_dir_all(dir.join("a/b")).unwrap();
    std::fs::write(dir.join("a/b/c.rx"), "exported = 11;").unwrap();

    let out = run_with_root("import a.b.c; println exported;", &dir);
    assert_eq!(out, "11\n");
}

#[test]
fn check_module_import_cycle_is_broken_by_load_once() {
    let dir = module_dir("cycle");
    std::fs::write(dir.join("a.rx"), "import b; println 1;").unwrap();
    std::fs::write(dir.join("b.rx"), "import a; println 2;").unwrap();

    let out = run_with_root("import a;", &dir);
    assert_eq!(out, "2\n1\n");
}

#[test]
fn check_missing_module_is_fatal() {
    let dir = module_dir("missing");
    let prog = rxl::compile_str("import gone;").unwrap();
    let mut vm = Vm::new();
    vm.set_module_root(dir);
    match vm.run(&prog) {
        Err(e) => assert_eq!(e.exit_code(), 2),
        Ok(()) => panic!("import of a missing module succeeded"),
    }
}
