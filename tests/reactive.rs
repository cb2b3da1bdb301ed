// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

//! End to end tests of the reactive engine: lazy cells over globals,
//! struct fields and array cells, capture semantics and cycle policy.

fn run(code: &str) -> String {
    match rxl::eval(code) {
        Ok(out) => out,
        Err(e) => format!("ERROR: {}", e),
    }
}

#[test]
fn check_reactive_scalar() {
    assert_eq!(
        run("x = 1; y ::= x + 1; println y; x = 10; println y;"),
        "2\n11\n"
    );
}

#[test]
fn check_loop_with_capture() {
    assert_eq!(
        run(concat!(
            "arr = [3]; i = 0;\n",
            "loop { j := i; arr[j] ::= j * 10; i = i + 1; if i >= 3 { break; } }\n",
            "print arr[0]; print arr[1]; print arr[2];"
        )),
        "01020"
    );
}

#[test]
fn check_struct_reactive_field() {
    assert_eq!(
        run(concat!(
            "struct C { x = 0; step := 1; next ::= x + step; }\n",
            "c = struct C;\n",
            "println c.next;\n",
            "c.x = 10;\n",
            "println c.next;"
        )),
        "1\n11\n"
    );
}

#[test]
fn check_function_returning_struct_aliased() {
    assert_eq!(
        run(concat!(
            "struct P { x = 0; }\n",
            "func mk() { s := struct P; return s; }\n",
            "a = mk(); b = a; a.x = 7; println b.x;"
        )),
        "7\n"
    );
}

#[test]
fn check_array_length_as_loop_guard() {
    assert_eq!(
        run("arr = [4]; i = 0; loop { if i >= arr { break; } println i; i = i + 1; }"),
        "0\n1\n2\n3\n"
    );
}

#[test]
fn check_reactive_chain_through_indexed_cells() {
    assert_eq!(
        run(concat!(
            "base = 1; arr = [5];\n",
            "arr[0] ::= base;\n",
            "arr[1] ::= arr[0] + 1;\n",
            "arr[2] ::= arr[1] + 1;\n",
            "arr[3] ::= arr[2] + 1;\n",
            "arr[4] ::= arr[3] + 1;\n",
            "println arr[4];\n",
            "base = 10;\n",
            "println arr[4];"
        )),
        "5\n14\n"
    );
}

#[test]
fn check_repeated_reads_are_stable() {
    // Two reads with no intervening mutation observe equal values.
    assert_eq!(run("x = 2; y ::= x * 3; println y; println y;"), "6\n6\n");
}

#[test]
fn check_assignment_forms_replace_each_other() {
    // `=` replaces a reactive cell with a concrete value...
    assert_eq!(
        run("x = 1; y ::= x + 1; y = 100; x = 50; println y;"),
        "100\n"
    );
    // ...and `::=` replaces a concrete value with a reactive cell.
    assert_eq!(run("y = 100; x = 1; y ::= x + 1; x = 2; println y;"), "3\n");
}

#[test]
fn check_reactive_reads_resolve_globals_live() {
    // No re-binding needed: mutations of anything the expression reads
    // are observable on the next read, transitively.
    assert_eq!(
        run(concat!(
            "a = 1; b = 1;\n",
            "s ::= a + b;\n",
            "d ::= s * 2;\n",
            "println d;\n",
            "a = 5; println d;\n",
            "b = 5; println d;"
        )),
        "4\n12\n20\n"
    );
}

#[test]
fn check_immutable_capture_snapshot() {
    // The `:=` binding is captured at assignment time and stays visible
    // to the cell after its frame is gone.
    assert_eq!(
        run(concat!(
            "base = 1;\n",
            "if 1 { k := 2; y ::= base * k; }\n",
            "base = 3;\n",
            "println y;"
        )),
        "6\n"
    );
    // A later binding of the same name does not leak into the cell.
    assert_eq!(
        run(concat!(
            "if 1 { k := 2; y ::= k; }\n",
            "if 1 { k := 9; println y; }"
        )),
        "2\n"
    );
}

#[test]
fn check_array_index_captured_by_value() {
    // The cell index is fixed when the reactive assignment executes;
    // mutating `i` afterwards must not move the cell.
    assert_eq!(
        run(concat!(
            "arr = [3]; i = 0;\n",
            "arr[i] ::= 42;\n",
            "i = 2;\n",
            "println arr[0]; println arr[2];"
        )),
        "42\n0\n"
    );
}

#[test]
fn check_self_cycle_yields_zero() {
    assert_eq!(run("x ::= x + 1; println x; println 9;"), "0\n9\n");
}

#[test]
fn check_mutual_cycle_yields_zero_and_recovers() {
    assert_eq!(
        run(concat!(
            "a ::= b + 1; b ::= a + 1;\n",
            "println a;\n",
            "b = 10;\n",
            "println a;"
        )),
        // First read: a -> b -> a breaks with 0, so b is 1, a is 2.
        // After b = 10 the cell for b is gone and a reads 11.
        "2\n11\n"
    );
}

#[test]
fn check_cycle_set_clears_between_reads() {
    // The in-flight set is per read: the same location may be forced
    // again in the very next expression.
    assert_eq!(run("x = 1; y ::= x; println y + y;"), "2\n");
}

#[test]
fn check_struct_sibling_scope() {
    // Unqualified names in a reactive field resolve to sibling fields
    // first, then to the reader's enclosing scope.
    assert_eq!(
        run(concat!(
            "outer = 100;\n",
            "struct C { x = 1; sum ::= x + outer; }\n",
            "c = struct C;\n",
            "println c.sum;\n",
            "outer = 200; c.x = 2;\n",
            "println c.sum;"
        )),
        "101\n202\n"
    );
    // Sibling fields added after instantiation participate too.
    assert_eq!(
        run(concat!(
            "struct C { }\n",
            "c = struct C;\n",
            "c.a = 5;\n",
            "c.total ::= a * 2;\n",
            "println c.total;"
        )),
        "10\n"
    );
}

#[test]
fn check_struct_reactive_fields_are_per_instance() {
    assert_eq!(
        run(concat!(
            "struct C { x = 0; next ::= x + 1; }\n",
            "a = struct C; b = struct C;\n",
            "a.x = 10;\n",
            "println a.next; println b.next;"
        )),
        "11\n1\n"
    );
}

#[test]
fn check_reactive_cell_returning_heap_object() {
    // The permissive rule: a reactive cell may hold a call returning a
    // heap object; every read re-evaluates the call and field access
    // applies to the fresh object.
    assert_eq!(
        run(concat!(
            "struct P { x = 0; }\n",
            "func mk(n) { s := struct P; s.x = n; return s; }\n",
            "cnt = 1;\n",
            "r ::= mk(cnt);\n",
            "println r.x;\n",
            "cnt = 2;\n",
            "println r.x;"
        )),
        "1\n2\n"
    );
    // An immutable bind of the same expression freezes the identity.
    assert_eq!(
        run(concat!(
            "struct P { x = 0; }\n",
            "func mk(n) { s := struct P; s.x = n; return s; }\n",
            "cnt = 1;\n",
            "q := mk(cnt);\n",
            "cnt = 2;\n",
            "println q.x;"
        )),
        "1\n"
    );
}

#[test]
fn check_reactive_through_lvalue_paths() {
    // `::=` through a struct field path.
    assert_eq!(
        run(concat!(
            "struct P { v = 0; }\n",
            "p = struct P;\n",
            "n = 3;\n",
            "p.v ::= n * n;\n",
            "println p.v;\n",
            "n = 4;\n",
            "println p.v;"
        )),
        "9\n16\n"
    );
    // `::=` through a nested array path.
    assert_eq!(
        run(concat!(
            "m = [2]; m[0] = [2];\n",
            "k = 5;\n",
            "m[0][1] ::= k + 1;\n",
            "println m[0][1];\n",
            "k = 6;\n",
            "println m[0][1];"
        )),
        "6\n7\n"
    );
}

#[test]
fn check_reactive_faults_degrade_to_zero() {
    // Division by zero inside a cell.
    assert_eq!(run("d = 0; y ::= 10 / d; println y; d = 2; println y;"), "0\n5\n");
    // Out of bounds dependency.
    assert_eq!(run("a = [2]; y ::= a[9]; println y;"), "0\n");
    // Undefined dependency resolves later.
    assert_eq!(run("y ::= missing + 1; println y; missing = 4; println y;"), "1\n5\n");
}

#[test]
fn check_reactive_cells_inside_function_scope() {
    // `::=` inside a function writes the global location; the captured
    // frame holds the parameter.
    assert_eq!(
        run(concat!(
            "func setup(n) { cell ::= n * base; }\n",
            "base = 2;\n",
            "setup(3);\n",
            "println cell;\n",
            "base = 5;\n",
            "println cell;"
        )),
        "6\n15\n"
    );
}
