// quill-vm - Runtime error and unwinding tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime failure semantics: every error is offered to the innermost
//! `try`; unhandled errors carry a formatted trace.

mod common;

use common::*;
use quill_syntax::types::Tag;

#[test]
fn test_uncaught_division_by_zero() {
    let err = run(vec![
        decl("z", ty(Tag::Int), Some(int_lit(0))),
        exit(binary("/", int_lit(1), ident("z"))),
    ])
    .unwrap_err();
    assert!(err.starts_with("RuntimeError:"), "got: {}", err);
    assert!(err.contains("division by zero"), "got: {}", err);
    assert!(err.contains(" at "), "got: {}", err);
}

#[test]
fn test_caught_division_by_zero() {
    assert_exit!(
        vec![
            decl("z", ty(Tag::Int), Some(int_lit(0))),
            try_catch(
                vec![expr_stmt(binary("/", int_lit(1), ident("z")))],
                ("e", ty(Tag::String)),
                vec![exit(int_lit(3))],
            ),
            exit(int_lit(0)),
        ],
        3
    );
}

#[test]
fn test_array_index_out_of_range() {
    assert_runtime_err!(
        vec![
            decl(
                "xs",
                array_ty(Tag::Int, vec![0]),
                Some(array_ctor(vec![int_lit(1), int_lit(2), int_lit(3)])),
            ),
            exit(ident_index("xs", int_lit(10))),
        ],
        "array access position 10"
    );
}

#[test]
fn test_caught_index_error_binds_message() {
    // The catch binding of type string receives the message text.
    assert_exit!(
        vec![
            decl(
                "xs",
                array_ty(Tag::Int, vec![0]),
                Some(array_ctor(vec![int_lit(1)])),
            ),
            try_catch(
                vec![exit(ident_index("xs", int_lit(5)))],
                ("e", ty(Tag::String)),
                vec![exit(ternary(
                    binary("in", str_lit("access position"), ident("e")),
                    int_lit(1),
                    int_lit(0),
                ))],
            ),
            exit(int_lit(0)),
        ],
        1
    );
}

#[test]
fn test_uncaught_throw_carries_message() {
    let err = run(vec![throw(str_lit("custom failure"))]).unwrap_err();
    assert!(err.contains("custom failure"), "got: {}", err);
    assert!(err.starts_with("RuntimeError:"), "got: {}", err);
}

#[test]
fn test_exception_crosses_call_frames() {
    // fun boom() -> int { throw "bang" }  try { boom() } catch (e) { exit(5) }
    assert_exit!(
        vec![
            fun(
                "boom",
                ty(Tag::Int),
                Vec::new(),
                vec![throw(str_lit("bang"))],
            ),
            try_catch(
                vec![expr_stmt(call("boom", Vec::new()))],
                ("e", object_ty("Exception")),
                vec![exit(int_lit(5))],
            ),
            exit(int_lit(0)),
        ],
        5
    );
}

#[test]
fn test_exception_unwinds_loops_inside_try() {
    // try { while (true) { throw "x" } } catch (e) { exit(6) }
    assert_exit!(
        vec![
            try_catch(
                vec![while_loop(bool_lit(true), vec![throw(str_lit("x"))])],
                ("e", ty(Tag::String)),
                vec![exit(int_lit(6))],
            ),
            exit(int_lit(0)),
        ],
        6
    );
}

#[test]
fn test_nested_try_inner_catches_first() {
    assert_exit!(
        vec![
            try_catch(
                vec![try_catch(
                    vec![throw(str_lit("inner"))],
                    ("e", ty(Tag::String)),
                    vec![exit(int_lit(1))],
                )],
                ("outer", ty(Tag::String)),
                vec![exit(int_lit(2))],
            ),
            exit(int_lit(0)),
        ],
        1
    );
}

#[test]
fn test_rethrow_from_catch_reaches_outer() {
    assert_exit!(
        vec![
            try_catch(
                vec![try_catch(
                    vec![throw(str_lit("first"))],
                    ("e", ty(Tag::String)),
                    vec![throw(ident("e"))],
                )],
                ("outer", ty(Tag::String)),
                vec![exit(ternary(
                    binary("==", ident("outer"), str_lit("first")),
                    int_lit(9),
                    int_lit(0),
                ))],
            ),
            exit(int_lit(0)),
        ],
        9
    );
}

#[test]
fn test_execution_continues_after_handled_error() {
    // The program recovers and keeps running after the catch block.
    assert_exit!(
        vec![
            decl("n", ty(Tag::Int), Some(int_lit(0))),
            try_catch(
                vec![throw(str_lit("once"))],
                ("e", ty(Tag::String)),
                vec![expr_stmt(assign(ident("n"), int_lit(40)))],
            ),
            expr_stmt(binary("+=", ident("n"), int_lit(2))),
            exit(ident("n")),
        ],
        42
    );
}

#[test]
fn test_trace_names_call_chain() {
    // main -> outer -> inner, inner fails; the trace lists both frames.
    let err = run(vec![
        fun(
            "inner",
            ty(Tag::Int),
            Vec::new(),
            vec![throw(str_lit("deep failure"))],
        ),
        fun(
            "outer",
            ty(Tag::Int),
            Vec::new(),
            vec![ret(call("inner", Vec::new()))],
        ),
        exit(call("outer", Vec::new())),
    ])
    .unwrap_err();
    assert!(err.contains("deep failure"), "got: {}", err);
    assert!(err.contains("inner"), "got: {}", err);
    assert!(err.contains("outer"), "got: {}", err);
}

#[test]
fn test_invalid_operand_types() {
    assert_runtime_err!(
        vec![
            decl("b", ty(Tag::Any), Some(bool_lit(true))),
            exit(binary("+", ident("b"), int_lit(1))),
        ],
        "invalid '+' operator"
    );
}

#[test]
fn test_invalid_cast_is_catchable() {
    assert_exit!(
        vec![
            decl("s", ty(Tag::String), Some(str_lit("not a number"))),
            try_catch(
                vec![exit(cast(Tag::Int, ident("s")))],
                ("e", ty(Tag::String)),
                vec![exit(int_lit(4))],
            ),
            exit(int_lit(0)),
        ],
        4
    );
}
