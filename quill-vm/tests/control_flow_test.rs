// quill-vm - Control flow and dispatch tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Loops, switch lowering, overload dispatch, defaults, lambdas,
//! compound assignment and casts, end to end.

mod common;

use common::*;
use quill_syntax::types::Tag;

#[test]
fn test_while_with_break() {
    assert_exit!(
        vec![
            decl("n", ty(Tag::Int), Some(int_lit(0))),
            while_loop(
                bool_lit(true),
                vec![
                    expr_stmt(assign(ident("n"), binary("+", ident("n"), int_lit(1)))),
                    if_else(
                        binary("==", ident("n"), int_lit(4)),
                        vec![brk()],
                        None,
                    ),
                ],
            ),
            exit(ident("n")),
        ],
        4
    );
}

#[test]
fn test_for_with_continue_skips_step_value() {
    // for (int i = 0; i < 5; i += 1) { if (i == 2) continue; s += i }
    assert_exit!(
        vec![
            decl("s", ty(Tag::Int), Some(int_lit(0))),
            for_loop(
                decl("i", ty(Tag::Int), Some(int_lit(0))),
                binary("<", ident("i"), int_lit(5)),
                expr_stmt(binary("+=", ident("i"), int_lit(1))),
                vec![
                    if_else(
                        binary("==", ident("i"), int_lit(2)),
                        vec![cont()],
                        None,
                    ),
                    expr_stmt(binary("+=", ident("s"), ident("i"))),
                ],
            ),
            exit(ident("s")),
        ],
        8
    );
}

#[test]
fn test_do_while_runs_body_first() {
    assert_exit!(
        vec![
            decl("n", ty(Tag::Int), Some(int_lit(0))),
            do_while_loop(
                binary("<", ident("n"), int_lit(3)),
                vec![expr_stmt(binary("+=", ident("n"), int_lit(1)))],
            ),
            exit(ident("n")),
        ],
        3
    );
}

#[test]
fn test_switch_dispatch_and_fall_through() {
    // switch (x) { case 1: n = 10; break; case 2: n = 20; /* falls */ default: n += 100 }
    let build = |x: i64| {
        vec![
            decl("x", ty(Tag::Int), Some(int_lit(x))),
            decl("n", ty(Tag::Int), Some(int_lit(0))),
            switch(
                ident("x"),
                vec![
                    expr_stmt(assign(ident("n"), int_lit(10))),
                    brk(),
                    expr_stmt(assign(ident("n"), int_lit(20))),
                    expr_stmt(binary("+=", ident("n"), int_lit(100))),
                ],
                vec![(int_lit(1), 0), (int_lit(2), 2)],
                Some(3),
            ),
            exit(ident("n")),
        ]
    };
    assert_exit!(build(1), 10);
    assert_exit!(build(2), 120);
    assert_exit!(build(5), 100);
}

#[test]
fn test_overload_priority() {
    // Strict beats relaxed beats variadic.
    let defs = vec![
        fun(
            "g",
            ty(Tag::Int),
            vec![param("a", ty(Tag::Int))],
            vec![ret(int_lit(1))],
        ),
        fun(
            "g",
            ty(Tag::Int),
            vec![param("a", ty(Tag::Float))],
            vec![ret(int_lit(2))],
        ),
        fun(
            "g",
            ty(Tag::Int),
            vec![rest_param("r", array_ty(Tag::Any, vec![0]))],
            vec![ret(int_lit(3))],
        ),
    ];

    let mut with_int = defs.clone();
    with_int.push(exit(call("g", vec![int_lit(5)])));
    assert_exit!(with_int, 1);

    let mut with_float = defs.clone();
    with_float.push(exit(call("g", vec![float_lit(1.5)])));
    assert_exit!(with_float, 2);

    let mut with_bool = defs;
    with_bool.push(exit(call("g", vec![bool_lit(true)])));
    assert_exit!(with_bool, 3);
}

#[test]
fn test_exact_beats_default_filled() {
    assert_exit!(
        vec![
            fun(
                "h",
                ty(Tag::Int),
                vec![
                    param("a", ty(Tag::Int)),
                    default_param("b", ty(Tag::Int), int_lit(1)),
                ],
                vec![ret(int_lit(2))],
            ),
            fun(
                "h",
                ty(Tag::Int),
                vec![param("a", ty(Tag::Int))],
                vec![ret(int_lit(1))],
            ),
            exit(call("h", vec![int_lit(7)])),
        ],
        1
    );
}

#[test]
fn test_default_argument_snippet() {
    assert_exit!(
        vec![
            fun(
                "d",
                ty(Tag::Int),
                vec![
                    param("a", ty(Tag::Int)),
                    default_param("b", ty(Tag::Int), int_lit(5)),
                ],
                vec![ret(binary("+", ident("a"), ident("b")))],
            ),
            exit(call("d", vec![int_lit(10)])),
        ],
        15
    );
}

#[test]
fn test_default_argument_may_call_user_function() {
    assert_exit!(
        vec![
            fun("base", ty(Tag::Int), Vec::new(), vec![ret(int_lit(4))]),
            fun(
                "e",
                ty(Tag::Int),
                vec![default_param("a", ty(Tag::Int), call("base", Vec::new()))],
                vec![ret(ident("a"))],
            ),
            exit(call("e", Vec::new())),
        ],
        4
    );
}

#[test]
fn test_lambda_through_function_variable() {
    // function f = <lambda x -> x * 2>; exit(f(21))
    assert_exit!(
        vec![
            decl(
                "f",
                ty(Tag::Function),
                Some(lambda(fun_node(
                    "lambda@1",
                    ty(Tag::Int),
                    vec![param("x", ty(Tag::Int))],
                    Some(vec![ret(binary("*", ident("x"), int_lit(2)))]),
                ))),
            ),
            exit(call("f", vec![int_lit(21)])),
        ],
        42
    );
}

#[test]
fn test_compound_assignment_and_increment() {
    assert_exit!(
        vec![
            decl("n", ty(Tag::Int), Some(int_lit(10))),
            expr_stmt(binary("+=", ident("n"), int_lit(5))),
            expr_stmt(binary("*=", ident("n"), int_lit(2))),
            exit(binary("+", ident("n"), unary("++", int_lit(11)))),
        ],
        42
    );
}

#[test]
fn test_ternary_selects_branch() {
    assert_exit!(
        vec![exit(ternary(
            binary("<", int_lit(1), int_lit(2)),
            int_lit(7),
            int_lit(8),
        ))],
        7
    );
}

#[test]
fn test_enum_declares_ordinals() {
    assert_exit!(
        vec![
            enum_stmt(vec!["RED", "GREEN", "BLUE"]),
            exit(ident("BLUE")),
        ],
        2
    );
}

#[test]
fn test_casts() {
    assert_exit!(vec![exit(cast(Tag::Int, str_lit("42")))], 42);
    assert_exit!(vec![exit(cast(Tag::Int, float_lit(3.9)))], 3);
    assert_exit!(
        vec![exit(ternary(
            binary("==", cast(Tag::String, int_lit(5)), str_lit("5")),
            int_lit(1),
            int_lit(0),
        ))],
        1
    );
}

#[test]
fn test_string_character_assignment() {
    // string s = "abc"; s[0] = 'x'; exit(s == "xbc")
    assert_exit!(
        vec![
            decl("s", ty(Tag::String), Some(str_lit("abc"))),
            expr_stmt(assign(ident_index("s", int_lit(0)), char_lit('x'))),
            exit(ternary(
                binary("==", ident("s"), str_lit("xbc")),
                int_lit(1),
                int_lit(0),
            )),
        ],
        1
    );
}

#[test]
fn test_struct_field_assignment() {
    assert_exit!(
        vec![
            struct_def("P", vec![("x", ty(Tag::Int)), ("y", ty(Tag::Int))]),
            decl(
                "p",
                object_ty("P"),
                Some(struct_ctor("P", vec![("x", int_lit(1)), ("y", int_lit(2))])),
            ),
            expr_stmt(assign(member("p", "x"), int_lit(5))),
            exit(binary("+", member("p", "x"), member("p", "y"))),
        ],
        7
    );
}

#[test]
fn test_this_describes_module_context() {
    use quill_syntax::ast::{Expr, Identifier};
    use std::rc::Rc;

    let this_type = Rc::new(Expr::This {
        access: vec![Identifier::new("type")],
        pos: pos(),
    });
    assert_exit!(
        vec![exit(ternary(
            binary("==", this_type, str_lit("module")),
            int_lit(1),
            int_lit(0),
        ))],
        1
    );
}

#[test]
fn test_typeof_and_is_array() {
    use quill_syntax::ast::Expr;
    use std::rc::Rc;

    let type_of_one = Rc::new(Expr::TypeOf {
        expr: int_lit(1),
        pos: pos(),
    });
    assert_exit!(
        vec![exit(ternary(
            binary("==", type_of_one, str_lit("int")),
            int_lit(1),
            int_lit(0),
        ))],
        1
    );

    let is_array = Rc::new(Expr::IsArray {
        expr: ident("xs"),
        pos: pos(),
    });
    assert_exit!(
        vec![
            decl(
                "xs",
                array_ty(Tag::Int, vec![0]),
                Some(array_ctor(vec![int_lit(1)])),
            ),
            exit(ternary(is_array, int_lit(1), int_lit(0))),
        ],
        1
    );
}

#[test]
fn test_short_circuit_evaluation() {
    // and/or short-circuit: the right side must not run when the left
    // decides. A division by zero on the right would otherwise fail.
    assert_exit!(
        vec![
            decl("safe", ty(Tag::Bool), Some(bool_lit(false))),
            if_else(
                binary(
                    "and",
                    ident("safe"),
                    binary("==", binary("/", int_lit(1), int_lit(0)), float_lit(1.0)),
                ),
                vec![exit(int_lit(9))],
                None,
            ),
            exit(int_lit(1)),
        ],
        1
    );
}

#[test]
fn test_nested_function_calls() {
    assert_exit!(
        vec![
            fun(
                "twice",
                ty(Tag::Int),
                vec![param("x", ty(Tag::Int))],
                vec![ret(binary("*", ident("x"), int_lit(2)))],
            ),
            exit(call("twice", vec![call("twice", vec![int_lit(10)])])),
        ],
        40
    );
}

#[test]
fn test_recursion() {
    // fun fact(int n) -> int { if (n <= 1) { return 1 } return n * fact(n - 1) }
    assert_exit!(
        vec![
            fun(
                "fact",
                ty(Tag::Int),
                vec![param("n", ty(Tag::Int))],
                vec![
                    if_else(
                        binary("<=", ident("n"), int_lit(1)),
                        vec![ret(int_lit(1))],
                        None,
                    ),
                    ret(binary(
                        "*",
                        ident("n"),
                        call("fact", vec![binary("-", ident("n"), int_lit(1))]),
                    )),
                ],
            ),
            exit(call("fact", vec![int_lit(5)])),
        ],
        120
    );
}
