// quill-vm - Semantic analysis tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Analyser rejection tests: every program here must fail analysis with a
//! specific message, before any bytecode is produced.

mod common;

use common::*;
use quill_syntax::types::Tag;

#[test]
fn test_undeclared_identifier() {
    assert_semantic_err!(vec![exit(ident("nope"))], "was not declared");
}

#[test]
fn test_duplicate_declaration() {
    assert_semantic_err!(
        vec![
            decl("x", ty(Tag::Int), Some(int_lit(1))),
            decl("x", ty(Tag::Int), Some(int_lit(2))),
            exit(int_lit(0)),
        ],
        "already declared"
    );
}

#[test]
fn test_shadowing_in_inner_block_is_allowed() {
    use quill_syntax::ast::Stmt;
    use std::rc::Rc;

    let inner = Rc::new(Stmt::Block(block(vec![decl(
        "x",
        ty(Tag::Int),
        Some(int_lit(2)),
    )])));
    assert!(check(vec![
        decl("x", ty(Tag::Int), Some(int_lit(1))),
        inner,
        exit(ident("x")),
    ])
    .is_ok());
}

#[test]
fn test_void_variable_rejected() {
    assert_semantic_err!(vec![decl("x", ty(Tag::Void), None)], "void");
}

#[test]
fn test_condition_must_be_bool() {
    assert_semantic_err!(
        vec![if_else(int_lit(1), vec![exit(int_lit(1))], None)],
        "must be 'bool'"
    );
}

#[test]
fn test_declaration_type_mismatch() {
    assert_semantic_err!(
        vec![decl("x", ty(Tag::Int), Some(str_lit("nope")))],
        "cannot initialise"
    );
}

#[test]
fn test_assignment_type_mismatch() {
    assert_semantic_err!(
        vec![
            decl("x", ty(Tag::Int), Some(int_lit(1))),
            expr_stmt(assign(ident("x"), str_lit("s"))),
        ],
        "cannot assign"
    );
}

#[test]
fn test_numeric_coercion_is_accepted() {
    assert!(check(vec![
        decl("f", ty(Tag::Float), Some(int_lit(1))),
        decl("i", ty(Tag::Int), Some(float_lit(2.5))),
        decl("s", ty(Tag::String), Some(char_lit('c'))),
    ])
    .is_ok());
}

#[test]
fn test_break_outside_loop() {
    assert_semantic_err!(vec![brk()], "outside of a loop");
}

#[test]
fn test_continue_outside_loop() {
    assert_semantic_err!(vec![cont()], "outside of a loop");
}

#[test]
fn test_break_allowed_in_switch() {
    assert!(check(vec![
        decl("x", ty(Tag::Int), Some(int_lit(1))),
        switch(
            ident("x"),
            vec![brk()],
            vec![(int_lit(1), 0)],
            None,
        ),
    ])
    .is_ok());
}

#[test]
fn test_non_total_return_rejected() {
    // fun f(int x) -> int { if (x > 0) { return 1 } }  - no else
    assert_semantic_err!(
        vec![fun(
            "f",
            ty(Tag::Int),
            vec![param("x", ty(Tag::Int))],
            vec![if_else(
                binary(">", ident("x"), int_lit(0)),
                vec![ret(int_lit(1))],
                None,
            )],
        )],
        "does not return a value on every path"
    );
}

#[test]
fn test_if_else_coverage_accepted() {
    assert!(check(vec![fun(
        "f",
        ty(Tag::Int),
        vec![param("x", ty(Tag::Int))],
        vec![if_else(
            binary(">", ident("x"), int_lit(0)),
            vec![ret(int_lit(1))],
            Some(vec![ret(int_lit(2))]),
        )],
    )])
    .is_ok());
}

#[test]
fn test_throw_counts_as_coverage() {
    assert!(check(vec![fun(
        "f",
        ty(Tag::Int),
        Vec::new(),
        vec![throw(str_lit("always"))],
    )])
    .is_ok());
}

#[test]
fn test_switch_fall_through_coverage() {
    // case 0 falls into case 1's returning block; the default returns.
    let covered = fun(
        "f",
        ty(Tag::Int),
        vec![param("x", ty(Tag::Int))],
        vec![switch(
            ident("x"),
            vec![
                expr_stmt(assign(ident("x"), int_lit(9))),
                ret(int_lit(1)),
                ret(int_lit(2)),
            ],
            vec![(int_lit(0), 0), (int_lit(1), 1)],
            Some(2),
        )],
    );
    assert!(check(vec![covered]).is_ok());

    // A case that breaks before returning does not cover.
    let broken = fun(
        "g",
        ty(Tag::Int),
        vec![param("x", ty(Tag::Int))],
        vec![switch(
            ident("x"),
            vec![brk(), ret(int_lit(1))],
            vec![(int_lit(0), 0)],
            Some(1),
        )],
    );
    assert_semantic_err!(vec![broken], "does not return a value on every path");
}

#[test]
fn test_switch_without_default_does_not_cover() {
    assert_semantic_err!(
        vec![fun(
            "f",
            ty(Tag::Int),
            vec![param("x", ty(Tag::Int))],
            vec![switch(
                ident("x"),
                vec![ret(int_lit(1))],
                vec![(int_lit(0), 0)],
                None,
            )],
        )],
        "does not return a value on every path"
    );
}

#[test]
fn test_duplicate_case_value() {
    assert_semantic_err!(
        vec![
            decl("x", ty(Tag::Int), Some(int_lit(1))),
            switch(
                ident("x"),
                vec![brk(), brk()],
                vec![(int_lit(1), 0), (int_lit(1), 1)],
                None,
            ),
        ],
        "duplicate case"
    );
}

#[test]
fn test_case_must_be_constexpr() {
    assert_semantic_err!(
        vec![
            decl("x", ty(Tag::Int), Some(int_lit(1))),
            decl("y", ty(Tag::Int), Some(int_lit(2))),
            switch(ident("x"), vec![brk()], vec![(ident("y"), 0)], None),
        ],
        "constant expression"
    );
}

#[test]
fn test_constexpr_case_through_constant() {
    assert!(check(vec![
        constexpr_decl("K", ty(Tag::Int), int_lit(2)),
        decl("x", ty(Tag::Int), Some(int_lit(1))),
        switch(ident("x"), vec![brk()], vec![(ident("K"), 0)], None),
    ])
    .is_ok());
}

#[test]
fn test_rest_parameter_must_be_last() {
    assert_semantic_err!(
        vec![fun(
            "f",
            ty(Tag::Void),
            vec![
                rest_param("r", array_ty(Tag::Any, vec![0])),
                param("a", ty(Tag::Int)),
            ],
            vec![ret_void()],
        )],
        "rest parameter must be the last"
    );
}

#[test]
fn test_defaults_form_contiguous_suffix() {
    assert_semantic_err!(
        vec![fun(
            "f",
            ty(Tag::Void),
            vec![
                default_param("a", ty(Tag::Int), int_lit(1)),
                param("b", ty(Tag::Int)),
            ],
            vec![ret_void()],
        )],
        "must also have defaults"
    );
}

#[test]
fn test_duplicate_definition_with_body() {
    assert_semantic_err!(
        vec![
            fun("f", ty(Tag::Int), Vec::new(), vec![ret(int_lit(1))]),
            fun("f", ty(Tag::Int), Vec::new(), vec![ret(int_lit(2))]),
        ],
        "already defined"
    );
}

#[test]
fn test_overloads_by_signature_are_allowed() {
    assert!(check(vec![
        fun(
            "f",
            ty(Tag::Int),
            vec![param("a", ty(Tag::Int))],
            vec![ret(int_lit(1))],
        ),
        fun(
            "f",
            ty(Tag::Int),
            vec![param("a", ty(Tag::String))],
            vec![ret(int_lit(2))],
        ),
    ])
    .is_ok());
}

#[test]
fn test_forward_declaration_must_be_implemented() {
    use quill_syntax::ast::Stmt;
    use std::rc::Rc;

    let forward = Rc::new(Stmt::FunctionDefinition(fun_node(
        "later",
        ty(Tag::Int),
        Vec::new(),
        None,
    )));
    assert_semantic_err!(vec![forward], "never implemented");
}

#[test]
fn test_forward_declaration_completed_by_body() {
    use quill_syntax::ast::Stmt;
    use std::rc::Rc;

    let forward = Rc::new(Stmt::FunctionDefinition(fun_node(
        "later",
        ty(Tag::Int),
        Vec::new(),
        None,
    )));
    assert!(check(vec![
        forward,
        fun("later", ty(Tag::Int), Vec::new(), vec![ret(int_lit(1))]),
    ])
    .is_ok());
}

#[test]
fn test_constexpr_requires_constant_initialiser() {
    assert_semantic_err!(
        vec![
            fun("f", ty(Tag::Int), Vec::new(), vec![ret(int_lit(1))]),
            constexpr_decl("n", ty(Tag::Int), call("f", Vec::new())),
        ],
        "constant initialiser"
    );
}

#[test]
fn test_constexpr_folding_through_operators() {
    assert!(check(vec![constexpr_decl(
        "n",
        ty(Tag::Int),
        binary("*", binary("+", int_lit(2), int_lit(3)), int_lit(4)),
    )])
    .is_ok());
}

#[test]
fn test_throw_requires_string_or_exception() {
    assert_semantic_err!(vec![throw(int_lit(1))], "throw requires");
}

#[test]
fn test_foreach_requires_iterable() {
    assert_semantic_err!(
        vec![
            decl("n", ty(Tag::Int), Some(int_lit(1))),
            foreach_decl("x", ty(Tag::Any), ident("n"), Vec::new()),
        ],
        "not iterable"
    );
}

#[test]
fn test_foreach_destructuring_requires_struct() {
    assert_semantic_err!(
        vec![
            decl(
                "xs",
                array_ty(Tag::Int, vec![0]),
                Some(array_ctor(vec![int_lit(1)])),
            ),
            foreach_unpack("k", "v", ident("xs"), Vec::new()),
        ],
        "requires a struct collection"
    );
}

#[test]
fn test_call_signature_mismatch() {
    assert_semantic_err!(
        vec![
            fun(
                "f",
                ty(Tag::Int),
                vec![param("a", ty(Tag::Int))],
                vec![ret(int_lit(1))],
            ),
            exit(call("f", vec![str_lit("s")])),
        ],
        "was not declared"
    );
}

#[test]
fn test_constructor_must_exist() {
    assert_semantic_err!(
        vec![
            class_def("C", vec![("n", ty(Tag::Int), None)], Vec::new()),
            exit(chained_method("C", Vec::new(), "get", Vec::new())),
        ],
        "no constructor"
    );
}

#[test]
fn test_void_function_cannot_return_value() {
    assert_semantic_err!(
        vec![fun(
            "f",
            ty(Tag::Void),
            Vec::new(),
            vec![ret(int_lit(1))],
        )],
        "void function cannot return"
    );
}

#[test]
fn test_non_void_return_requires_value() {
    assert_semantic_err!(
        vec![fun("f", ty(Tag::Int), Vec::new(), vec![ret_void()])],
        "must return a value"
    );
}

#[test]
fn test_error_message_carries_location() {
    let err = check(vec![exit(ident("missing"))]).unwrap_err();
    assert!(err.starts_with("SemanticError:"), "got: {}", err);
    assert!(err.contains("main"), "got: {}", err);
}
