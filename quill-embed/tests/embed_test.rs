// quill-embed - Engine integration tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Engine-level tests: the whole pipeline behind one call.

use std::rc::Rc;

use quill_embed::{Engine, EngineError};
use quill_syntax::ast::{BlockNode, CallNode, Expr, FunDeclNode, Identifier, ModuleNode, Pos, Stmt};
use quill_syntax::types::{Param, Tag, TypeDef, VarDef};

fn pos() -> Pos {
    Pos::new(1, 1)
}

fn int_lit(value: i64) -> Rc<Expr> {
    Rc::new(Expr::IntLit { value, pos: pos() })
}

fn ident(name: &str) -> Rc<Expr> {
    Rc::new(Expr::Ident {
        parts: vec![Identifier::new(name)],
        access_ns: String::new(),
        pos: pos(),
    })
}

fn add_fun() -> Rc<Stmt> {
    let body = BlockNode::new(
        vec![Rc::new(Stmt::Return {
            expr: Some(Rc::new(Expr::Binary {
                op: "+".to_string(),
                left: ident("a"),
                right: ident("b"),
                pos: pos(),
            })),
            pos: pos(),
        })],
        pos(),
    );
    Rc::new(Stmt::FunctionDefinition(Rc::new(FunDeclNode::new(
        "add",
        TypeDef::new(Tag::Int),
        vec![
            Param::Single(VarDef::new("a", TypeDef::new(Tag::Int))),
            Param::Single(VarDef::new("b", TypeDef::new(Tag::Int))),
        ],
        Some(Rc::new(body)),
        pos(),
    ))))
}

fn exit_with(expr: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Exit {
        code: expr,
        pos: pos(),
    })
}

fn call(name: &str, args: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Call(Rc::new(CallNode::new(name, args, pos()))))
}

#[test]
fn test_engine_runs_a_program() {
    let module = Rc::new(ModuleNode::new(
        "main",
        "app",
        vec![
            add_fun(),
            exit_with(call("add", vec![int_lit(40), int_lit(2)])),
        ],
    ));
    let engine = Engine::new(vec![module], "main");
    assert_eq!(engine.run().unwrap(), 42);
}

#[test]
fn test_engine_check_reports_semantic_errors() {
    let module = Rc::new(ModuleNode::new(
        "main",
        "app",
        vec![exit_with(ident("missing"))],
    ));
    let engine = Engine::new(vec![module], "main");

    match engine.check() {
        Err(EngineError::Semantic(message)) => {
            assert!(message.contains("SemanticError"), "got: {}", message);
            assert!(message.contains("missing"), "got: {}", message);
        }
        other => panic!("expected a semantic error, got {:?}", other.err()),
    }
}

#[test]
fn test_engine_surfaces_runtime_errors() {
    let module = Rc::new(ModuleNode::new(
        "main",
        "app",
        vec![Rc::new(Stmt::Throw {
            error: Rc::new(Expr::StringLit {
                value: "unhandled".to_string(),
                pos: pos(),
            }),
            pos: pos(),
        })],
    ));
    let engine = Engine::new(vec![module], "main");

    match engine.run() {
        Err(EngineError::Runtime(message)) => {
            assert!(message.contains("unhandled"), "got: {}", message);
        }
        other => panic!("expected a runtime error, got {:?}", other.err()),
    }
}

#[test]
fn test_engine_empty_program_exits_zero() {
    let module = Rc::new(ModuleNode::new("main", "app", Vec::new()));
    let engine = Engine::new(vec![module], "main");
    assert_eq!(engine.run().unwrap(), 0);
}
