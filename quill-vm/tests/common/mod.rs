// quill-vm - Common test utilities
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared test helpers for the pipeline integration tests.
//!
//! The lexer and parser are external collaborators, so tests build syntax
//! trees directly with these constructors and run them through the full
//! analyse -> compile -> execute pipeline.
//!
//! Programs report results through their exit code (`exit(expr)`), which
//! `run` returns.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use quill_syntax::ast::{
    BlockNode, CallNode, DeclNode, ElseIfNode, Expr, ForEachNode, ForNode, FunDeclNode,
    Identifier, IfNode, ModuleNode, Pos, Stmt, SwitchNode, TryCatchNode, UnpackNode, WhileNode,
};
use quill_syntax::types::{DefaultValue, Param, Tag, TypeDef, VarDef};
use quill_vm::modules::{ModuleBuiltin, ModuleGc, NativeModule};
use quill_vm::{Analyser, Compiler, Vm};

pub fn pos() -> Pos {
    Pos::new(1, 1)
}

// ----------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------

pub fn ty(tag: Tag) -> TypeDef {
    TypeDef::new(tag)
}

pub fn array_ty(tag: Tag, dims: Vec<usize>) -> TypeDef {
    TypeDef::array(tag, dims)
}

/// A not-yet-resolved object type; the analyser decides struct vs class.
pub fn object_ty(name: &str) -> TypeDef {
    TypeDef::object(Tag::Object, "", name)
}

// ----------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------

pub fn int_lit(value: i64) -> Rc<Expr> {
    Rc::new(Expr::IntLit { value, pos: pos() })
}

pub fn float_lit(value: f64) -> Rc<Expr> {
    Rc::new(Expr::FloatLit { value, pos: pos() })
}

pub fn bool_lit(value: bool) -> Rc<Expr> {
    Rc::new(Expr::BoolLit { value, pos: pos() })
}

pub fn char_lit(value: char) -> Rc<Expr> {
    Rc::new(Expr::CharLit { value, pos: pos() })
}

pub fn str_lit(value: &str) -> Rc<Expr> {
    Rc::new(Expr::StringLit {
        value: value.to_string(),
        pos: pos(),
    })
}

pub fn null_lit() -> Rc<Expr> {
    Rc::new(Expr::Null { pos: pos() })
}

pub fn ident(name: &str) -> Rc<Expr> {
    Rc::new(Expr::Ident {
        parts: vec![Identifier::new(name)],
        access_ns: String::new(),
        pos: pos(),
    })
}

pub fn ident_index(name: &str, index: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Ident {
        parts: vec![Identifier::indexed(name, vec![index])],
        access_ns: String::new(),
        pos: pos(),
    })
}

/// `base.member`
pub fn member(base: &str, member_name: &str) -> Rc<Expr> {
    Rc::new(Expr::Ident {
        parts: vec![Identifier::new(base), Identifier::new(member_name)],
        access_ns: String::new(),
        pos: pos(),
    })
}

pub fn binary(op: &str, left: Rc<Expr>, right: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Binary {
        op: op.to_string(),
        left,
        right,
        pos: pos(),
    })
}

pub fn unary(op: &str, expr: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Unary {
        op: op.to_string(),
        expr,
        pos: pos(),
    })
}

pub fn assign(target: Rc<Expr>, value: Rc<Expr>) -> Rc<Expr> {
    binary("=", target, value)
}

pub fn array_ctor(values: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::ArrayCtor {
        ty: RefCell::new(TypeDef::default()),
        values: RefCell::new(values),
        pos: pos(),
    })
}

pub fn struct_ctor(type_name: &str, values: Vec<(&str, Rc<Expr>)>) -> Rc<Expr> {
    Rc::new(Expr::StructCtor {
        type_ns: RefCell::new(String::new()),
        type_name: type_name.to_string(),
        values: values
            .into_iter()
            .map(|(n, e)| (n.to_string(), e))
            .collect(),
        pos: pos(),
    })
}

pub fn call(name: &str, args: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Call(Rc::new(CallNode::new(name, args, pos()))))
}

/// `self.method(args)`
pub fn self_call(method_name: &str, args: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Call(Rc::new(CallNode {
        access_ns: String::new(),
        callee: vec![Identifier::new("self"), Identifier::new(method_name)],
        args,
        post_access: Vec::new(),
        chained: None,
        pos: pos(),
    })))
}

/// `self.field`
pub fn self_field(field: &str) -> Rc<Expr> {
    Rc::new(Expr::Ident {
        parts: vec![Identifier::new("self"), Identifier::new(field)],
        access_ns: String::new(),
        pos: pos(),
    })
}

/// `Name(args).method(margs)`
pub fn chained_method(name: &str, args: Vec<Rc<Expr>>, method_name: &str, margs: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Call(Rc::new(CallNode {
        access_ns: String::new(),
        callee: vec![Identifier::new(name)],
        args,
        post_access: Vec::new(),
        chained: Some(Rc::new(CallNode::new(method_name, margs, pos()))),
        pos: pos(),
    })))
}

pub fn ternary(condition: Rc<Expr>, if_true: Rc<Expr>, if_false: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Ternary {
        condition,
        if_true,
        if_false,
        pos: pos(),
    })
}

pub fn cast(tag: Tag, expr: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::TypeCast {
        tag,
        expr,
        pos: pos(),
    })
}

pub fn lambda(fun: Rc<FunDeclNode>) -> Rc<Expr> {
    Rc::new(Expr::Lambda { fun, pos: pos() })
}

// ----------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------

pub fn decl(name: &str, declared: TypeDef, expr: Option<Rc<Expr>>) -> Rc<Stmt> {
    Rc::new(Stmt::Declaration(Rc::new(DeclNode::new(
        name, declared, expr, pos(),
    ))))
}

pub fn constexpr_decl(name: &str, declared: TypeDef, expr: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Declaration(Rc::new(DeclNode::constant(
        name,
        declared,
        Some(expr),
        true,
        pos(),
    ))))
}

pub fn expr_stmt(expr: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Expr(expr))
}

pub fn ret(expr: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Return {
        expr: Some(expr),
        pos: pos(),
    })
}

pub fn ret_void() -> Rc<Stmt> {
    Rc::new(Stmt::Return {
        expr: None,
        pos: pos(),
    })
}

pub fn exit(expr: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Exit {
        code: expr,
        pos: pos(),
    })
}

pub fn block(statements: Vec<Rc<Stmt>>) -> Rc<BlockNode> {
    Rc::new(BlockNode::new(statements, pos()))
}

pub fn throw(error: Rc<Expr>) -> Rc<Stmt> {
    Rc::new(Stmt::Throw { error, pos: pos() })
}

pub fn try_catch(
    try_stmts: Vec<Rc<Stmt>>,
    catch_decl: (&str, TypeDef),
    catch_stmts: Vec<Rc<Stmt>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::TryCatch(Rc::new(TryCatchNode {
        decl: Some(Rc::new(DeclNode::new(
            catch_decl.0,
            catch_decl.1,
            None,
            pos(),
        ))),
        try_block: block(try_stmts),
        catch_block: block(catch_stmts),
        pos: pos(),
    })))
}

pub fn if_else(
    condition: Rc<Expr>,
    then_stmts: Vec<Rc<Stmt>>,
    else_stmts: Option<Vec<Rc<Stmt>>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::If(Rc::new(IfNode {
        condition,
        if_block: block(then_stmts),
        else_ifs: Vec::new(),
        else_block: else_stmts.map(block),
        pos: pos(),
    })))
}

pub fn if_elseif_else(
    condition: Rc<Expr>,
    then_stmts: Vec<Rc<Stmt>>,
    else_ifs: Vec<(Rc<Expr>, Vec<Rc<Stmt>>)>,
    else_stmts: Option<Vec<Rc<Stmt>>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::If(Rc::new(IfNode {
        condition,
        if_block: block(then_stmts),
        else_ifs: else_ifs
            .into_iter()
            .map(|(c, b)| ElseIfNode {
                condition: c,
                block: block(b),
                pos: pos(),
            })
            .collect(),
        else_block: else_stmts.map(block),
        pos: pos(),
    })))
}

pub fn while_loop(condition: Rc<Expr>, body: Vec<Rc<Stmt>>) -> Rc<Stmt> {
    Rc::new(Stmt::While(Rc::new(WhileNode {
        condition,
        block: block(body),
        pos: pos(),
    })))
}

pub fn do_while_loop(condition: Rc<Expr>, body: Vec<Rc<Stmt>>) -> Rc<Stmt> {
    Rc::new(Stmt::DoWhile(Rc::new(WhileNode {
        condition,
        block: block(body),
        pos: pos(),
    })))
}

pub fn for_loop(
    init: Rc<Stmt>,
    condition: Rc<Expr>,
    step: Rc<Stmt>,
    body: Vec<Rc<Stmt>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::For(Rc::new(ForNode {
        init: Some(init),
        condition: Some(condition),
        step: Some(step),
        block: block(body),
        pos: pos(),
    })))
}

pub fn foreach_decl(
    name: &str,
    declared: TypeDef,
    collection: Rc<Expr>,
    body: Vec<Rc<Stmt>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::ForEach(Rc::new(ForEachNode {
        decl: Rc::new(Stmt::Declaration(Rc::new(DeclNode::new(
            name, declared, None, pos(),
        )))),
        collection,
        block: block(body),
        pos: pos(),
    })))
}

pub fn foreach_unpack(
    key: &str,
    value: &str,
    collection: Rc<Expr>,
    body: Vec<Rc<Stmt>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::ForEach(Rc::new(ForEachNode {
        decl: Rc::new(Stmt::UnpackedDeclaration(Rc::new(UnpackNode {
            ty: RefCell::new(TypeDef::new(Tag::Any)),
            decls: vec![
                Rc::new(DeclNode::new(key, TypeDef::new(Tag::String), None, pos())),
                Rc::new(DeclNode::new(value, TypeDef::new(Tag::Any), None, pos())),
            ],
            expr: null_lit(),
            pos: pos(),
        }))),
        collection,
        block: block(body),
        pos: pos(),
    })))
}

pub fn brk() -> Rc<Stmt> {
    Rc::new(Stmt::Break { pos: pos() })
}

pub fn cont() -> Rc<Stmt> {
    Rc::new(Stmt::Continue { pos: pos() })
}

pub fn enum_stmt(names: Vec<&str>) -> Rc<Stmt> {
    Rc::new(Stmt::Enum {
        names: names.into_iter().map(str::to_string).collect(),
        pos: pos(),
    })
}

pub fn switch(
    condition: Rc<Expr>,
    statements: Vec<Rc<Stmt>>,
    cases: Vec<(Rc<Expr>, usize)>,
    default_block: Option<usize>,
) -> Rc<Stmt> {
    Rc::new(Stmt::Switch(Rc::new(SwitchNode {
        condition,
        statements,
        cases,
        default_block,
        parsed_cases: RefCell::new(Vec::new()),
        pos: pos(),
    })))
}

// ----------------------------------------------------------------------
// Definitions
// ----------------------------------------------------------------------

pub fn param(name: &str, declared: TypeDef) -> Param {
    Param::Single(VarDef::new(name, declared))
}

pub fn rest_param(name: &str, declared: TypeDef) -> Param {
    Param::Single(VarDef::rest(name, declared))
}

pub fn default_param(name: &str, declared: TypeDef, default: Rc<Expr>) -> Param {
    Param::Single(VarDef::with_default(
        name,
        declared,
        DefaultValue::Expr(default),
    ))
}

pub fn fun_node(
    name: &str,
    ret_ty: TypeDef,
    params: Vec<Param>,
    body: Option<Vec<Rc<Stmt>>>,
) -> Rc<FunDeclNode> {
    Rc::new(FunDeclNode::new(
        name,
        ret_ty,
        params,
        body.map(block),
        pos(),
    ))
}

pub fn fun(name: &str, ret_ty: TypeDef, params: Vec<Param>, body: Vec<Rc<Stmt>>) -> Rc<Stmt> {
    Rc::new(Stmt::FunctionDefinition(fun_node(
        name,
        ret_ty,
        params,
        Some(body),
    )))
}

pub fn struct_def(name: &str, fields: Vec<(&str, TypeDef)>) -> Rc<Stmt> {
    Rc::new(Stmt::StructDefinition(Rc::new(
        quill_syntax::ast::StructDeclNode {
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|(n, t)| Rc::new(VarDef::new(n, t)))
                .collect(),
            pos: pos(),
        },
    )))
}

pub fn class_def(
    name: &str,
    fields: Vec<(&str, TypeDef, Option<Rc<Expr>>)>,
    methods: Vec<Rc<FunDeclNode>>,
) -> Rc<Stmt> {
    Rc::new(Stmt::ClassDefinition(Rc::new(
        quill_syntax::ast::ClassDeclNode {
            name: name.to_string(),
            declarations: fields
                .into_iter()
                .map(|(n, t, e)| Rc::new(DeclNode::new(n, t, e, pos())))
                .collect(),
            functions: methods,
            pos: pos(),
        },
    )))
}

// ----------------------------------------------------------------------
// Running
// ----------------------------------------------------------------------

pub fn module(statements: Vec<Rc<Stmt>>) -> Rc<ModuleNode> {
    Rc::new(ModuleNode::new("main", "app", statements))
}

/// Analyse a module's statements, returning the first semantic error.
pub fn check(statements: Vec<Rc<Stmt>>) -> Result<(), String> {
    let mut analyser = Analyser::new(vec![module(statements)], "main");
    ModuleBuiltin::new().register_analysis(&mut analyser);
    analyser.add_core_lib("gc", Rc::new(ModuleGc::new()));
    analyser.analyse().map_err(|e| e.to_string())
}

/// Run a module's statements through the full pipeline, returning the exit
/// code or the formatted error.
pub fn run(statements: Vec<Rc<Stmt>>) -> Result<i64, String> {
    run_modules(vec![module(statements)], "main")
}

/// Run several modules; `main` names the entry module.
pub fn run_modules(modules: Vec<Rc<ModuleNode>>, main: &str) -> Result<i64, String> {
    let mut analyser = Analyser::new(modules.clone(), main);
    ModuleBuiltin::new().register_analysis(&mut analyser);
    analyser.add_core_lib("gc", Rc::new(ModuleGc::new()));
    analyser.analyse().map_err(|e| e.to_string())?;

    let compiler = Compiler::new(modules, main);
    let program = compiler.compile().map_err(|e| e.to_string())?;

    let mut vm = Vm::new(program);
    ModuleBuiltin::new().register_runtime(&mut vm);
    vm.add_core_lib("gc", Rc::new(ModuleGc::new()));
    vm.run().map_err(|e| e.to_string())
}

/// Assert the program exits with the expected code.
#[macro_export]
macro_rules! assert_exit {
    ($stmts:expr, $expected:expr) => {
        let result = $crate::common::run($stmts);
        assert!(
            result.is_ok(),
            "program failed unexpectedly: {:?}",
            result.err()
        );
        assert_eq!(result.unwrap(), $expected, "wrong exit code");
    };
}

/// Assert analysis rejects the program with a message containing the
/// pattern.
#[macro_export]
macro_rules! assert_semantic_err {
    ($stmts:expr, $pattern:expr) => {
        let result = $crate::common::check($stmts);
        assert!(result.is_err(), "expected a semantic error");
        let message = result.unwrap_err();
        assert!(
            message.contains($pattern),
            "error '{}' does not contain '{}'",
            message,
            $pattern
        );
    };
}

/// Assert the program fails at runtime with a message containing the
/// pattern.
#[macro_export]
macro_rules! assert_runtime_err {
    ($stmts:expr, $pattern:expr) => {
        let result = $crate::common::run($stmts);
        assert!(result.is_err(), "expected a runtime error");
        let message = result.unwrap_err();
        assert!(
            message.contains($pattern),
            "error '{}' does not contain '{}'",
            message,
            $pattern
        );
    };
}
