// quill-syntax - Syntax tree contract for the Quill programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # quill-syntax
//!
//! The syntax tree contract consumed by the Quill semantic analyser and
//! bytecode compiler. The lexer and parser that produce these trees are
//! external collaborators; this crate only defines the node shapes, the
//! type-tag universe, and the definition records (variables, functions,
//! structs, classes) shared by every later pipeline stage.

pub mod ast;
pub mod ops;
pub mod types;

pub use ast::{
    BlockNode, CallNode, DeclNode, ElseIfNode, Expr, ForEachNode, ForNode, FunDeclNode,
    Identifier, IfNode, ModuleNode, Pos, Stmt, SwitchNode, TryCatchNode, UnpackNode,
};
pub use types::{
    ClassDef, DefaultValue, FunDef, Param, StructDef, Tag, TypeDef, UnpackGroup, VarDef,
};
