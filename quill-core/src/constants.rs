// quill-core - Reserved names and built-in struct shapes
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Reserved namespaces, module names and the built-in struct shapes every
//! program can rely on.

use quill_syntax::types::{StructDef, Tag, TypeDef, VarDef};

/// The namespace built-in functions and structs are declared in.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The namespace reserved for the standard library.
pub const STD_NAMESPACE: &str = "std";

/// The module name the built-in function scope belongs to.
pub const BUILTIN_MODULE: &str = "builtin";

/// Core libraries loadable through the `BuiltinLib` instruction.
pub const CORE_LIB_NAMES: [&str; 10] = [
    "gc", "graphics", "files", "console", "datetime", "input", "sound", "http", "sys", "os",
];

/// `Entry{key, value}` - one element of a struct iteration.
pub const ENTRY_STRUCT: &str = "Entry";
pub const ENTRY_KEY: &str = "key";
pub const ENTRY_VALUE: &str = "value";

/// `Exception{error, code}` - the struct form of a thrown error.
pub const EXCEPTION_STRUCT: &str = "Exception";
pub const EXCEPTION_ERROR: &str = "error";
pub const EXCEPTION_CODE: &str = "code";

/// `Context{name, ns, type}` - what `this` evaluates to.
pub const CONTEXT_STRUCT: &str = "Context";
pub const CONTEXT_NAME: &str = "name";
pub const CONTEXT_NS: &str = "ns";
pub const CONTEXT_TYPE: &str = "type";

/// Build the `Entry` struct shape.
pub fn entry_struct_def() -> StructDef {
    StructDef::with_fields(
        ENTRY_STRUCT,
        vec![
            VarDef::new(ENTRY_KEY, TypeDef::new(Tag::String)),
            VarDef::new(ENTRY_VALUE, TypeDef::new(Tag::Any)),
        ],
    )
}

/// Build the `Exception` struct shape.
pub fn exception_struct_def() -> StructDef {
    StructDef::with_fields(
        EXCEPTION_STRUCT,
        vec![
            VarDef::new(EXCEPTION_ERROR, TypeDef::new(Tag::String)),
            VarDef::new(EXCEPTION_CODE, TypeDef::new(Tag::Int)),
        ],
    )
}

/// Build the `Context` struct shape.
pub fn context_struct_def() -> StructDef {
    StructDef::with_fields(
        CONTEXT_STRUCT,
        vec![
            VarDef::new(CONTEXT_NAME, TypeDef::new(Tag::String)),
            VarDef::new(CONTEXT_NS, TypeDef::new(Tag::String)),
            VarDef::new(CONTEXT_TYPE, TypeDef::new(Tag::String)),
        ],
    )
}

/// The `Exception` struct type definition.
pub fn exception_type() -> TypeDef {
    TypeDef::object(Tag::Struct, DEFAULT_NAMESPACE, EXCEPTION_STRUCT)
}

/// The `Entry` struct type definition.
pub fn entry_type() -> TypeDef {
    TypeDef::object(Tag::Struct, DEFAULT_NAMESPACE, ENTRY_STRUCT)
}

/// The `Context` struct type definition.
pub fn context_type() -> TypeDef {
    TypeDef::object(Tag::Struct, DEFAULT_NAMESPACE, CONTEXT_STRUCT)
}
