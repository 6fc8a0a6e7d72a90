// quill-embed - Embedding API for Quill
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # quill-embed
//!
//! A high-level embedding API for the Quill programming language core.
//!
//! The engine takes parsed modules (the lexer and parser are external
//! collaborators), runs semantic analysis, lowers to bytecode and executes
//! on the virtual machine, returning the program's exit code.

pub mod engine;

pub use engine::{Engine, EngineError, Result};
