// quill-vm - Semantic analyser, bytecode compiler and virtual machine for the Quill programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # quill-vm
//!
//! The Quill core pipeline: a one-pass semantic analyser over parsed
//! modules, a bytecode compiler that lowers the checked tree into a flat
//! instruction list with a per-PC debug table, and the stack-based virtual
//! machine that executes it.
//!
//! # Pipeline
//!
//! ```text
//! parsed modules -> Analyser -> Compiler -> Vm::run
//! ```
//!
//! The analyser annotates and checks the tree (namespaces, overloads,
//! return coverage, constant folding); the compiler emits instructions with
//! forward-patched jumps and scope markers; the VM executes with a scope
//! manager, structured exceptions, an iterator protocol and overload-aware
//! dispatch. Native libraries attach through [`modules::NativeModule`].

pub mod analysis;
pub mod compiler;
pub mod debug;
pub mod modules;
pub mod opcode;
pub mod vm;

pub use analysis::{Analyser, SemanticError};
pub use compiler::{CompileError, Compiler, Program};
pub use debug::{DebugInfo, DebugTable};
pub use modules::{ModuleBuiltin, ModuleGc, NativeModule};
pub use opcode::Instruction;
pub use vm::{NativeFn, Vm, VmError};
