// quill-vm - Native module registry
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Native module protocol.
//!
//! A module registers twice: the analyser receives the struct shapes and
//! function signatures it should honour, the VM receives the same
//! signatures plus the named closures that implement them. Closures take
//! their arguments from the scope the call pushed and push exactly one
//! return value.

mod builtin;
mod gc;

pub use builtin::ModuleBuiltin;
pub use gc::ModuleGc;

use quill_core::fun_ref;
use quill_core::scope::FunRef;
use quill_syntax::types::{FunDef, Param, TypeDef, VarDef};

use crate::analysis::Analyser;
use crate::vm::Vm;

/// A native library attachable to the analyser and the VM.
pub trait NativeModule {
    /// Declare shapes and honoured names into the analyser.
    fn register_analysis(&self, analyser: &mut Analyser);

    /// Declare shapes and install closures into the VM.
    fn register_runtime(&self, vm: &mut Vm);
}

/// A bodiless function definition for a native callable.
pub(crate) fn native_fun(name: &str, ret: TypeDef, params: Vec<Param>) -> FunRef {
    fun_ref(FunDef::new(name, ret, params))
}

/// An ordinary positional parameter.
pub(crate) fn param(name: &str, ty: TypeDef) -> Param {
    Param::Single(VarDef::new(name, ty))
}

/// A rest parameter collecting the call tail.
pub(crate) fn rest_param(name: &str, ty: TypeDef) -> Param {
    Param::Single(VarDef::rest(name, ty))
}
