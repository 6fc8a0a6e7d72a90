// quill-vm - GC core library
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The `gc` core library: collector control from user code.
//!
//! Loaded lazily through `using gc` (the `BuiltinLib` instruction) and
//! declared in the `std` namespace.

use std::rc::Rc;

use quill_core::constants::STD_NAMESPACE;
use quill_core::scope::Scope;
use quill_core::value::Value;
use quill_core::{RuntimeError, RuntimeResult};
use quill_syntax::types::{Tag, TypeDef};

use super::{native_fun, param, NativeModule};
use crate::analysis::Analyser;
use crate::vm::{NativeFn, Vm};

/// The module name the gc library's scope belongs to.
const GC_MODULE: &str = "gc";

const FUNCTION_NAMES: [&str; 6] = [
    "gc_is_enabled",
    "gc_enable",
    "gc_collect",
    "gc_maybe_collect",
    "gc_get_max_heap",
    "gc_set_max_heap",
];

/// The gc core library.
pub struct ModuleGc;

impl ModuleGc {
    pub fn new() -> Self {
        ModuleGc
    }

    fn declarations() -> Vec<quill_core::scope::FunRef> {
        vec![
            native_fun("gc_is_enabled", TypeDef::new(Tag::Bool), Vec::new()),
            native_fun(
                "gc_enable",
                TypeDef::new(Tag::Void),
                vec![param("enable", TypeDef::new(Tag::Bool))],
            ),
            native_fun("gc_collect", TypeDef::new(Tag::Void), Vec::new()),
            native_fun("gc_maybe_collect", TypeDef::new(Tag::Void), Vec::new()),
            native_fun("gc_get_max_heap", TypeDef::new(Tag::Int), Vec::new()),
            native_fun(
                "gc_set_max_heap",
                TypeDef::new(Tag::Void),
                vec![param("max_heap", TypeDef::new(Tag::Int))],
            ),
        ]
    }
}

impl Default for ModuleGc {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeModule for ModuleGc {
    fn register_analysis(&self, analyser: &mut Analyser) {
        if analyser.scopes.global_scope(GC_MODULE).is_none() {
            analyser
                .scopes
                .push_scope(Scope::new(STD_NAMESPACE, GC_MODULE));
        }
        let scope = analyser
            .scopes
            .global_scope(GC_MODULE)
            .expect("gc scope was just pushed");
        for fun in Self::declarations() {
            let name = fun.borrow().name.clone();
            scope.borrow_mut().declare_function(name, fun);
        }
        for name in FUNCTION_NAMES {
            analyser.builtin_functions.insert(name.to_string());
        }
    }

    fn register_runtime(&self, vm: &mut Vm) {
        if vm.scopes.global_scope(GC_MODULE).is_none() {
            vm.scopes.push_scope(Scope::new(STD_NAMESPACE, GC_MODULE));
        }
        let scope = vm
            .scopes
            .global_scope(GC_MODULE)
            .expect("gc scope was just pushed");
        for fun in Self::declarations() {
            let name = fun.borrow().name.clone();
            scope.borrow_mut().declare_function(name, fun);
        }

        vm.builtin_functions.insert(
            "gc_is_enabled".to_string(),
            Rc::new(|vm: &mut Vm| -> RuntimeResult<()> {
                let enabled = vm.gc.enabled;
                vm.alloc_push(Value::bool(enabled));
                Ok(())
            }) as NativeFn,
        );
        vm.builtin_functions.insert(
            "gc_enable".to_string(),
            Rc::new(|vm: &mut Vm| -> RuntimeResult<()> {
                let enable = vm
                    .native_arg(STD_NAMESPACE, "enable")?
                    .borrow()
                    .as_bool()
                    .ok_or_else(|| RuntimeError::internal("gc_enable expects a bool"))?;
                vm.gc.enabled = enable;
                vm.alloc_push(Value::undefined());
                Ok(())
            }) as NativeFn,
        );
        vm.builtin_functions.insert(
            "gc_collect".to_string(),
            Rc::new(|vm: &mut Vm| -> RuntimeResult<()> {
                vm.collect_garbage();
                vm.alloc_push(Value::undefined());
                Ok(())
            }) as NativeFn,
        );
        vm.builtin_functions.insert(
            "gc_maybe_collect".to_string(),
            Rc::new(|vm: &mut Vm| -> RuntimeResult<()> {
                vm.maybe_collect_garbage()?;
                vm.alloc_push(Value::undefined());
                Ok(())
            }) as NativeFn,
        );
        vm.builtin_functions.insert(
            "gc_get_max_heap".to_string(),
            Rc::new(|vm: &mut Vm| -> RuntimeResult<()> {
                let max_heap = vm.gc.max_heap as i64;
                vm.alloc_push(Value::int(max_heap));
                Ok(())
            }) as NativeFn,
        );
        vm.builtin_functions.insert(
            "gc_set_max_heap".to_string(),
            Rc::new(|vm: &mut Vm| -> RuntimeResult<()> {
                let max_heap = vm
                    .native_arg(STD_NAMESPACE, "max_heap")?
                    .borrow()
                    .as_int()
                    .ok_or_else(|| RuntimeError::internal("gc_set_max_heap expects an int"))?;
                if max_heap < 0 {
                    return Err(RuntimeError::internal("max heap cannot be negative"));
                }
                vm.gc.max_heap = max_heap as usize;
                vm.alloc_push(Value::undefined());
                Ok(())
            }) as NativeFn,
        );
    }
}
