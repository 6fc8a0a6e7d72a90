// quill-vm - Built-in module
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The always-present built-in module.
//!
//! Predeclares the `Entry`, `Exception` and `Context` structs in the
//! `default` namespace and registers `log`, `print`, `println`, `read`,
//! `readch`, `len`, `sleep` and `system`.

use std::io::{BufRead, Read, Write};
use std::rc::Rc;

use quill_core::constants::{BUILTIN_MODULE, DEFAULT_NAMESPACE};
use quill_core::ops;
use quill_core::scope::Scope;
use quill_core::value::{Payload, Value};
use quill_core::{RuntimeError, RuntimeResult};
use quill_syntax::types::{Tag, TypeDef};

use super::{native_fun, param, rest_param, NativeModule};
use crate::analysis::Analyser;
use crate::vm::{NativeFn, Vm};

/// The core built-in module.
pub struct ModuleBuiltin;

const FUNCTION_NAMES: [&str; 8] = [
    "log", "print", "println", "read", "readch", "len", "sleep", "system",
];

impl ModuleBuiltin {
    pub fn new() -> Self {
        ModuleBuiltin
    }

    fn declarations() -> Vec<quill_core::scope::FunRef> {
        let any_args = || rest_param("args", TypeDef::array(Tag::Any, vec![0]));
        vec![
            native_fun("log", TypeDef::new(Tag::Void), vec![any_args()]),
            native_fun("print", TypeDef::new(Tag::Void), vec![any_args()]),
            native_fun("println", TypeDef::new(Tag::Void), vec![any_args()]),
            native_fun("read", TypeDef::new(Tag::String), vec![any_args()]),
            native_fun("readch", TypeDef::new(Tag::Char), Vec::new()),
            native_fun(
                "len",
                TypeDef::new(Tag::Int),
                vec![param("value", TypeDef::array(Tag::Any, vec![0]))],
            ),
            native_fun(
                "len",
                TypeDef::new(Tag::Int),
                vec![param("value", TypeDef::new(Tag::String))],
            ),
            native_fun(
                "sleep",
                TypeDef::new(Tag::Void),
                vec![param("ms", TypeDef::new(Tag::Int))],
            ),
            native_fun(
                "system",
                TypeDef::new(Tag::Int),
                vec![param("cmd", TypeDef::new(Tag::String))],
            ),
        ]
    }

    fn declare_structs<V: Clone>(scope: &mut Scope<V>) {
        scope.declare_struct(Rc::new(quill_core::constants::entry_struct_def()));
        scope.declare_struct(Rc::new(quill_core::constants::exception_struct_def()));
        scope.declare_struct(Rc::new(quill_core::constants::context_struct_def()));
    }
}

impl Default for ModuleBuiltin {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeModule for ModuleBuiltin {
    fn register_analysis(&self, analyser: &mut Analyser) {
        if analyser.scopes.global_scope(BUILTIN_MODULE).is_none() {
            analyser
                .scopes
                .push_scope(Scope::new(DEFAULT_NAMESPACE, BUILTIN_MODULE));
        }
        let scope = analyser
            .scopes
            .global_scope(BUILTIN_MODULE)
            .expect("builtin scope was just pushed");

        Self::declare_structs(&mut scope.borrow_mut());
        for fun in Self::declarations() {
            let name = fun.borrow().name.clone();
            scope.borrow_mut().declare_function(name, fun);
        }
        for name in FUNCTION_NAMES {
            analyser.builtin_functions.insert(name.to_string());
        }
    }

    fn register_runtime(&self, vm: &mut Vm) {
        if vm.scopes.global_scope(BUILTIN_MODULE).is_none() {
            vm.scopes
                .push_scope(Scope::new(DEFAULT_NAMESPACE, BUILTIN_MODULE));
        }
        let scope = vm
            .scopes
            .global_scope(BUILTIN_MODULE)
            .expect("builtin scope was just pushed");

        Self::declare_structs(&mut scope.borrow_mut());
        for fun in Self::declarations() {
            let name = fun.borrow().name.clone();
            scope.borrow_mut().declare_function(name, fun);
        }

        vm.builtin_functions
            .insert("log".to_string(), write_native(false));
        vm.builtin_functions
            .insert("print".to_string(), write_native(false));
        vm.builtin_functions
            .insert("println".to_string(), write_native(true));
        vm.builtin_functions.insert("read".to_string(), read_native());
        vm.builtin_functions
            .insert("readch".to_string(), readch_native());
        vm.builtin_functions.insert("len".to_string(), len_native());
        vm.builtin_functions
            .insert("sleep".to_string(), sleep_native());
        vm.builtin_functions
            .insert("system".to_string(), system_native());
    }
}

/// Render every argument to stdout, optionally ending the line.
fn write_native(newline: bool) -> NativeFn {
    Rc::new(move |vm: &mut Vm| -> RuntimeResult<()> {
        if vm.has_native_arg(DEFAULT_NAMESPACE, "args") {
            let args = vm.native_arg(DEFAULT_NAMESPACE, "args")?;
            let rendered = {
                let value = args.borrow();
                let arr = value
                    .as_array()
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal("argument pack is not an array"))?;
                let mut out = String::new();
                for element in arr.borrow().iter() {
                    out.push_str(&ops::string_of(&element.borrow(), true)?);
                }
                out
            };
            print!("{}", rendered);
        }
        if newline {
            println!();
        }
        let _ = std::io::stdout().flush();
        vm.alloc_push(Value::undefined());
        Ok(())
    })
}

/// Print the prompt arguments and read one line from stdin.
fn read_native() -> NativeFn {
    Rc::new(move |vm: &mut Vm| -> RuntimeResult<()> {
        if vm.has_native_arg(DEFAULT_NAMESPACE, "args") {
            let args = vm.native_arg(DEFAULT_NAMESPACE, "args")?;
            let value = args.borrow();
            if let Some(arr) = value.as_array() {
                for element in arr.borrow().iter() {
                    print!("{}", ops::string_of(&element.borrow(), true)?);
                }
            }
        }
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| RuntimeError::internal(format!("read failed: {}", e)))?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        vm.alloc_push(Value::string(line));
        Ok(())
    })
}

/// Read a single character from stdin.
fn readch_native() -> NativeFn {
    Rc::new(move |vm: &mut Vm| -> RuntimeResult<()> {
        let mut buffer = [0u8; 1];
        std::io::stdin()
            .lock()
            .read_exact(&mut buffer)
            .map_err(|e| RuntimeError::internal(format!("read failed: {}", e)))?;
        vm.alloc_push(Value::char(buffer[0] as char));
        Ok(())
    })
}

/// Array length or string length.
fn len_native() -> NativeFn {
    Rc::new(move |vm: &mut Vm| -> RuntimeResult<()> {
        let value = vm.native_arg(DEFAULT_NAMESPACE, "value")?;
        let len = {
            let v = value.borrow();
            match &v.payload {
                Payload::Array(arr) => arr.borrow().len() as i64,
                Payload::String(s) => s.chars().count() as i64,
                _ => {
                    return Err(RuntimeError::internal(format!(
                        "len expects an array or string, got '{}'",
                        v.type_name()
                    )));
                }
            }
        };
        vm.alloc_push(Value::int(len));
        Ok(())
    })
}

/// Block the calling thread.
fn sleep_native() -> NativeFn {
    Rc::new(move |vm: &mut Vm| -> RuntimeResult<()> {
        let ms = vm
            .native_arg(DEFAULT_NAMESPACE, "ms")?
            .borrow()
            .as_int()
            .ok_or_else(|| RuntimeError::internal("sleep expects an int"))?;
        if ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(ms as u64));
        }
        vm.alloc_push(Value::undefined());
        Ok(())
    })
}

/// Run a shell command, returning its exit code.
fn system_native() -> NativeFn {
    Rc::new(move |vm: &mut Vm| -> RuntimeResult<()> {
        let cmd = vm
            .native_arg(DEFAULT_NAMESPACE, "cmd")?
            .borrow()
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RuntimeError::internal("system expects a string"))?;
        let status = if cfg!(windows) {
            std::process::Command::new("cmd")
                .args(["/C", cmd.as_str()])
                .status()
        } else {
            std::process::Command::new("sh")
                .args(["-c", cmd.as_str()])
                .status()
        }
        .map_err(|e| RuntimeError::internal(format!("system failed: {}", e)))?;
        vm.alloc_push(Value::int(status.code().unwrap_or(-1) as i64));
        Ok(())
    })
}
