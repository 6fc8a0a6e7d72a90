// quill-vm - Call protocol
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call dispatch, parameter binding, class instantiation and returns.
//!
//! Resolution order at a call site: overloads (strict, then relaxed), a
//! variable holding a function value, then the class-constructor
//! interpretation. Arguments are held in a GC-rooted container for the
//! whole dispatch so a collection triggered by a default-value snippet
//! cannot reclaim them.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use quill_core::scope::Scope;
use quill_core::value::{ClassHandle, GcValue, Payload, Value};
use quill_core::{RuntimeError, RuntimeResult};
use quill_syntax::types::{signature_string, DefaultValue, Param, TypeDef};

use super::{CallFrame, Vm, SUB_RUN_RETURN};

impl Vm {
    pub(crate) fn handle_call(
        &mut self,
        pc: usize,
        ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
        argc: usize,
    ) -> RuntimeResult<()> {
        let args_container = Rc::new(RefCell::new(Vec::with_capacity(argc)));
        self.gc.add_root_container(args_container.clone());
        let result = self.dispatch_call(pc, ns, module, access_ns, name, argc, &args_container);
        self.gc.remove_root_container(&args_container);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_call(
        &mut self,
        pc: usize,
        ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
        argc: usize,
        container: &Rc<RefCell<Vec<GcValue>>>,
    ) -> RuntimeResult<()> {
        // Pop the arguments in reverse to recover call order.
        let mut args: Vec<GcValue> = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop_slot()?.value);
        }
        args.reverse();
        container.borrow_mut().extend(args.iter().cloned());

        let signature: Vec<TypeDef> = args.iter().map(|v| v.borrow().ty.clone()).collect();
        let self_invoke = self.take_self_invoke();

        let mut callee_name = name.to_string();
        let mut lookup_ns = access_ns.to_string();
        let mut receiver: Option<ClassHandle> = None;
        let mut as_name: Option<String> = None;

        // An empty name calls the function value beneath the arguments.
        if callee_name.is_empty() {
            let fn_slot = self.pop_slot()?;
            receiver = fn_slot.receiver.clone();
            let payload = fn_slot.value.borrow().payload.clone();
            match payload {
                Payload::Function(f_ns, f_name) => {
                    lookup_ns = f_ns;
                    callee_name = f_name;
                }
                _ => {
                    return Err(RuntimeError::undeclared_function(signature_string(
                        "<expression>",
                        &signature,
                    )));
                }
            }
        }

        debug!(name = %callee_name, argc, "call");

        // Method dispatch: `self.m(...)` uses the enclosing instance, a
        // bound member function value carries its receiver.
        if self_invoke {
            let class = self
                .class_stack
                .last()
                .cloned()
                .ok_or_else(|| RuntimeError::internal("'self' outside of a class"))?;
            let fun = find_in_class(&class, &callee_name, &signature).ok_or_else(|| {
                RuntimeError::undeclared_function(signature_string(&callee_name, &signature))
            })?;
            let (class_ns, class_module) = scope_key(&class);
            return self.enter_function(
                pc,
                fun,
                class_ns,
                class_module,
                args,
                None,
                &callee_name,
            );
        }

        if let Some(class) = receiver {
            let fun = find_in_class(&class, &callee_name, &signature).ok_or_else(|| {
                RuntimeError::undeclared_function(signature_string(&callee_name, &signature))
            })?;
            let (class_ns, class_module) = scope_key(&class);
            self.class_stack.push(class.clone());
            self.push_vm_scope_handle(class.clone());
            return self.enter_function(
                pc,
                fun,
                class_ns,
                class_module,
                args,
                Some(class),
                &callee_name,
            );
        }

        // Overloads, strict then relaxed.
        if let Some((scope, strict)) = self.scopes.function_scope_strict_then_relaxed(
            ns,
            module,
            &lookup_ns,
            &callee_name,
            &signature,
        ) {
            let fun = scope
                .borrow()
                .find_function(&callee_name, Some(&signature), strict)
                .expect("scope vouched for the overload");
            let (func_ns, func_module) = {
                let s = scope.borrow();
                (s.namespace.clone(), s.module.clone())
            };
            let label = call_label(&callee_name, as_name.as_deref());
            return self.enter_function(pc, fun, func_ns, func_module, args, None, &label);
        }

        // A variable of function type: a dynamic call through its value.
        if !name.is_empty() {
            if let Some(var) = self.scopes.find_variable(ns, module, access_ns, name) {
                let value = var
                    .value()
                    .ok_or_else(|| RuntimeError::NullTarget(format!("variable '{}'", name)))?;
                let payload = value.borrow().payload.clone();
                if let Payload::Function(f_ns, f_name) = payload {
                    as_name = Some(f_name.clone());
                    if let Some((scope, strict)) = self.scopes.function_scope_strict_then_relaxed(
                        ns, module, &f_ns, &f_name, &signature,
                    ) {
                        let fun = scope
                            .borrow()
                            .find_function(&f_name, Some(&signature), strict)
                            .expect("scope vouched for the overload");
                        let (func_ns, func_module) = {
                            let s = scope.borrow();
                            (s.namespace.clone(), s.module.clone())
                        };
                        let label = call_label(name, as_name.as_deref());
                        return self
                            .enter_function(pc, fun, func_ns, func_module, args, None, &label);
                    }
                    return Err(RuntimeError::undeclared_function(signature_string(
                        &f_name, &signature,
                    )));
                }
            }

            // Class constructor interpretation: Name(args) instantiates.
            if let Some(scope) = self.scopes.class_scope(ns, module, access_ns, name) {
                return self.instantiate_class(pc, &scope, name, &signature, args);
            }
        }

        Err(RuntimeError::undeclared_function(signature_string(
            &callee_name,
            &signature,
        )))
    }

    /// Bind parameters and transfer control (or invoke a native).
    #[allow(clippy::too_many_arguments)]
    fn enter_function(
        &mut self,
        pc: usize,
        fun: quill_core::FunRef,
        func_ns: String,
        func_module: String,
        args: Vec<GcValue>,
        class_scope: Option<ClassHandle>,
        label: &str,
    ) -> RuntimeResult<()> {
        let info = self.debug.info_at(pc);
        self.debug
            .set_call_site(pc, &func_ns, &display_label(label), info.row, info.col);

        let (entry, params, fun_name) = {
            let f = fun.borrow();
            (f.entry, f.params.clone(), f.name.clone())
        };

        self.push_vm_scope(Scope::new(func_ns.clone(), func_module.clone()));
        self.bind_parameters(&func_ns, &params, args)?;

        if entry == 0 {
            // Native function: invoke synchronously, then drop the scope.
            let native = self
                .builtin_functions
                .get(&fun_name)
                .cloned()
                .ok_or_else(|| {
                    RuntimeError::internal(format!("native function '{}' is not registered", fun_name))
                })?;
            let result = native(self);
            self.pop_vm_scope(&func_ns, &func_module)?;
            if let Some(class) = class_scope {
                let (class_ns, class_module) = scope_key(&class);
                self.pop_vm_scope(&class_ns, &class_module)?;
                self.class_stack.pop();
            }
            return result;
        }

        self.frames.push(CallFrame {
            call_pc: pc,
            return_pc: self.next_pc,
            return_ns: (func_ns, func_module),
            class_scope,
            deep_count: 0,
        });
        self.push_deep();
        self.next_pc = entry;
        Ok(())
    }

    /// `Name(args)` where `Name` is a class: build the instance, run the
    /// matching constructor as a sub-run, push the instance.
    fn instantiate_class(
        &mut self,
        pc: usize,
        scope: &quill_core::ScopeRef<quill_core::GcVariable>,
        name: &str,
        signature: &[TypeDef],
        args: Vec<GcValue>,
    ) -> RuntimeResult<()> {
        let def = scope
            .borrow()
            .find_class(name)
            .expect("scope vouched for the class");
        let class_ns = scope.borrow().namespace.clone();

        // Fields first; defaults run as sub-runs and may call user code.
        let mut instance = Scope::class_scope(class_ns.clone(), name.to_string());
        {
            let vars: Vec<_> = def
                .borrow()
                .vars
                .iter()
                .map(|(n, v)| (n.clone(), v.clone()))
                .collect();
            for (var_name, var_def) in vars {
                let value = match &var_def.default {
                    DefaultValue::Pc(snippet) if *snippet > 0 => self.run_default_snippet(*snippet)?,
                    _ => self.gc.alloc(Value::undefined()),
                };
                let var = self.gc.alloc_variable(var_name.clone(), var_def.ty());
                var.set_value(value);
                instance.declare_variable(var_name, var);
            }
            for fun in def.borrow().funs.iter() {
                let fun_name = fun.borrow().name.clone();
                instance.declare_function(fun_name, fun.clone());
            }
        }
        let handle: ClassHandle = Rc::new(RefCell::new(instance));

        let init = find_in_class(&handle, "init", signature).ok_or_else(|| {
            RuntimeError::undeclared_function(signature_string("init", signature))
        })?;
        let entry = init.borrow().entry;
        if entry == 0 {
            return Err(RuntimeError::internal(format!(
                "constructor of '{}' has no body",
                name
            )));
        }

        let info = self.debug.info_at(pc);
        self.debug.set_call_site(pc, &class_ns, name, info.row, info.col);

        self.class_stack.push(handle.clone());
        self.push_vm_scope_handle(handle.clone());
        self.push_vm_scope(Scope::new(class_ns.clone(), name.to_string()));
        let params = init.borrow().params.clone();
        self.bind_parameters(&class_ns, &params, args)?;

        self.frames.push(CallFrame {
            call_pc: pc,
            return_pc: SUB_RUN_RETURN,
            return_ns: (class_ns.clone(), name.to_string()),
            class_scope: Some(handle.clone()),
            deep_count: 0,
        });
        self.push_deep();

        let saved = self.next_pc;
        self.next_pc = entry;
        self.sub_execute()?;
        self.next_pc = saved;

        // Drop the constructor's implicit return value, keep the instance.
        self.pop_slot()?;
        self.alloc_push(Value::class_handle(handle, &class_ns, name));
        Ok(())
    }

    /// Bind call arguments into the freshly pushed parameter scope:
    /// ordinary parameters by position, the rest parameter collects the
    /// tail, missing ones run their default snippets.
    pub(crate) fn bind_parameters(
        &mut self,
        func_ns: &str,
        params: &[Param],
        args: Vec<GcValue>,
    ) -> RuntimeResult<()> {
        let mut rest: Option<(String, Vec<GcValue>)> = None;

        let mut i = 0;
        while i < args.len() {
            if let Some((_, collected)) = rest.as_mut() {
                collected.push(args[i].clone());
                i += 1;
                continue;
            }
            let Some(param) = params.get(i) else {
                return Err(RuntimeError::internal("argument count exceeds signature"));
            };
            match param {
                Param::Single(var) if var.is_rest => {
                    // A lone array argument in rest position spreads.
                    let spread = i + 1 == params.len()
                        && i + 1 == args.len()
                        && args[i].borrow().is_array();
                    let mut collected = Vec::new();
                    if spread {
                        let arr = args[i].borrow().as_array().cloned().expect("array payload");
                        collected.extend(arr.borrow().iter().cloned());
                    } else {
                        collected.push(args[i].clone());
                    }
                    rest = Some((var.name.clone(), collected));
                }
                Param::Single(var) => {
                    let ty = var.ty();
                    let value = self.owned_value(&ty, args[i].clone());
                    self.declare_argument(func_ns, &var.name, ty, value)?;
                }
                Param::Unpack(group) => {
                    let fields = args[i].borrow().as_struct().cloned().ok_or_else(|| {
                        RuntimeError::internal("destructuring parameter requires a struct argument")
                    })?;
                    for var in &group.vars {
                        let field = fields.borrow().get(&var.name).cloned().ok_or_else(|| {
                            RuntimeError::not_a_member(&var.name, "the destructured struct")
                        })?;
                        let value = field
                            .value()
                            .ok_or_else(|| RuntimeError::NullTarget(format!("field '{}'", var.name)))?;
                        let ty = var.ty();
                        let value = self.owned_value(&ty, value);
                        self.declare_argument(func_ns, &var.name, ty, value)?;
                    }
                }
            }
            i += 1;
        }

        // Defaults for parameters no argument reached.
        for param in params.iter().skip(args.len()) {
            match param {
                Param::Single(var) if var.is_rest => {
                    if rest.is_none() {
                        rest = Some((var.name.clone(), Vec::new()));
                    }
                    break;
                }
                Param::Single(var) => {
                    let DefaultValue::Pc(snippet) = var.default else {
                        return Err(RuntimeError::internal(format!(
                            "parameter '{}' has no value and no default",
                            var.name
                        )));
                    };
                    let value = self.run_default_snippet(snippet)?;
                    let ty = var.ty();
                    let value = self.owned_value(&ty, value);
                    self.declare_argument(func_ns, &var.name, ty, value)?;
                }
                Param::Unpack(_) => {
                    return Err(RuntimeError::internal(
                        "destructuring parameter has no value",
                    ));
                }
            }
        }

        if let Some((name, collected)) = rest {
            let ty = Vm::any_array_type(collected.len());
            let cell = self.gc.alloc(Value::array(collected, ty.clone()));
            self.declare_argument(func_ns, &name, ty, cell)?;
        }

        Ok(())
    }

    fn declare_argument(
        &mut self,
        func_ns: &str,
        name: &str,
        ty: TypeDef,
        value: GcValue,
    ) -> RuntimeResult<()> {
        let var = self.gc.alloc_variable(name, ty);
        var.set_value(value);
        let scope = self.scopes.back_scope(func_ns).ok_or_else(|| {
            RuntimeError::internal(format!("no live scope in namespace '{}'", func_ns))
        })?;
        scope.borrow_mut().declare_variable(name, var);
        Ok(())
    }

    /// Run a default-value snippet: a sub-run entered at the snippet's PC
    /// and ended by its `Trap`.
    pub(crate) fn run_default_snippet(&mut self, pc: usize) -> RuntimeResult<GcValue> {
        let saved = self.next_pc;
        self.next_pc = pc;
        self.sub_execute()?;
        self.next_pc = saved;
        Ok(self.pop_slot()?.value)
    }

    /// `Return`: pop the result, close the callee's frames and scope,
    /// restore the caller, push the result back.
    pub(crate) fn handle_return(&mut self) -> RuntimeResult<()> {
        let result = self.pop_slot()?.value;
        self.gc.pin(result.clone());

        // Unwind the callee's deep frames while its call frame is still
        // the innermost one, so the pops decrement its own counter.
        let deep_count = self
            .frames
            .last()
            .map(|f| f.deep_count)
            .ok_or_else(|| RuntimeError::internal("return outside of a call"))?;
        for _ in 0..deep_count {
            self.pop_deep()?;
        }

        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::internal("return outside of a call"))?;
        self.pop_vm_scope(&frame.return_ns.0, &frame.return_ns.1)?;

        if let Some(class) = &frame.class_scope {
            let (class_ns, class_module) = scope_key(class);
            self.pop_vm_scope(&class_ns, &class_module)?;
            self.class_stack.pop();
        }

        self.gc.unpin(&result);
        self.push_value(result);

        if frame.return_pc == SUB_RUN_RETURN {
            self.sub_run_return = true;
        } else {
            self.next_pc = frame.return_pc;
        }

        let roots = self.roots();
        self.gc.maybe_collect(&roots)
    }
}

fn scope_key(class: &ClassHandle) -> (String, String) {
    let scope = class.borrow();
    (scope.namespace.clone(), scope.module.clone())
}

fn find_in_class(
    class: &ClassHandle,
    name: &str,
    signature: &[TypeDef],
) -> Option<quill_core::FunRef> {
    let scope = class.borrow();
    scope
        .find_function(name, Some(signature), true)
        .or_else(|| scope.find_function(name, Some(signature), false))
}

fn call_label(name: &str, as_name: Option<&str>) -> String {
    match as_name {
        Some(target) if target != name => format!("{} as {}", name, target),
        _ => name.to_string(),
    }
}

fn display_label(label: &str) -> String {
    if label.starts_with("lambda@") {
        "<lambda>".to_string()
    } else {
        label.to_string()
    }
}
