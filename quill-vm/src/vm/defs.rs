// quill-vm - Variable access, builders and definition instructions
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Variable load/store, member and index access, array and struct
//! construction, and the struct/class/function definition builders.

use std::rc::Rc;

use indexmap::IndexMap;

use quill_core::scope::find_same_signature;
use quill_core::value::{GcValue, Payload, Value};
use quill_core::{fun_ref, RuntimeError, RuntimeResult};
use quill_syntax::types::{DefaultValue, Param, Tag, TypeDef, VarDef};

use super::{SlotRef, StackSlot, Vm};

impl Vm {
    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub(crate) fn handle_load_var(
        &mut self,
        ns: &str,
        module: &str,
        access_ns: &str,
        name: &str,
    ) -> RuntimeResult<()> {
        let use_ref = self.use_variable_ref();

        // `self.x` looks at the enclosing class scope only.
        if self.take_self_invoke() {
            let class = self
                .class_stack
                .last()
                .cloned()
                .ok_or_else(|| RuntimeError::internal("'self' outside of a class"))?;
            let var = class
                .borrow()
                .find_variable(name)
                .ok_or_else(|| RuntimeError::not_a_member(name, "the enclosing class"))?;
            let value = var
                .value()
                .ok_or_else(|| RuntimeError::NullTarget(format!("member '{}'", name)))?;
            let slot = if use_ref {
                StackSlot::with_reference(value, SlotRef::Variable(var))
            } else {
                StackSlot::plain(value)
            };
            self.push_slot(slot);
            return Ok(());
        }

        if let Some(var) = self.scopes.find_variable(ns, module, access_ns, name) {
            let value = var
                .value()
                .ok_or_else(|| RuntimeError::NullTarget(format!("variable '{}'", name)))?;
            let slot = if use_ref {
                StackSlot::with_reference(value, SlotRef::Variable(var))
            } else {
                StackSlot::plain(value)
            };
            self.push_slot(slot);
            return Ok(());
        }

        // A struct type name used as a value (type comparisons).
        if let Some(scope) = self.scopes.struct_scope(ns, module, access_ns, name) {
            let declared_ns = scope.borrow().namespace.clone();
            let value = Value::strukt(IndexMap::new(), &declared_ns, name);
            self.alloc_push(value);
            return Ok(());
        }

        // A function name used as a value.
        if let Some(scope) = self
            .scopes
            .function_scope(ns, module, access_ns, name, None, true)
        {
            let declared_ns = scope.borrow().namespace.clone();
            self.alloc_push(Value::function(declared_ns, name));
            return Ok(());
        }

        Err(RuntimeError::UndeclaredIdentifier(name.to_string()))
    }

    pub(crate) fn handle_store_var(&mut self, ns: &str, name: &str) -> RuntimeResult<()> {
        let slot = self.pop_slot()?;
        let mut value = slot.value;
        let ty = self.take_type_def()?;

        if std::mem::replace(&mut self.check_build_array, false) {
            value = self.check_build_array_value(value, &ty)?;
        }

        value = self.owned_value(&ty, value);

        {
            let v = value.borrow();
            if !v.is_undefined() && !ty.is_any_or_match(&v.ty, false) {
                return Err(RuntimeError::invalid_operands(
                    "=",
                    ty.to_string(),
                    v.type_name(),
                ));
            }
        }

        let var = self.gc.alloc_variable(name, ty);
        var.set_value(value);
        let scope = self
            .scopes
            .back_scope(ns)
            .ok_or_else(|| RuntimeError::internal(format!("no live scope in namespace '{}'", ns)))?;
        scope.borrow_mut().declare_variable(name, var);
        Ok(())
    }

    pub(crate) fn handle_load_sub_id(&mut self, name: &str) -> RuntimeResult<()> {
        let use_ref = self.use_variable_ref();
        let slot = self.pop_slot()?;
        let payload = slot.value.borrow().payload.clone();

        match payload {
            Payload::Struct(fields) => {
                let var = fields
                    .borrow()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        RuntimeError::not_a_member(name, slot.value.borrow().ty.qualified_name())
                    })?;
                let value = var
                    .value()
                    .ok_or_else(|| RuntimeError::NullTarget(format!("field '{}'", name)))?;
                let pushed = if use_ref {
                    StackSlot::with_reference(value, SlotRef::Variable(var))
                } else {
                    StackSlot::plain(value)
                };
                self.push_slot(pushed);
                Ok(())
            }
            Payload::Class(scope) => {
                if let Some(var) = scope.borrow().find_variable(name) {
                    let value = var
                        .value()
                        .ok_or_else(|| RuntimeError::NullTarget(format!("member '{}'", name)))?;
                    let pushed = if use_ref {
                        StackSlot::with_reference(value, SlotRef::Variable(var))
                    } else {
                        StackSlot::plain(value)
                    };
                    self.push_slot(pushed);
                    return Ok(());
                }
                if scope.borrow().find_function(name, None, true).is_some() {
                    // A member function value bound to its receiver.
                    let class_ns = scope.borrow().namespace.clone();
                    let cell = self.gc.alloc(Value::function(class_ns, name));
                    let mut pushed = StackSlot::plain(cell);
                    pushed.receiver = Some(scope.clone());
                    self.push_slot(pushed);
                    return Ok(());
                }
                Err(RuntimeError::not_a_member(
                    name,
                    slot.value.borrow().ty.qualified_name(),
                ))
            }
            _ => Err(RuntimeError::internal(format!(
                "invalid {} access, this operation can only be performed on object values",
                slot.value.borrow().type_name()
            ))),
        }
    }

    pub(crate) fn handle_load_sub_ix(&mut self) -> RuntimeResult<()> {
        let use_ref = self.use_variable_ref();
        let index_slot = self.pop_slot()?;
        let index = index_slot
            .value
            .borrow()
            .as_int()
            .ok_or_else(|| {
                RuntimeError::internal(format!(
                    "invalid type {} trying to access an array",
                    index_slot.value.borrow().type_name()
                ))
            })?;
        let container = self.pop_slot()?;
        let payload = container.value.borrow().payload.clone();

        match payload {
            Payload::Array(array) => {
                let len = array.borrow().len();
                if index < 0 || index as usize >= len {
                    return Err(RuntimeError::ArrayIndexOutOfRange { index, len });
                }
                let element = array.borrow()[index as usize].clone();
                let pushed = if use_ref {
                    StackSlot::with_reference(
                        element,
                        SlotRef::Element {
                            array: array.clone(),
                            index: index as usize,
                        },
                    )
                } else {
                    StackSlot::plain(element)
                };
                self.push_slot(pushed);
                Ok(())
            }
            Payload::String(s) => {
                let len = s.chars().count();
                if index < 0 || index as usize >= len {
                    return Err(RuntimeError::StringIndexOutOfRange { index, len });
                }
                let ch = s.chars().nth(index as usize).expect("checked bounds");
                let cell = self.gc.alloc(Value::char(ch));
                let pushed = if use_ref {
                    StackSlot::with_reference(
                        cell,
                        SlotRef::CharAt {
                            target: container.value.clone(),
                            index: index as usize,
                        },
                    )
                } else {
                    StackSlot::plain(cell)
                };
                self.push_slot(pushed);
                Ok(())
            }
            _ => Err(RuntimeError::internal(format!(
                "invalid {} index access, this operation can only be performed on array or string values",
                container.value.borrow().type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    pub(crate) fn handle_init_array(&mut self, size: usize) -> RuntimeResult<()> {
        let ty = self.take_type_def()?;
        let mut elements = Vec::with_capacity(size);
        for _ in 0..size {
            elements.push(self.gc.alloc(Value::void()));
        }
        self.value_build.push(Value::array(elements, ty));
        Ok(())
    }

    pub(crate) fn handle_set_element(&mut self, index: usize) -> RuntimeResult<()> {
        let slot = self.pop_slot()?;
        let building = self
            .value_build
            .last()
            .ok_or_else(|| RuntimeError::internal("no array under construction"))?;
        let array = building
            .as_array()
            .ok_or_else(|| RuntimeError::internal("value under construction is not an array"))?;
        let len = array.borrow().len();
        if index >= len {
            return Err(RuntimeError::ArrayIndexOutOfRange {
                index: index as i64,
                len,
            });
        }
        array.borrow_mut()[index] = slot.value;
        Ok(())
    }

    pub(crate) fn handle_push_array(&mut self) -> RuntimeResult<()> {
        let value = self
            .value_build
            .pop()
            .ok_or_else(|| RuntimeError::internal("no array under construction"))?;
        self.alloc_push(value);
        Ok(())
    }

    /// Materialise a declared-shape array from an underfull constructor:
    /// zero values fill with nulls, a single value is broadcast.
    pub(crate) fn check_build_array_value(
        &mut self,
        value: GcValue,
        ty: &TypeDef,
    ) -> RuntimeResult<GcValue> {
        let dims = &ty.dims;
        if dims.is_empty() || dims[0] == 0 {
            return Ok(value);
        }
        let array = value.borrow().as_array().cloned();
        let Some(array) = array else {
            return Ok(value);
        };
        let len = array.borrow().len();
        if len > 1 {
            return Ok(value);
        }

        let init = if len == 1 {
            array.borrow()[0].clone()
        } else {
            self.gc.alloc(Value::void())
        };
        let filled = self.build_array_value(dims, ty, &init);
        Ok(self.gc.alloc(filled))
    }

    fn build_array_value(&mut self, dims: &[usize], ty: &TypeDef, init: &GcValue) -> Value {
        // The last dimension is the outermost one.
        let (outer, inner) = dims.split_last().expect("non-empty dims");
        let mut elements = Vec::with_capacity(*outer);
        for _ in 0..*outer {
            if inner.is_empty() {
                let copy = init.borrow().clone();
                elements.push(self.gc.alloc(copy));
            } else {
                let sub = self.build_array_value(inner, ty, init);
                elements.push(self.gc.alloc(sub));
            }
        }
        let mut array_ty = ty.element_type();
        array_ty.dims = dims.to_vec();
        Value::array(elements, array_ty)
    }

    // ------------------------------------------------------------------
    // Struct instances
    // ------------------------------------------------------------------

    pub(crate) fn handle_init_struct(
        &mut self,
        ns: &str,
        module: &str,
        type_ns: &str,
        name: &str,
    ) -> RuntimeResult<()> {
        let scope = self
            .scopes
            .struct_scope(ns, module, type_ns, name)
            .ok_or_else(|| RuntimeError::UndeclaredIdentifier(name.to_string()))?;
        let def = scope
            .borrow()
            .find_struct(name)
            .expect("scope vouched for the struct");
        let declared_ns = scope.borrow().namespace.clone();

        let mut fields = IndexMap::new();
        for (field_name, field_def) in def.fields.iter() {
            let value = match &field_def.default {
                DefaultValue::Pc(pc) if *pc > 0 => self.run_default_snippet(*pc)?,
                _ => self.gc.alloc(Value::void()),
            };
            let var = self.gc.alloc_variable(field_name.clone(), field_def.ty());
            var.set_value(value);
            fields.insert(field_name.clone(), var);
        }

        self.value_build
            .push(Value::strukt(fields, &declared_ns, name));
        Ok(())
    }

    pub(crate) fn handle_set_field(&mut self, name: &str) -> RuntimeResult<()> {
        let slot = self.pop_slot()?;
        let building = self
            .value_build
            .last()
            .ok_or_else(|| RuntimeError::internal("no struct under construction"))?;
        let type_name = building.ty.qualified_name();
        let fields = building
            .as_struct()
            .ok_or_else(|| RuntimeError::internal("value under construction is not a struct"))?
            .clone();
        let var = fields
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::not_a_member(name, type_name))?;

        let ty = var.ty();
        {
            let v = slot.value.borrow();
            if !v.is_undefined() && !ty.is_any_or_match(&v.ty, false) {
                return Err(RuntimeError::invalid_operands(
                    "=",
                    ty.to_string(),
                    v.type_name(),
                ));
            }
        }
        let value = self.owned_value(&ty, slot.value);
        var.set_value(value);
        Ok(())
    }

    pub(crate) fn handle_push_struct(&mut self) -> RuntimeResult<()> {
        let value = self
            .value_build
            .pop()
            .ok_or_else(|| RuntimeError::internal("no struct under construction"))?;
        self.alloc_push(value);
        Ok(())
    }

    /// Read a field out of the struct on top of the stack without popping.
    pub(crate) fn handle_push_value_from_struct(&mut self, name: &str) -> RuntimeResult<()> {
        let (value, type_name) = {
            let top = self.peek_slot()?;
            let v = top.value.borrow();
            let fields = v.as_struct().ok_or_else(|| {
                RuntimeError::internal("destructuring requires a struct value")
            })?;
            let found = fields.borrow().get(name).cloned();
            (found, v.ty.qualified_name())
        };
        let var = value.ok_or_else(|| RuntimeError::not_a_member(name, type_name))?;
        let value = var
            .value()
            .ok_or_else(|| RuntimeError::NullTarget(format!("field '{}'", name)))?;
        self.push_value(value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    pub(crate) fn handle_struct_set_var(&mut self, name: &str) -> RuntimeResult<()> {
        let ty = self.take_type_def()?;
        let default_pc = std::mem::replace(&mut self.pending_default_pc, 0);
        let default = if default_pc > 0 {
            DefaultValue::Pc(default_pc)
        } else {
            DefaultValue::None
        };
        let def = self
            .struct_build
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no struct definition under construction"))?;
        def.fields
            .insert(name.to_string(), Rc::new(VarDef::with_default(name, ty, default)));
        Ok(())
    }

    pub(crate) fn handle_struct_end(&mut self, ns: &str) -> RuntimeResult<()> {
        let def = self
            .struct_build
            .pop()
            .ok_or_else(|| RuntimeError::internal("no struct definition under construction"))?;
        let scope = self
            .scopes
            .back_scope(ns)
            .ok_or_else(|| RuntimeError::internal(format!("no live scope in namespace '{}'", ns)))?;
        scope.borrow_mut().declare_struct(Rc::new(def));
        Ok(())
    }

    pub(crate) fn handle_class_set_var(&mut self, name: &str) -> RuntimeResult<()> {
        let ty = self.take_type_def()?;
        let default_pc = std::mem::replace(&mut self.pending_default_pc, 0);
        let default = if default_pc > 0 {
            DefaultValue::Pc(default_pc)
        } else {
            DefaultValue::None
        };
        let def = self
            .class_build
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no class definition under construction"))?;
        def.vars
            .insert(name.to_string(), Rc::new(VarDef::with_default(name, ty, default)));
        Ok(())
    }

    pub(crate) fn handle_class_end(&mut self, ns: &str) -> RuntimeResult<()> {
        let def = self
            .class_build
            .pop()
            .ok_or_else(|| RuntimeError::internal("no class definition under construction"))?;
        let scope = self
            .scopes
            .back_scope(ns)
            .ok_or_else(|| RuntimeError::internal(format!("no live scope in namespace '{}'", ns)))?;
        scope
            .borrow_mut()
            .declare_class(Rc::new(std::cell::RefCell::new(def)));
        Ok(())
    }

    pub(crate) fn handle_fun_set_param(&mut self, is_rest: bool, name: &str) -> RuntimeResult<()> {
        let param = self.read_param(is_rest, name)?;
        let fun = self
            .fun_build
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no function definition under construction"))?;
        fun.params.push(Param::Single(param));
        Ok(())
    }

    pub(crate) fn handle_fun_set_sub_param(
        &mut self,
        is_rest: bool,
        name: &str,
    ) -> RuntimeResult<()> {
        let param = self.read_param(is_rest, name)?;
        let group = self
            .unpack_build
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no parameter group under construction"))?;
        group.vars.push(param);
        Ok(())
    }

    pub(crate) fn handle_fun_set_unpack_param(&mut self) -> RuntimeResult<()> {
        let group = self
            .unpack_build
            .pop()
            .ok_or_else(|| RuntimeError::internal("no parameter group under construction"))?;
        let fun = self
            .fun_build
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no function definition under construction"))?;
        fun.params.push(Param::Unpack(group));
        Ok(())
    }

    fn read_param(&mut self, is_rest: bool, name: &str) -> RuntimeResult<VarDef> {
        let ty = self.take_type_def()?;
        let default_pc = std::mem::replace(&mut self.pending_default_pc, 0);
        let mut var = if default_pc > 0 {
            VarDef::with_default(name, ty, DefaultValue::Pc(default_pc))
        } else {
            VarDef::new(name, ty)
        };
        var.is_rest = is_rest;
        Ok(var)
    }

    /// Close a function definition. The entry PC is the instruction after
    /// the jump emitted right behind `FunEnd`.
    pub(crate) fn handle_fun_end(
        &mut self,
        pc: usize,
        ns: &str,
        module: &str,
        has_block: bool,
    ) -> RuntimeResult<()> {
        let mut fun = self
            .fun_build
            .pop()
            .ok_or_else(|| RuntimeError::internal("no function definition under construction"))?;
        fun.entry = if has_block { pc + 2 } else { 0 };

        // Methods collect on the class under construction; everything else
        // lands at the module's global scope.
        if let Some(class) = self.class_build.last_mut() {
            class.funs.push(fun_ref(fun));
            return Ok(());
        }

        let scope = self
            .scopes
            .global_scope(module)
            .or_else(|| self.scopes.back_scope(ns))
            .ok_or_else(|| RuntimeError::internal(format!("no global scope for module '{}'", module)))?;

        let signature: Vec<TypeDef> = fun.params.iter().map(Param::ty).collect();
        if let Some(existing) = find_same_signature(&scope.borrow(), &fun.name, &signature) {
            if has_block {
                existing.borrow_mut().entry = fun.entry;
            }
            return Ok(());
        }
        let name = fun.name.clone();
        scope.borrow_mut().declare_function(name, fun_ref(fun));
        Ok(())
    }

    /// The collected-rest array type: `Any` elements, concrete length.
    pub(crate) fn any_array_type(len: usize) -> TypeDef {
        TypeDef::array(Tag::Any, vec![len])
    }
}
