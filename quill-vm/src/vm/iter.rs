// quill-vm - Iterator protocol
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Iterator frames over arrays, strings and structs.
//!
//! `GetIterator` consumes the iterable and opens a frame; the frame's value
//! stays GC-rooted for as long as the frame lives. Frames are discarded by
//! the unwind frame that wraps every `foreach` loop.

use indexmap::IndexMap;

use quill_core::constants;
use quill_core::value::{Payload, Value};
use quill_core::{RuntimeError, RuntimeResult};
use quill_syntax::types::{Tag, TypeDef};

use super::{IteratorFrame, Vm};

impl Vm {
    pub(crate) fn handle_get_iterator(&mut self) -> RuntimeResult<()> {
        let slot = self.pop_slot()?;
        self.iterators.push(IteratorFrame {
            value: slot.value,
            index: 0,
        });
        Ok(())
    }

    pub(crate) fn handle_has_next_element(&mut self) -> RuntimeResult<()> {
        let frame = self
            .iterators
            .last()
            .ok_or_else(|| RuntimeError::internal("no iterator on stack"))?;
        let value = frame.value.borrow();

        let has_next = match &value.payload {
            Payload::Array(arr) => frame.index < arr.borrow().len(),
            Payload::String(s) => frame.index < s.chars().count(),
            Payload::Struct(fields) => frame.index < fields.borrow().len(),
            _ => {
                return Err(RuntimeError::internal(format!(
                    "'{}' is not iterable",
                    value.type_name()
                )));
            }
        };
        drop(value);
        self.alloc_push(Value::bool(has_next));
        Ok(())
    }

    pub(crate) fn handle_next_element(&mut self) -> RuntimeResult<()> {
        let frame = self
            .iterators
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no iterator on stack"))?;
        let index = frame.index;
        frame.index += 1;
        let payload = frame.value.borrow().payload.clone();

        match payload {
            Payload::Array(arr) => {
                let element = arr
                    .borrow()
                    .get(index)
                    .cloned()
                    .ok_or_else(|| RuntimeError::internal("iterator exhausted"))?;
                // Array elements are pushed as the shared reference.
                self.push_value(element);
                Ok(())
            }
            Payload::String(s) => {
                let ch = s
                    .chars()
                    .nth(index)
                    .ok_or_else(|| RuntimeError::internal("iterator exhausted"))?;
                self.alloc_push(Value::char(ch));
                Ok(())
            }
            Payload::Struct(fields) => {
                // Struct iteration yields a fresh Entry whose value shares
                // the field's variable.
                let (key, field_var) = {
                    let fields = fields.borrow();
                    let (key, var) = fields
                        .get_index(index)
                        .ok_or_else(|| RuntimeError::internal("iterator exhausted"))?;
                    (key.clone(), var.clone())
                };

                let key_value = self.gc.alloc(Value::string(key));
                let key_var = self
                    .gc
                    .alloc_variable(constants::ENTRY_KEY, TypeDef::new(Tag::String));
                key_var.set_value(key_value);

                let mut entry = IndexMap::new();
                entry.insert(constants::ENTRY_KEY.to_string(), key_var);
                entry.insert(constants::ENTRY_VALUE.to_string(), field_var);

                self.alloc_push(Value::strukt(
                    entry,
                    constants::DEFAULT_NAMESPACE,
                    constants::ENTRY_STRUCT,
                ));
                Ok(())
            }
            _ => Err(RuntimeError::internal(format!(
                "'{}' is not iterable",
                frame_type_name(self)
            ))),
        }
    }
}

fn frame_type_name(vm: &Vm) -> String {
    vm.iterators
        .last()
        .map(|f| f.value.borrow().type_name())
        .unwrap_or_default()
}
