// quill-vm - Evaluation stack slots
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Evaluation stack slots.
//!
//! A slot holds a value plus the bookkeeping the assignment protocol needs:
//! the recorded write target (set while the variable-reference flag is
//! armed) and, for member function values, the receiver the call should
//! dispatch on.

use quill_core::value::{ArrayHandle, ClassHandle, GcValue, GcVariable};

/// The recorded owner of a loaded value, written through on assignment.
#[derive(Debug, Clone)]
pub enum SlotRef {
    /// A variable (including struct fields and class members, which are
    /// variables too).
    Variable(GcVariable),
    /// An array element.
    Element { array: ArrayHandle, index: usize },
    /// One character of a string value.
    CharAt { target: GcValue, index: usize },
}

/// One evaluation-stack entry.
#[derive(Debug, Clone)]
pub struct StackSlot {
    pub value: GcValue,
    pub reference: Option<SlotRef>,
    /// The class instance a member function value was loaded from.
    pub receiver: Option<ClassHandle>,
}

impl StackSlot {
    pub fn plain(value: GcValue) -> Self {
        StackSlot {
            value,
            reference: None,
            receiver: None,
        }
    }

    pub fn with_reference(value: GcValue, reference: SlotRef) -> Self {
        StackSlot {
            value,
            reference: Some(reference),
            receiver: None,
        }
    }
}
