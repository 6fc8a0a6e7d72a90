// quill-core - Runtime value universe
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime values and variables.
//!
//! Every runtime value lives in a GC-registered cell ([`GcValue`]); every
//! runtime variable boxes one value ([`GcVariable`]). Arrays, structs and
//! class instances are shared handles: cloning a value that holds one clones
//! the handle, not the contents, so aliasing is visible through every copy.
//! Scalars are copied by value on assignment.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use indexmap::IndexMap;

use quill_syntax::types::{Tag, TypeDef};

use crate::scope::Scope;

/// Shared handle to a length-tagged buffer of value references.
pub type ArrayHandle = Rc<RefCell<Vec<GcValue>>>;

/// Shared handle to an ordered map from field names to variables.
pub type StructHandle = Rc<RefCell<IndexMap<String, GcVariable>>>;

/// Shared handle to a class instance: a scope holding variables and
/// function entries.
pub type ClassHandle = Rc<RefCell<Scope<GcVariable>>>;

/// The payload of a runtime value. Exactly one of these per value.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Compile-time "no value yet"; also what bodiless paths return.
    Undefined,
    /// The runtime null.
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
    Array(ArrayHandle),
    Struct(StructHandle),
    Class(ClassHandle),
    /// A function handle: `(namespace, name)`.
    Function(String, String),
}

/// A runtime value: its type definition plus one payload.
#[derive(Debug, Clone)]
pub struct Value {
    pub ty: TypeDef,
    pub payload: Payload,
}

impl Value {
    pub fn undefined() -> Self {
        Value {
            ty: TypeDef::new(Tag::Undefined),
            payload: Payload::Undefined,
        }
    }

    pub fn void() -> Self {
        Value {
            ty: TypeDef::new(Tag::Void),
            payload: Payload::Void,
        }
    }

    pub fn bool(value: bool) -> Self {
        Value {
            ty: TypeDef::new(Tag::Bool),
            payload: Payload::Bool(value),
        }
    }

    pub fn int(value: i64) -> Self {
        Value {
            ty: TypeDef::new(Tag::Int),
            payload: Payload::Int(value),
        }
    }

    pub fn float(value: f64) -> Self {
        Value {
            ty: TypeDef::new(Tag::Float),
            payload: Payload::Float(value),
        }
    }

    pub fn char(value: char) -> Self {
        Value {
            ty: TypeDef::new(Tag::Char),
            payload: Payload::Char(value),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value {
            ty: TypeDef::new(Tag::String),
            payload: Payload::String(value.into()),
        }
    }

    /// An array value; `ty` carries the element tag and the shape.
    pub fn array(elements: Vec<GcValue>, ty: TypeDef) -> Self {
        Value {
            ty,
            payload: Payload::Array(Rc::new(RefCell::new(elements))),
        }
    }

    /// An array value sharing an existing handle.
    pub fn array_handle(handle: ArrayHandle, ty: TypeDef) -> Self {
        Value {
            ty,
            payload: Payload::Array(handle),
        }
    }

    pub fn strukt(fields: IndexMap<String, GcVariable>, type_ns: &str, type_name: &str) -> Self {
        Value {
            ty: TypeDef::object(Tag::Struct, type_ns, type_name),
            payload: Payload::Struct(Rc::new(RefCell::new(fields))),
        }
    }

    pub fn struct_handle(handle: StructHandle, type_ns: &str, type_name: &str) -> Self {
        Value {
            ty: TypeDef::object(Tag::Struct, type_ns, type_name),
            payload: Payload::Struct(handle),
        }
    }

    pub fn class(scope: Scope<GcVariable>, type_ns: &str, type_name: &str) -> Self {
        Value {
            ty: TypeDef::object(Tag::Class, type_ns, type_name),
            payload: Payload::Class(Rc::new(RefCell::new(scope))),
        }
    }

    pub fn class_handle(handle: ClassHandle, type_ns: &str, type_name: &str) -> Self {
        Value {
            ty: TypeDef::object(Tag::Class, type_ns, type_name),
            payload: Payload::Class(handle),
        }
    }

    pub fn function(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Value {
            ty: TypeDef::new(Tag::Function),
            payload: Payload::Function(ns.into(), name.into()),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.payload, Payload::Undefined)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.payload, Payload::Void)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.payload, Payload::Array(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self.payload,
            Payload::Bool(_)
                | Payload::Int(_)
                | Payload::Float(_)
                | Payload::Char(_)
                | Payload::String(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.payload {
            Payload::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self.payload {
            Payload::Char(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayHandle> {
        match &self.payload {
            Payload::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructHandle> {
        match &self.payload {
            Payload::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassHandle> {
        match &self.payload {
            Payload::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Numeric payload widened to `f64`, if the value is numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self.payload {
            Payload::Int(i) => Some(i as f64),
            Payload::Float(f) => Some(f),
            _ => None,
        }
    }

    /// The type rendering used in error messages.
    pub fn type_name(&self) -> String {
        self.ty.to_string()
    }

    /// Replace the payload in place, keeping the cell identity.
    pub fn set_payload(&mut self, ty: TypeDef, payload: Payload) {
        self.ty = ty;
        self.payload = payload;
    }

    /// Copy another value into this one: scalars copy the payload, arrays,
    /// structs and classes share the handle.
    pub fn copy_from(&mut self, other: &Value) {
        self.ty = other.ty.clone();
        self.payload = other.payload.clone();
    }
}

/// A GC-registered value cell. Cloning clones the handle; the payload is
/// shared.
#[derive(Debug, Clone)]
pub struct GcValue {
    cell: Rc<ValueCell>,
}

/// The heap cell behind a [`GcValue`].
#[derive(Debug)]
pub struct ValueCell {
    pub(crate) mark: Cell<bool>,
    value: RefCell<Value>,
}

impl GcValue {
    /// Create an unregistered cell. Use the collector's `alloc` so the cell
    /// participates in collection.
    pub(crate) fn new_unregistered(value: Value) -> Self {
        GcValue {
            cell: Rc::new(ValueCell {
                mark: Cell::new(false),
                value: RefCell::new(value),
            }),
        }
    }

    pub fn borrow(&self) -> Ref<'_, Value> {
        self.cell.value.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Value> {
        self.cell.value.borrow_mut()
    }

    /// Stable identity of the cell, used by `refid` and cycle detection.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.cell) as usize
    }

    pub fn ptr_eq(&self, other: &GcValue) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn mark_cell(&self) -> &Cell<bool> {
        &self.cell.mark
    }

    /// Outbound GC edges of this value.
    pub fn references(&self) -> Vec<GcRef> {
        let value = self.borrow();
        match &value.payload {
            Payload::Array(arr) => arr.borrow().iter().map(|v| GcRef::Value(v.clone())).collect(),
            Payload::Struct(fields) => fields
                .borrow()
                .values()
                .map(|v| GcRef::Variable(v.clone()))
                .collect(),
            Payload::Class(scope) => scope
                .borrow()
                .variables()
                .map(|(_, v)| GcRef::Variable(v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Drop composite contents so unreachable cycles can be freed.
    pub(crate) fn clear_payload(&self) {
        let mut value = self.borrow_mut();
        if !value.is_scalar() {
            value.payload = Payload::Void;
            value.ty = TypeDef::new(Tag::Void);
        }
    }
}

/// A GC-registered variable: a named, typed box holding one value.
#[derive(Debug, Clone)]
pub struct GcVariable {
    cell: Rc<VariableCell>,
}

#[derive(Debug)]
pub struct VariableCell {
    pub(crate) mark: Cell<bool>,
    name: String,
    ty: RefCell<TypeDef>,
    value: RefCell<Option<GcValue>>,
}

impl GcVariable {
    pub(crate) fn new_unregistered(name: impl Into<String>, ty: TypeDef) -> Self {
        GcVariable {
            cell: Rc::new(VariableCell {
                mark: Cell::new(false),
                name: name.into(),
                ty: RefCell::new(ty),
                value: RefCell::new(None),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.cell.name.clone()
    }

    pub fn ty(&self) -> TypeDef {
        self.cell.ty.borrow().clone()
    }

    pub fn set_ty(&self, ty: TypeDef) {
        *self.cell.ty.borrow_mut() = ty;
    }

    pub fn set_value(&self, value: GcValue) {
        *self.cell.value.borrow_mut() = Some(value);
    }

    /// The boxed value. Variables are always given a value on declaration;
    /// a `None` here means the collector already released it.
    pub fn value(&self) -> Option<GcValue> {
        self.cell.value.borrow().clone()
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.cell) as usize
    }

    pub fn ptr_eq(&self, other: &GcVariable) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn mark_cell(&self) -> &Cell<bool> {
        &self.cell.mark
    }

    pub fn references(&self) -> Vec<GcRef> {
        match self.value() {
            Some(v) => vec![GcRef::Value(v)],
            None => Vec::new(),
        }
    }

    pub(crate) fn clear_value(&self) {
        *self.cell.value.borrow_mut() = None;
    }
}

/// An edge in the GC object graph.
#[derive(Debug, Clone)]
pub enum GcRef {
    Value(GcValue),
    Variable(GcVariable),
}
