// quill-core - Value universe, scopes and garbage collector for the Quill programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # quill-core
//!
//! The runtime substrate of the Quill toolchain: the tagged value universe
//! and its operation rules, the compile-time value model used for constant
//! folding, the generic scope and scope manager shared by the analyser and
//! the VM, and the mark/sweep garbage collector.
//!
//! # Quick Start
//!
//! ```
//! use quill_core::gc::GarbageCollector;
//! use quill_core::ops;
//! use quill_core::value::{GcRef, Value};
//!
//! let mut gc = GarbageCollector::new();
//! let sum = ops::binary_operation("+", &Value::int(40), &Value::int(2)).unwrap();
//! let cell = gc.alloc(sum);
//! assert_eq!(cell.borrow().as_int(), Some(42));
//!
//! // Nothing roots the cell, so a collection reclaims it.
//! gc.collect(&[]);
//! assert_eq!(gc.heap_size(), 0);
//! # let _ = GcRef::Value(cell);
//! ```

pub mod constants;
pub mod error;
pub mod gc;
pub mod manager;
pub mod ops;
pub mod scope;
pub mod semantic;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use gc::GarbageCollector;
pub use manager::{scope_ref, ScopeManager, ScopeRef};
pub use scope::{fun_ref, ClassRef, FunRef, Scope, StructRef};
pub use semantic::{Constant, SemVarRef, SemanticValue, SemanticVariable};
pub use value::{ArrayHandle, ClassHandle, GcRef, GcValue, GcVariable, Payload, StructHandle, Value};
