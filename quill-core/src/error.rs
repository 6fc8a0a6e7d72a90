// quill-core - Runtime error types
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime error types.
//!
//! Every error the VM or the value operations can produce is a
//! [`RuntimeError`]. All of them are catchable by an enclosing `try` except
//! heap exhaustion, which is raised by the collector and deliberately not
//! offered to handlers.
//!
//! # Examples
//!
//! ```
//! use quill_core::error::RuntimeError;
//!
//! let err = RuntimeError::division_by_zero("/");
//! assert_eq!(err.to_string(), "division by zero encountered");
//!
//! let err = RuntimeError::invalid_operands("+", "bool", "int");
//! assert!(err.to_string().contains("'+'"));
//! ```

use std::fmt;

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Errors raised during bytecode execution or value operations.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// Division, remainder or floor-division by zero.
    DivisionByZero { op: &'static str },
    /// Binary operator applied to incompatible operand types.
    InvalidOperands {
        op: String,
        left: String,
        right: String,
    },
    /// Unary operator applied to an incompatible operand type.
    InvalidUnary { op: String, ty: String },
    /// Invalid type cast.
    InvalidCast { from: String, to: String },
    /// Array index out of range.
    ArrayIndexOutOfRange { index: i64, len: usize },
    /// String index out of range.
    StringIndexOutOfRange { index: i64, len: usize },
    /// Identifier was never declared.
    UndeclaredIdentifier(String),
    /// No function matches the call signature.
    UndeclaredFunction { signature: String },
    /// Struct or class member access on a name that is not a member.
    NotAMember { member: String, ty: String },
    /// Operation on a null value that requires a target.
    NullTarget(String),
    /// Assignment without a recorded reference target.
    NotAssignable,
    /// User `throw`: message plus integer code.
    Thrown { message: String, code: i64 },
    /// The collector ran out of heap. Not catchable.
    HeapExhausted { live: usize, max_heap: usize },
    /// Internal invariant violation.
    Internal(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::DivisionByZero { op } => match *op {
                "%" | "%=" => write!(f, "remainder by zero is undefined"),
                "/%" | "/%=" => write!(f, "floor division by zero encountered"),
                _ => write!(f, "division by zero encountered"),
            },
            RuntimeError::InvalidOperands { op, left, right } => {
                write!(
                    f,
                    "invalid '{}' operator for types '{}' and '{}'",
                    op, left, right
                )
            }
            RuntimeError::InvalidUnary { op, ty } => {
                write!(f, "invalid unary '{}' operator for type '{}'", op, ty)
            }
            RuntimeError::InvalidCast { from, to } => {
                write!(f, "invalid cast from '{}' to '{}'", from, to)
            }
            RuntimeError::ArrayIndexOutOfRange { index, len } => {
                write!(
                    f,
                    "invalid array access position {} in an array with size {}",
                    index, len
                )
            }
            RuntimeError::StringIndexOutOfRange { index, len } => {
                write!(
                    f,
                    "invalid string access position {} in a string with size {}",
                    index, len
                )
            }
            RuntimeError::UndeclaredIdentifier(name) => {
                write!(f, "identifier '{}' was not declared", name)
            }
            RuntimeError::UndeclaredFunction { signature } => {
                write!(f, "function '{}' was not declared", signature)
            }
            RuntimeError::NotAMember { member, ty } => {
                write!(f, "'{}' is not a member of '{}'", member, ty)
            }
            RuntimeError::NullTarget(what) => {
                write!(f, "null value has no {}", what)
            }
            RuntimeError::NotAssignable => {
                write!(
                    f,
                    "assigning operation can only be performed on referenced values"
                )
            }
            RuntimeError::Thrown { message, .. } => write!(f, "{}", message),
            RuntimeError::HeapExhausted { live, max_heap } => {
                write!(
                    f,
                    "heap exhausted: {} live objects exceed the {} object limit",
                    live, max_heap
                )
            }
            RuntimeError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn division_by_zero(op: &'static str) -> Self {
        RuntimeError::DivisionByZero { op }
    }

    pub fn invalid_operands(
        op: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        RuntimeError::InvalidOperands {
            op: op.into(),
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn invalid_unary(op: impl Into<String>, ty: impl Into<String>) -> Self {
        RuntimeError::InvalidUnary {
            op: op.into(),
            ty: ty.into(),
        }
    }

    pub fn invalid_cast(from: impl Into<String>, to: impl Into<String>) -> Self {
        RuntimeError::InvalidCast {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn undeclared_function(signature: impl Into<String>) -> Self {
        RuntimeError::UndeclaredFunction {
            signature: signature.into(),
        }
    }

    pub fn not_a_member(member: impl Into<String>, ty: impl Into<String>) -> Self {
        RuntimeError::NotAMember {
            member: member.into(),
            ty: ty.into(),
        }
    }

    pub fn thrown(message: impl Into<String>, code: i64) -> Self {
        RuntimeError::Thrown {
            message: message.into(),
            code,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RuntimeError::Internal(msg.into())
    }

    /// Whether an enclosing `try` may observe this error.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, RuntimeError::HeapExhausted { .. })
    }

    /// The user-visible `(code, message)` pair bound by a catch block.
    pub fn catch_payload(&self) -> (i64, String) {
        match self {
            RuntimeError::Thrown { message, code } => (*code, message.clone()),
            other => (0, other.to_string()),
        }
    }
}
