// quill-core - Compile-time values and constant folding
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The analyser's value model.
//!
//! A [`SemanticValue`] is a type definition plus, when the expression is
//! constexpr, the folded scalar constant. Folding reuses the runtime
//! operation rules, so it is deterministic and can never produce a result
//! the VM would disagree with; when an operation fails at analysis time the
//! result simply stops being constexpr.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use quill_syntax::types::{Tag, TypeDef};

use crate::ops;
use crate::value::Value;

/// A scalar constant known at analysis time.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl Constant {
    /// The runtime value this constant denotes.
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Bool(b) => Value::bool(*b),
            Constant::Int(i) => Value::int(*i),
            Constant::Float(f) => Value::float(*f),
            Constant::Char(c) => Value::char(*c),
            Constant::Str(s) => Value::string(s.clone()),
        }
    }

    /// Read a scalar constant back out of a runtime value.
    pub fn from_value(value: &Value) -> Option<Constant> {
        use crate::value::Payload;
        match &value.payload {
            Payload::Bool(b) => Some(Constant::Bool(*b)),
            Payload::Int(i) => Some(Constant::Int(*i)),
            Payload::Float(f) => Some(Constant::Float(*f)),
            Payload::Char(c) => Some(Constant::Char(*c)),
            Payload::String(s) => Some(Constant::Str(s.clone())),
            _ => None,
        }
    }

    /// Hash used to de-duplicate switch case values. Integers hash to
    /// themselves so numeric cases stay readable in dumps.
    pub fn hash_key(&self) -> i64 {
        match self {
            Constant::Int(i) => *i,
            Constant::Bool(b) => i64::from(*b),
            Constant::Char(c) => *c as i64,
            Constant::Float(f) => f.to_bits() as i64,
            Constant::Str(s) => {
                let mut hasher = DefaultHasher::new();
                s.hash(&mut hasher);
                hasher.finish() as i64
            }
        }
    }

    /// Constant int, when the constant is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// The analyser's per-expression result: a type and, when the expression
/// folds, its constant.
#[derive(Debug, Clone, Default)]
pub struct SemanticValue {
    pub ty: TypeDef,
    pub constant: Option<Constant>,
}

impl SemanticValue {
    pub fn typed(ty: TypeDef) -> Self {
        SemanticValue { ty, constant: None }
    }

    pub fn constant(ty: TypeDef, constant: Constant) -> Self {
        SemanticValue {
            ty,
            constant: Some(constant),
        }
    }

    pub fn is_constexpr(&self) -> bool {
        self.constant.is_some()
    }

    /// Drop constexpr-ness, keeping the type.
    pub fn degraded(mut self) -> Self {
        self.constant = None;
        self
    }
}

/// A compile-time variable: name, declared type, and the folded value for
/// `constexpr` declarations.
#[derive(Debug)]
pub struct SemanticVariable {
    pub name: String,
    pub ty: RefCell<TypeDef>,
    pub value: RefCell<SemanticValue>,
    pub is_const: bool,
}

/// Shared handle to a semantic variable, the payload the analyser's scopes
/// carry.
pub type SemVarRef = Rc<SemanticVariable>;

impl SemanticVariable {
    pub fn new(name: impl Into<String>, ty: TypeDef, is_const: bool) -> SemVarRef {
        Rc::new(SemanticVariable {
            name: name.into(),
            ty: RefCell::new(ty.clone()),
            value: RefCell::new(SemanticValue::typed(ty)),
            is_const,
        })
    }

    pub fn ty(&self) -> TypeDef {
        self.ty.borrow().clone()
    }

    pub fn set_value(&self, value: SemanticValue) {
        *self.value.borrow_mut() = value;
    }

    pub fn value(&self) -> SemanticValue {
        self.value.borrow().clone()
    }
}

/// Result type of a binary operation at analysis time, and the folded
/// constant when both operands fold.
///
/// The typing rules mirror the runtime dispatch; `Any` operands make the
/// result `Any` except where the operator fixes the result tag.
pub fn binary(op: &str, lval: &SemanticValue, rval: &SemanticValue) -> Result<SemanticValue, String> {
    let lty = &lval.ty;
    let rty = &rval.ty;

    let result_ty = binary_result_type(op, lty, rty)
        .ok_or_else(|| format!("invalid '{}' operator for types '{}' and '{}'", op, lty, rty))?;

    // Fold when both sides carry constants; a runtime failure only
    // downgrades the result.
    if let (Some(l), Some(r)) = (&lval.constant, &rval.constant) {
        if let Ok(folded) = ops::binary_operation(op, &l.to_value(), &r.to_value()) {
            if let Some(constant) = Constant::from_value(&folded) {
                return Ok(SemanticValue::constant(folded.ty, constant));
            }
        }
    }

    Ok(SemanticValue::typed(result_ty))
}

/// The result tag table for binary operators, `None` when the combination
/// is an error.
pub fn binary_result_type(op: &str, lty: &TypeDef, rty: &TypeDef) -> Option<TypeDef> {
    use quill_syntax::ops as tokens;

    let any = |t: &TypeDef| t.is_any() && !t.is_array();

    match op {
        "and" | "or" => {
            if (lty.is_bool() || any(lty)) && (rty.is_bool() || any(rty)) {
                Some(TypeDef::new(Tag::Bool))
            } else {
                None
            }
        }
        "==" | "!=" => Some(TypeDef::new(Tag::Bool)),
        "<" | "<=" | ">" | ">=" => {
            if (lty.is_numeric() || any(lty)) && (rty.is_numeric() || any(rty)) {
                Some(TypeDef::new(Tag::Bool))
            } else {
                None
            }
        }
        "<=>" => {
            if (lty.is_numeric() || any(lty)) && (rty.is_numeric() || any(rty)) {
                Some(TypeDef::new(Tag::Int))
            } else {
                None
            }
        }
        "in" => {
            if rty.is_array() || rty.is_string() || any(rty) {
                Some(TypeDef::new(Tag::Bool))
            } else {
                None
            }
        }
        "|" | "&" | "^" | "<<" | ">>" => {
            if (lty.is_int() || any(lty)) && (rty.is_int() || any(rty)) {
                Some(TypeDef::new(Tag::Int))
            } else {
                None
            }
        }
        "/" | "/%" => {
            if (lty.is_numeric() || any(lty)) && (rty.is_numeric() || any(rty)) {
                Some(TypeDef::new(Tag::Float))
            } else {
                None
            }
        }
        "%" => {
            if lty.is_int() && rty.is_int() {
                Some(TypeDef::new(Tag::Int))
            } else if (lty.is_numeric() || any(lty)) && (rty.is_numeric() || any(rty)) {
                Some(TypeDef::new(Tag::Float))
            } else {
                None
            }
        }
        "+" if lty.is_array() => {
            if rty.is_array() && lty.matches(rty, false) {
                Some(lty.clone())
            } else {
                None
            }
        }
        "+" if lty.is_textual() || rty.is_textual() => {
            let textual_pair = lty.is_textual() && rty.is_textual();
            let renderable = lty.is_string() && (rty.is_numeric() || rty.is_bool());
            if textual_pair || renderable || any(lty) || any(rty) {
                Some(TypeDef::new(Tag::String))
            } else {
                None
            }
        }
        "+" | "-" | "*" | "**" => {
            if any(lty) || any(rty) {
                return Some(TypeDef::new(Tag::Any));
            }
            if lty.is_int() && rty.is_int() {
                Some(TypeDef::new(Tag::Int))
            } else if lty.is_numeric() && rty.is_numeric() {
                Some(TypeDef::new(Tag::Float))
            } else {
                None
            }
        }
        _ => {
            if tokens::is_assignment(op) {
                // Compound assignments evaluate as their core and take the
                // type of the left-hand side.
                if op == "=" {
                    return Some(lty.clone());
                }
                binary_result_type(tokens::assignment_core(op), lty, rty).map(|_| lty.clone())
            } else {
                None
            }
        }
    }
}

/// Result type of a unary operator at analysis time.
pub fn unary(op: &str, val: &SemanticValue) -> Result<SemanticValue, String> {
    let ty = &val.ty;
    let any = ty.is_any() && !ty.is_array();

    let result_ty = match op {
        "-" | "++" | "--" => {
            if ty.is_numeric() || any {
                ty.clone()
            } else {
                return Err(format!("invalid unary '{}' operator for type '{}'", op, ty));
            }
        }
        "not" => {
            if ty.is_bool() || any {
                TypeDef::new(Tag::Bool)
            } else {
                return Err(format!("invalid unary '{}' operator for type '{}'", op, ty));
            }
        }
        "~" => {
            if ty.is_int() || any {
                TypeDef::new(Tag::Int)
            } else {
                return Err(format!("invalid unary '{}' operator for type '{}'", op, ty));
            }
        }
        _ => return Err(format!("unknown unary operator '{}'", op)),
    };

    if let Some(c) = &val.constant {
        if let Ok(folded) = ops::unary_operation(op, &c.to_value()) {
            if let Some(constant) = Constant::from_value(&folded) {
                return Ok(SemanticValue::constant(folded.ty, constant));
            }
        }
    }

    Ok(SemanticValue::typed(result_ty))
}

/// Normalise an inferred value to the declared side: `Char -> String`,
/// `Int <-> Float`. Applied to both the type and the constant.
pub fn normalize(owner: &TypeDef, value: &mut SemanticValue) {
    if owner.is_array() || value.ty.is_array() {
        return;
    }
    let coerce = matches!(
        (owner.tag, value.ty.tag),
        (Tag::String, Tag::Char) | (Tag::Float, Tag::Int) | (Tag::Int, Tag::Float)
    );
    if !coerce {
        return;
    }
    value.ty = TypeDef::new(owner.tag);
    value.constant = value.constant.take().and_then(|c| match (owner.tag, c) {
        (Tag::String, Constant::Char(c)) => Some(Constant::Str(c.to_string())),
        (Tag::Float, Constant::Int(i)) => Some(Constant::Float(i as f64)),
        (Tag::Int, Constant::Float(f)) => Some(Constant::Int(f as i64)),
        (_, c) => Some(c),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_const(i: i64) -> SemanticValue {
        SemanticValue::constant(TypeDef::new(Tag::Int), Constant::Int(i))
    }

    #[test]
    fn test_fold_addition() {
        let r = binary("+", &int_const(2), &int_const(3)).unwrap();
        assert_eq!(r.constant, Some(Constant::Int(5)));
        assert!(r.ty.is_int());
    }

    #[test]
    fn test_fold_failure_degrades() {
        // Division by zero folds to a non-constexpr float.
        let r = binary("/", &int_const(1), &int_const(0)).unwrap();
        assert!(r.constant.is_none());
        assert!(r.ty.is_float());
    }

    #[test]
    fn test_fold_is_deterministic() {
        let a = binary("*", &int_const(321), &int_const(1234)).unwrap();
        let b = binary("*", &int_const(321), &int_const(1234)).unwrap();
        assert_eq!(a.constant, b.constant);
    }

    #[test]
    fn test_type_error_reported() {
        let b = SemanticValue::typed(TypeDef::new(Tag::Bool));
        assert!(binary("+", &b, &int_const(1)).is_err());
    }

    #[test]
    fn test_relational_requires_numeric() {
        let s = SemanticValue::typed(TypeDef::new(Tag::String));
        assert!(binary("<", &s, &int_const(1)).is_err());
        let r = binary("<", &int_const(1), &int_const(2)).unwrap();
        assert_eq!(r.constant, Some(Constant::Bool(true)));
    }

    #[test]
    fn test_normalize_int_to_float() {
        let mut v = int_const(3);
        normalize(&TypeDef::new(Tag::Float), &mut v);
        assert!(v.ty.is_float());
        assert_eq!(v.constant, Some(Constant::Float(3.0)));
    }

    #[test]
    fn test_assignment_takes_lhs_type() {
        let f = SemanticValue::typed(TypeDef::new(Tag::Float));
        let r = binary_result_type("+=", &f.ty, &TypeDef::new(Tag::Int)).unwrap();
        assert!(r.is_float());
    }
}
