// quill-core - Runtime value operations
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Binary and unary operation rules, equality, casts and stringification.
//!
//! The result tag and error conditions of every operator are determined by
//! the operand payloads, ties broken top-down in the order of the dispatch
//! below. The same rules drive the VM's operator instructions and the
//! analyser's constant folding, so a fold can never produce a value the
//! runtime would not.

use std::rc::Rc;

use quill_syntax::ops as tokens;
use quill_syntax::types::{signature_string, Param, Tag, TypeDef};

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{Payload, Value};

// ----------------------------------------------------------------------
// Equality
// ----------------------------------------------------------------------

/// Equality over two values: scalars by value (numeric cross-compare),
/// arrays, structs and classes by shared-handle identity, functions by
/// `(namespace, name)`.
pub fn equals_value(lval: &Value, rval: &Value) -> bool {
    match (&lval.payload, &rval.payload) {
        (Payload::Void, Payload::Void) => true,
        (Payload::Bool(l), Payload::Bool(r)) => l == r,
        (Payload::Int(l), Payload::Int(r)) => l == r,
        (Payload::Float(l), Payload::Float(r)) => l == r,
        (Payload::Int(l), Payload::Float(r)) => (*l as f64) == *r,
        (Payload::Float(l), Payload::Int(r)) => *l == (*r as f64),
        (Payload::Char(l), Payload::Char(r)) => l == r,
        (Payload::String(l), Payload::String(r)) => l == r,
        (Payload::Array(l), Payload::Array(r)) => Rc::ptr_eq(l, r),
        (Payload::Struct(l), Payload::Struct(r)) => Rc::ptr_eq(l, r),
        (Payload::Class(l), Payload::Class(r)) => Rc::ptr_eq(l, r),
        (Payload::Function(lns, ln), Payload::Function(rns, rn)) => lns == rns && ln == rn,
        _ => false,
    }
}

// ----------------------------------------------------------------------
// Binary operations
// ----------------------------------------------------------------------

/// Apply a non-assigning binary operator. Assignment routing happens in the
/// VM, which resolves the write target; compound assignments call in here
/// with their core operator.
pub fn binary_operation(op: &str, lval: &Value, rval: &Value) -> RuntimeResult<Value> {
    if op == "in" {
        return in_operation(lval, rval);
    }

    // Null comparison: equality on tags only.
    if (lval.is_void() || rval.is_void()) && tokens::is_equality(op) {
        let same = lval.ty.match_tag(&rval.ty);
        return Ok(Value::bool(if op == "==" { same } else { !same }));
    }

    match &lval.payload {
        Payload::Array(larr) => {
            if rval.is_array() && tokens::is_equality(op) {
                let eq = equals_value(lval, rval);
                return Ok(Value::bool(if op == "==" { eq } else { !eq }));
            }
            if op != "+" || !rval.is_array() {
                return Err(operands_err(op, lval, rval));
            }
            if !rval.ty.matches(&lval.ty, false) {
                return Err(operands_err(op, lval, rval));
            }
            let rarr = rval.as_array().expect("array payload");

            let mut elements: Vec<_> = larr.borrow().clone();
            elements.extend(rarr.borrow().iter().cloned());

            let tag = if lval.ty.tag == rval.ty.tag || lval.ty.is_any() {
                lval.ty.tag
            } else {
                Tag::Any
            };
            let mut dims = lval.ty.dims.clone();
            if dims.is_empty() {
                dims.push(elements.len());
            } else if let (Some(last), Some(rlast)) = (dims.last_mut(), rval.ty.dims.last()) {
                *last += rlast;
            }
            let mut ty = TypeDef::array(tag, dims);
            ty.type_ns = lval.ty.type_ns.clone();
            ty.type_name = lval.ty.type_name.clone();
            Ok(Value::array(elements, ty))
        }

        Payload::Bool(l) => {
            let r = match rval.payload {
                Payload::Bool(r) => r,
                _ => return Err(operands_err(op, lval, rval)),
            };
            match op {
                "and" => Ok(Value::bool(*l && r)),
                "or" => Ok(Value::bool(*l || r)),
                "==" => Ok(Value::bool(*l == r)),
                "!=" => Ok(Value::bool(*l != r)),
                _ => Err(operands_err(op, lval, rval)),
            }
        }

        Payload::Int(l) => match &rval.payload {
            Payload::Int(r) => {
                if let Some(res) = numeric_comparison(op, *l as f64, *r as f64) {
                    return Ok(res);
                }
                if op == "/" || op == "/%" {
                    return float_operation(*l as f64, *r as f64, op).map(Value::float);
                }
                int_operation(*l, *r, op)
                    .map(Value::int)
                    .map_err(|e| refine_operands_err(e, op, lval, rval))
            }
            Payload::Float(r) => {
                if let Some(res) = numeric_comparison(op, *l as f64, *r) {
                    return Ok(res);
                }
                float_operation(*l as f64, *r, op)
                    .map(Value::float)
                    .map_err(|e| refine_operands_err(e, op, lval, rval))
            }
            _ => Err(operands_err(op, lval, rval)),
        },

        Payload::Float(l) => match &rval.payload {
            Payload::Int(r) => {
                if let Some(res) = numeric_comparison(op, *l, *r as f64) {
                    return Ok(res);
                }
                float_operation(*l, *r as f64, op)
                    .map(Value::float)
                    .map_err(|e| refine_operands_err(e, op, lval, rval))
            }
            Payload::Float(r) => {
                if let Some(res) = numeric_comparison(op, *l, *r) {
                    return Ok(res);
                }
                float_operation(*l, *r, op)
                    .map(Value::float)
                    .map_err(|e| refine_operands_err(e, op, lval, rval))
            }
            _ => Err(operands_err(op, lval, rval)),
        },

        Payload::Char(l) => match &rval.payload {
            Payload::Char(r) => {
                if tokens::is_equality(op) {
                    let eq = l == r;
                    return Ok(Value::bool(if op == "==" { eq } else { !eq }));
                }
                string_operation(&l.to_string(), &r.to_string(), op)
                    .map(Value::string)
                    .map_err(|e| refine_operands_err(e, op, lval, rval))
            }
            Payload::String(r) => string_operation(&l.to_string(), r, op)
                .map(Value::string)
                .map_err(|e| refine_operands_err(e, op, lval, rval)),
            _ => Err(operands_err(op, lval, rval)),
        },

        Payload::String(l) => match &rval.payload {
            Payload::String(r) => {
                if tokens::is_equality(op) {
                    let eq = l == r;
                    return Ok(Value::bool(if op == "==" { eq } else { !eq }));
                }
                string_operation(l, r, op)
                    .map(Value::string)
                    .map_err(|e| refine_operands_err(e, op, lval, rval))
            }
            Payload::Char(r) => string_operation(l, &r.to_string(), op)
                .map(Value::string)
                .map_err(|e| refine_operands_err(e, op, lval, rval)),
            // Concatenation renders scalar right-hand sides.
            Payload::Bool(_) | Payload::Int(_) | Payload::Float(_) if op == "+" => {
                let rendered = string_of(rval, false)?;
                Ok(Value::string(format!("{}{}", l, rendered)))
            }
            _ => Err(operands_err(op, lval, rval)),
        },

        Payload::Struct(_) | Payload::Class(_) | Payload::Function(..) => {
            let compatible = matches!(
                (&lval.payload, &rval.payload),
                (Payload::Struct(_), Payload::Struct(_))
                    | (Payload::Class(_), Payload::Class(_))
                    | (Payload::Function(..), Payload::Function(..))
            );
            if compatible && tokens::is_equality(op) {
                let eq = equals_value(lval, rval);
                return Ok(Value::bool(if op == "==" { eq } else { !eq }));
            }
            Err(operands_err(op, lval, rval))
        }

        Payload::Undefined | Payload::Void => Err(operands_err(op, lval, rval)),
    }
}

/// Relational, spaceship and numeric-equality results, or `None` when the
/// operator is arithmetic.
fn numeric_comparison(op: &str, l: f64, r: f64) -> Option<Value> {
    if op == "<=>" {
        let ord = if l < r {
            -1
        } else if l > r {
            1
        } else {
            0
        };
        return Some(Value::int(ord));
    }
    if tokens::is_relational(op) {
        let res = match op {
            "<" => l < r,
            "<=" => l <= r,
            ">" => l > r,
            ">=" => l >= r,
            _ => unreachable!(),
        };
        return Some(Value::bool(res));
    }
    if tokens::is_equality(op) {
        let eq = l == r;
        return Some(Value::bool(if op == "==" { eq } else { !eq }));
    }
    None
}

/// Integer arithmetic and bitwise rules. Wrapping semantics, explicit
/// division checks.
pub fn int_operation(l: i64, r: i64, op: &str) -> RuntimeResult<i64> {
    match op {
        "=" => Ok(r),
        "+" => Ok(l.wrapping_add(r)),
        "-" => Ok(l.wrapping_sub(r)),
        "*" => Ok(l.wrapping_mul(r)),
        "/" => {
            if r == 0 {
                Err(RuntimeError::division_by_zero("/"))
            } else {
                Ok(l.wrapping_div(r))
            }
        }
        "%" => {
            if r == 0 {
                Err(RuntimeError::division_by_zero("%"))
            } else {
                Ok(l.wrapping_rem(r))
            }
        }
        "/%" => {
            if r == 0 {
                Err(RuntimeError::division_by_zero("/%"))
            } else {
                Ok((l as f64 / r as f64).floor() as i64)
            }
        }
        "**" => Ok((l as f64).powf(r as f64) as i64),
        ">>" => Ok(l.wrapping_shr(r as u32)),
        "<<" => Ok(l.wrapping_shl(r as u32)),
        "|" => Ok(l | r),
        "&" => Ok(l & r),
        "^" => Ok(l ^ r),
        _ => Err(RuntimeError::invalid_operands(op, "int", "int")),
    }
}

/// Float arithmetic rules.
pub fn float_operation(l: f64, r: f64, op: &str) -> RuntimeResult<f64> {
    match op {
        "=" => Ok(r),
        "+" => Ok(l + r),
        "-" => Ok(l - r),
        "*" => Ok(l * r),
        "/" => {
            if r == 0.0 {
                Err(RuntimeError::division_by_zero("/"))
            } else {
                Ok(l / r)
            }
        }
        "%" => {
            if r == 0.0 {
                Err(RuntimeError::division_by_zero("%"))
            } else {
                Ok(l % r)
            }
        }
        "/%" => {
            if r == 0.0 {
                Err(RuntimeError::division_by_zero("/%"))
            } else {
                Ok((l / r).floor())
            }
        }
        "**" => Ok(l.powf(r)),
        _ => Err(RuntimeError::invalid_operands(op, "float", "float")),
    }
}

/// Textual rules: concatenation only.
pub fn string_operation(l: &str, r: &str, op: &str) -> RuntimeResult<String> {
    match op {
        "=" => Ok(r.to_string()),
        "+" => Ok(format!("{}{}", l, r)),
        _ => Err(RuntimeError::invalid_operands(op, "string", "string")),
    }
}

/// `lhs in rhs`: membership in an array or a string.
fn in_operation(lval: &Value, rval: &Value) -> RuntimeResult<Value> {
    match &rval.payload {
        Payload::Array(arr) => {
            let found = arr
                .borrow()
                .iter()
                .any(|elem| equals_value(lval, &elem.borrow()));
            Ok(Value::bool(found))
        }
        Payload::String(s) => match &lval.payload {
            Payload::Char(c) => Ok(Value::bool(s.contains(*c))),
            Payload::String(sub) => Ok(Value::bool(s.contains(sub.as_str()))),
            _ => Err(operands_err("in", lval, rval)),
        },
        _ => Err(operands_err("in", lval, rval)),
    }
}

// ----------------------------------------------------------------------
// Unary operations
// ----------------------------------------------------------------------

/// Apply a unary operator.
pub fn unary_operation(op: &str, val: &Value) -> RuntimeResult<Value> {
    match (op, &val.payload) {
        ("-", Payload::Int(i)) => Ok(Value::int(i.wrapping_neg())),
        ("-", Payload::Float(f)) => Ok(Value::float(-f)),
        ("not", Payload::Bool(b)) => Ok(Value::bool(!b)),
        ("~", Payload::Int(i)) => Ok(Value::int(!i)),
        ("++", Payload::Int(i)) => Ok(Value::int(i.wrapping_add(1))),
        ("++", Payload::Float(f)) => Ok(Value::float(f + 1.0)),
        ("--", Payload::Int(i)) => Ok(Value::int(i.wrapping_sub(1))),
        ("--", Payload::Float(f)) => Ok(Value::float(f - 1.0)),
        _ => Err(RuntimeError::invalid_unary(op, val.type_name())),
    }
}

// ----------------------------------------------------------------------
// Casts
// ----------------------------------------------------------------------

/// Explicit cast (`int(x)`, `string(x)`, ...). Fails with `InvalidCast`
/// when there is no defined conversion.
pub fn type_parse(target: Tag, val: &Value) -> RuntimeResult<Value> {
    let fail = || RuntimeError::invalid_cast(val.type_name(), target.name());

    match target {
        Tag::Int => match &val.payload {
            Payload::Int(i) => Ok(Value::int(*i)),
            Payload::Float(f) => Ok(Value::int(*f as i64)),
            Payload::Bool(b) => Ok(Value::int(i64::from(*b))),
            Payload::Char(c) => Ok(Value::int(*c as i64)),
            Payload::String(s) => s.trim().parse::<i64>().map(Value::int).map_err(|_| fail()),
            _ => Err(fail()),
        },
        Tag::Float => match &val.payload {
            Payload::Int(i) => Ok(Value::float(*i as f64)),
            Payload::Float(f) => Ok(Value::float(*f)),
            Payload::String(s) => s.trim().parse::<f64>().map(Value::float).map_err(|_| fail()),
            _ => Err(fail()),
        },
        Tag::Bool => match &val.payload {
            Payload::Bool(b) => Ok(Value::bool(*b)),
            Payload::Int(i) => Ok(Value::bool(*i != 0)),
            Payload::String(s) => match s.as_str() {
                "true" => Ok(Value::bool(true)),
                "false" => Ok(Value::bool(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        Tag::Char => match &val.payload {
            Payload::Char(c) => Ok(Value::char(*c)),
            Payload::Int(i) => u32::try_from(*i)
                .ok()
                .and_then(char::from_u32)
                .map(Value::char)
                .ok_or_else(fail),
            Payload::String(s) => s.chars().next().map(Value::char).ok_or_else(fail),
            _ => Err(fail()),
        },
        Tag::String => Ok(Value::string(string_of(val, false)?)),
        _ => Err(fail()),
    }
}

// ----------------------------------------------------------------------
// Coercion
// ----------------------------------------------------------------------

/// The implicit coercions applied on assignment and argument binding:
/// `Char -> String`, `Int -> Float`, `Float -> Int`. Never through arrays.
/// Returns `None` when the value passes unchanged.
pub fn coerced(owner: &TypeDef, val: &Value) -> Option<Value> {
    if owner.is_array() || val.ty.is_array() || val.is_array() {
        return None;
    }
    match (&owner.tag, &val.payload) {
        (Tag::String, Payload::Char(c)) => Some(Value::string(c.to_string())),
        (Tag::Float, Payload::Int(i)) => Some(Value::float(*i as f64)),
        (Tag::Int, Payload::Float(f)) => Some(Value::int(*f as i64)),
        _ => None,
    }
}

// ----------------------------------------------------------------------
// Stringification
// ----------------------------------------------------------------------

/// Deterministic, cycle-safe rendering.
///
/// Floats strip trailing zeros but keep one digit after the point; arrays
/// render as `{e1,e2,...}`; structs as `{field:value;...}`; classes add
/// their function signatures. Cycles collapse to `{...}`.
pub fn string_of(value: &Value, show_complex: bool) -> RuntimeResult<String> {
    let mut printed = Vec::new();
    render(value, show_complex, &mut printed)
}

fn render(value: &Value, show_complex: bool, printed: &mut Vec<usize>) -> RuntimeResult<String> {
    if let Payload::Array(arr) = &value.payload {
        let id = Rc::as_ptr(arr) as usize;
        let mut out = format!("{}<array@0x{:x}>", value.ty, id);
        if show_complex {
            if printed.contains(&id) {
                out.push_str("{...}");
            } else {
                printed.push(id);
                out.push_str(&render_array(value, show_complex, printed)?);
            }
        }
        return Ok(out);
    }

    match &value.payload {
        Payload::Void => Ok("null".to_string()),
        Payload::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Payload::Int(i) => Ok(i.to_string()),
        Payload::Float(f) => Ok(format_float(*f)),
        Payload::Char(c) => Ok(c.to_string()),
        Payload::String(s) => Ok(s.clone()),
        Payload::Struct(fields) => {
            let id = Rc::as_ptr(fields) as usize;
            let mut out = format!("{}<struct@0x{:x}>", value.ty.qualified_name(), id);
            if show_complex {
                if printed.contains(&id) {
                    out.push_str("{...}");
                } else {
                    printed.push(id);
                    out.push_str(&render_struct(value, show_complex, printed)?);
                }
            }
            Ok(out)
        }
        Payload::Class(scope) => {
            let id = Rc::as_ptr(scope) as usize;
            let mut out = format!("{}<class@0x{:x}>", value.ty.qualified_name(), id);
            if show_complex {
                if printed.contains(&id) {
                    out.push_str("{...}");
                } else {
                    printed.push(id);
                    out.push_str(&render_class(value, show_complex, printed)?);
                }
            }
            Ok(out)
        }
        Payload::Function(ns, name) => {
            if ns.is_empty() {
                Ok(format!("{}(...)", name))
            } else {
                Ok(format!("{}::{}(...)", ns, name))
            }
        }
        Payload::Undefined => Err(RuntimeError::internal("undefined expression")),
        Payload::Array(_) => unreachable!("handled by the early return above"),
    }
}

fn quote_for(value: &Value) -> &'static str {
    match value.payload {
        Payload::Char(_) => "'",
        Payload::String(_) => "\"",
        _ => "",
    }
}

fn render_array(
    value: &Value,
    show_complex: bool,
    printed: &mut Vec<usize>,
) -> RuntimeResult<String> {
    let arr = value.as_array().expect("array payload");
    let mut out = String::from("{");
    let elements = arr.borrow();
    for (i, elem) in elements.iter().enumerate() {
        let elem = elem.borrow();
        let quote = quote_for(&elem);
        out.push_str(quote);
        out.push_str(&render(&elem, show_complex, printed)?);
        out.push_str(quote);
        if i + 1 < elements.len() {
            out.push(',');
        }
    }
    out.push('}');
    Ok(out)
}

fn render_struct(
    value: &Value,
    show_complex: bool,
    printed: &mut Vec<usize>,
) -> RuntimeResult<String> {
    let fields = value.as_struct().expect("struct payload");
    let mut out = String::from("{");
    for (key, var) in fields.borrow().iter() {
        out.push_str(key);
        out.push(':');
        match var.value() {
            Some(v) => {
                let v = v.borrow();
                let quote = quote_for(&v);
                out.push_str(quote);
                out.push_str(&render(&v, show_complex, printed)?);
                out.push_str(quote);
            }
            None => out.push_str("null"),
        }
        out.push(';');
    }
    out.push('}');
    Ok(out)
}

fn render_class(
    value: &Value,
    show_complex: bool,
    printed: &mut Vec<usize>,
) -> RuntimeResult<String> {
    let scope = value.as_class().expect("class payload");
    let scope = scope.borrow();
    let mut out = String::from("{");
    for (key, var) in scope.variables() {
        out.push_str(key);
        out.push(':');
        match var.value() {
            Some(v) => {
                let v = v.borrow();
                let quote = quote_for(&v);
                out.push_str(quote);
                out.push_str(&render(&v, show_complex, printed)?);
                out.push_str(quote);
            }
            None => out.push_str("null"),
        }
        out.push(';');
    }
    for (_, fun) in scope.functions() {
        let fun = fun.borrow();
        out.push_str(&signature_string(
            &fun.name,
            &fun.params.iter().map(Param::ty).collect::<Vec<_>>(),
        ));
        out.push(';');
    }
    out.push('}');
    Ok(out)
}

/// Fixed six-digit rendering with trailing zeros stripped, keeping one
/// digit after the point.
pub fn format_float(f: f64) -> String {
    let mut s = format!("{:.6}", f);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

// ----------------------------------------------------------------------
// Type identity
// ----------------------------------------------------------------------

/// Stable identity of a type: the tag ordinal for primitives, a hash of the
/// qualified name for structs and classes.
pub fn type_id(ty: &TypeDef) -> i64 {
    if ty.is_struct() || ty.is_class() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        ty.qualified_name().hash(&mut hasher);
        hasher.finish() as i64
    } else {
        ty.tag.ordinal()
    }
}

fn operands_err(op: &str, lval: &Value, rval: &Value) -> RuntimeError {
    RuntimeError::invalid_operands(op, lval.type_name(), rval.type_name())
}

/// Keep division errors intact, replace generic type complaints with the
/// actual operand types.
fn refine_operands_err(err: RuntimeError, op: &str, lval: &Value, rval: &Value) -> RuntimeError {
    match err {
        RuntimeError::InvalidOperands { .. } => operands_err(op, lval, rval),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_arithmetic() {
        let r = binary_operation("+", &Value::int(2), &Value::int(3)).unwrap();
        assert_eq!(r.as_int(), Some(5));

        let r = binary_operation("%", &Value::int(7), &Value::int(3)).unwrap();
        assert_eq!(r.as_int(), Some(1));

        let r = binary_operation("**", &Value::int(2), &Value::int(10)).unwrap();
        assert_eq!(r.as_int(), Some(1024));
    }

    #[test]
    fn test_int_division_yields_float() {
        let r = binary_operation("/", &Value::int(7), &Value::int(2)).unwrap();
        assert_eq!(r.as_float(), Some(3.5));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            binary_operation("/", &Value::int(1), &Value::int(0)),
            Err(RuntimeError::DivisionByZero { .. })
        ));
        assert!(matches!(
            binary_operation("%", &Value::int(1), &Value::int(0)),
            Err(RuntimeError::DivisionByZero { .. })
        ));
        assert!(matches!(
            binary_operation("/%", &Value::int(1), &Value::int(0)),
            Err(RuntimeError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_mixed_numeric_widens() {
        let r = binary_operation("+", &Value::int(1), &Value::float(0.5)).unwrap();
        assert_eq!(r.as_float(), Some(1.5));
    }

    #[test]
    fn test_spaceship_is_sign() {
        for (l, r, expect) in [(1, 2, -1), (2, 2, 0), (3, 2, 1)] {
            let res = binary_operation("<=>", &Value::int(l), &Value::int(r)).unwrap();
            assert_eq!(res.as_int(), Some(expect));
        }
    }

    #[test]
    fn test_textual_concat() {
        let r = binary_operation("+", &Value::char('a'), &Value::char('b')).unwrap();
        assert_eq!(r.as_str(), Some("ab"));

        let r = binary_operation("+", &Value::string("x="), &Value::int(1)).unwrap();
        assert_eq!(r.as_str(), Some("x=1"));
    }

    #[test]
    fn test_bool_logic_rejects_non_bool() {
        assert!(binary_operation("and", &Value::bool(true), &Value::int(1)).is_err());
        let r = binary_operation("or", &Value::bool(false), &Value::bool(true)).unwrap();
        assert_eq!(r.as_bool(), Some(true));
    }

    #[test]
    fn test_null_comparison_on_tags() {
        let r = binary_operation("==", &Value::void(), &Value::void()).unwrap();
        assert_eq!(r.as_bool(), Some(true));
        let r = binary_operation("==", &Value::void(), &Value::int(1)).unwrap();
        assert_eq!(r.as_bool(), Some(false));
        let r = binary_operation("!=", &Value::void(), &Value::int(1)).unwrap();
        assert_eq!(r.as_bool(), Some(true));
    }

    #[test]
    fn test_unary() {
        assert_eq!(
            unary_operation("-", &Value::int(5)).unwrap().as_int(),
            Some(-5)
        );
        assert_eq!(
            unary_operation("not", &Value::bool(true)).unwrap().as_bool(),
            Some(false)
        );
        assert_eq!(
            unary_operation("++", &Value::int(1)).unwrap().as_int(),
            Some(2)
        );
        assert!(unary_operation("not", &Value::int(1)).is_err());
    }

    #[test]
    fn test_float_format() {
        assert_eq!(format_float(3.14), "3.14");
        assert_eq!(format_float(5.0), "5.0");
        assert_eq!(format_float(0.5), "0.5");
    }

    #[test]
    fn test_cast_string_to_int() {
        let r = type_parse(Tag::Int, &Value::string("42")).unwrap();
        assert_eq!(r.as_int(), Some(42));
        assert!(type_parse(Tag::Int, &Value::string("wat")).is_err());
    }

    #[test]
    fn test_coercions() {
        let c = coerced(&TypeDef::new(Tag::String), &Value::char('q')).unwrap();
        assert_eq!(c.as_str(), Some("q"));

        let c = coerced(&TypeDef::new(Tag::Float), &Value::int(3)).unwrap();
        assert_eq!(c.as_float(), Some(3.0));

        let c = coerced(&TypeDef::new(Tag::Int), &Value::float(3.9)).unwrap();
        assert_eq!(c.as_int(), Some(3));

        assert!(coerced(&TypeDef::new(Tag::Int), &Value::int(1)).is_none());
    }
}
