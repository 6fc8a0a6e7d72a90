// quill-core - Property tests for value operations and type matching
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property suites over the operation rules and the type-match relation.

use proptest::prelude::*;

use quill_core::ops;
use quill_core::semantic::{self, Constant, SemanticValue};
use quill_core::value::Value;
use quill_syntax::types::{Tag, TypeDef};

fn scalar_tag() -> impl Strategy<Value = Tag> {
    prop_oneof![
        Just(Tag::Bool),
        Just(Tag::Int),
        Just(Tag::Float),
        Just(Tag::Char),
        Just(Tag::String),
    ]
}

fn type_def() -> impl Strategy<Value = TypeDef> {
    (scalar_tag(), proptest::collection::vec(0usize..4, 0..3)).prop_map(|(tag, dims)| {
        if dims.is_empty() {
            TypeDef::new(tag)
        } else {
            TypeDef::array(tag, dims)
        }
    })
}

proptest! {
    /// Every type definition matches itself, strictly.
    #[test]
    fn match_is_reflexive(ty in type_def()) {
        prop_assert!(ty.matches(&ty, true));
        prop_assert!(ty.is_any_or_match(&ty, true));
    }

    /// Matching is symmetric for arrays with equal tags and concrete
    /// shapes.
    #[test]
    fn array_match_is_symmetric_on_concrete_shapes(
        tag in scalar_tag(),
        dims in proptest::collection::vec(1usize..5, 1..3),
    ) {
        let a = TypeDef::array(tag, dims.clone());
        let b = TypeDef::array(tag, dims);
        prop_assert!(a.matches(&b, true));
        prop_assert!(b.matches(&a, true));
    }

    /// Binary operations on constants are deterministic across runs.
    #[test]
    fn int_operations_are_deterministic(a in -1000i64..1000, b in -1000i64..1000) {
        for op in ["+", "-", "*", "<=>", "==", "<"] {
            let first = ops::binary_operation(op, &Value::int(a), &Value::int(b)).unwrap();
            let second = ops::binary_operation(op, &Value::int(a), &Value::int(b)).unwrap();
            prop_assert!(ops::equals_value(&first, &second));
        }
    }

    /// Folding twice produces identical results, and folding agrees with
    /// the runtime operation.
    #[test]
    fn folding_is_stable(a in -1000i64..1000, b in 1i64..1000) {
        let lhs = SemanticValue::constant(TypeDef::new(Tag::Int), Constant::Int(a));
        let rhs = SemanticValue::constant(TypeDef::new(Tag::Int), Constant::Int(b));
        for op in ["+", "-", "*", "%", "<=>"] {
            let once = semantic::binary(op, &lhs, &rhs).unwrap();
            let twice = semantic::binary(op, &lhs, &rhs).unwrap();
            prop_assert_eq!(once.constant.clone(), twice.constant.clone());

            let runtime = ops::binary_operation(op, &Value::int(a), &Value::int(b)).unwrap();
            let folded = once.constant.expect("constants fold").to_value();
            prop_assert!(ops::equals_value(&runtime, &folded));
        }
    }

    /// Integer division by a non-zero divisor widens to float division.
    #[test]
    fn int_division_is_float_division(a in -1000i64..1000, b in 1i64..1000) {
        let result = ops::binary_operation("/", &Value::int(a), &Value::int(b)).unwrap();
        prop_assert_eq!(result.as_float(), Some(a as f64 / b as f64));
    }

    /// The spaceship returns exactly the sign, -1, 0 or 1.
    #[test]
    fn spaceship_is_sign(a in any::<i32>(), b in any::<i32>()) {
        let result = ops::binary_operation(
            "<=>",
            &Value::int(a as i64),
            &Value::int(b as i64),
        )
        .unwrap();
        let expected = match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        };
        prop_assert_eq!(result.as_int(), Some(expected));
    }

    /// Scalar equality is symmetric.
    #[test]
    fn scalar_equality_is_symmetric(a in -100i64..100, b in -100i64..100) {
        let l = Value::int(a);
        let r = Value::int(b);
        prop_assert_eq!(ops::equals_value(&l, &r), ops::equals_value(&r, &l));
    }

    /// Float formatting keeps one digit after the point.
    #[test]
    fn float_format_keeps_fraction_digit(f in -1.0e6f64..1.0e6) {
        let s = ops::format_float(f);
        let point = s.find('.').expect("rendered floats carry a point");
        prop_assert!(point + 1 < s.len());
    }
}
