//! Permissive conversions between values.
//!
//! Every operator and comparison directive goes through these functions, so the
//! conversion rules live in exactly one place.
use std::cmp::Ordering;

use itertools::Itertools;
use smallvec::SmallVec;

use crate::{
    Shared,
    number::{self, Number},
    value::Value,
};

/// Truthiness: absent, null, `false`, `0`, `NaN` and `""` are false.
/// Every container and function is true, even when empty.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::None | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => !(n.is_zero() || n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
    }
}

pub fn to_number(value: &Value) -> Number {
    match value {
        Value::None => number::NAN,
        Value::Null => number::ZERO,
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => *n,
        Value::String(s) => Number::parse(s),
        Value::Array(_) => Number::parse(&to_string(value)),
        Value::Object(_) | Value::Function(_) => number::NAN,
    }
}

/// Textual form of a value. Array items are joined with commas, with null
/// and absent items rendered empty.
pub fn to_string(value: &Value) -> String {
    let mut seen = SmallVec::new();
    to_string_inner(value, &mut seen)
}

fn to_string_inner(value: &Value, seen: &mut SmallVec<[*const (); 8]>) -> String {
    match value {
        Value::None => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let ptr = Shared::as_ptr(items) as *const ();
            if seen.contains(&ptr) {
                return String::new();
            }

            seen.push(ptr);
            let items = items.borrow().clone();
            let joined = items
                .iter()
                .map(|item| match item {
                    Value::None | Value::Null => String::new(),
                    _ => to_string_inner(item, seen),
                })
                .join(",");
            seen.pop();
            joined
        }
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(_) => "function".to_string(),
    }
}

/// Property key form of a value: strings and numbers are kept, everything
/// else becomes its string form.
pub fn to_key(value: &Value) -> Value {
    match value {
        Value::String(_) | Value::Number(_) => value.clone(),
        _ => Value::String(to_string(value)),
    }
}

/// Primitive form used by loose equality and ordering. Containers become strings.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) => Value::String(to_string(value)),
        _ => value.clone(),
    }
}

/// Identity for containers and functions, value equality for everything else.
/// `NaN` is never equal to itself.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => a.ptr_eq(b),
    }
}

/// Equality after type coercion.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None | Value::Null, Value::None | Value::Null) => true,
        (Value::None | Value::Null, _) | (_, Value::None | Value::Null) => false,
        (Value::Number(x), Value::String(_)) => *x == to_number(b),
        (Value::String(_), Value::Number(y)) => to_number(a) == *y,
        (Value::Bool(_), _) => loose_eq(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => loose_eq(a, &Value::Number(to_number(b))),
        (Value::Array(_) | Value::Object(_) | Value::Function(_), Value::Array(_) | Value::Object(_) | Value::Function(_)) => {
            a.ptr_eq(b)
        }
        (Value::Array(_) | Value::Object(_) | Value::Function(_), _) => loose_eq(&to_primitive(a), b),
        (_, Value::Array(_) | Value::Object(_) | Value::Function(_)) => loose_eq(a, &to_primitive(b)),
        _ => strict_eq(a, b),
    }
}

/// Relational ordering. Two strings compare lexicographically, anything else
/// compares numerically. Returns `None` when either side is `NaN`.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (to_primitive(a), to_primitive(b)) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(&y)),
        (x, y) => to_number(&x).partial_cmp(&to_number(&y)),
    }
}

pub fn less_than(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Less))
}

pub fn less_or_equal(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal))
}

pub fn greater_than(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Greater))
}

pub fn greater_or_equal(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::none(Value::None, false)]
    #[case::null(Value::Null, false)]
    #[case::zero(Value::from(0), false)]
    #[case::nan(Value::from(f64::NAN), false)]
    #[case::empty_string(Value::from(""), false)]
    #[case::text(Value::from("0"), true)]
    #[case::empty_array(Value::array(vec![]), true)]
    #[case::empty_object(Value::empty_object(), true)]
    fn test_to_boolean(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(to_boolean(&value), expected);
    }

    #[rstest]
    #[case::null(Value::Null, 0.0)]
    #[case::boolean(Value::Bool(true), 1.0)]
    #[case::numeric_string(Value::from("17"), 17.0)]
    #[case::empty_array(Value::array(vec![]), 0.0)]
    #[case::single_item_array(Value::from(json!([5])), 5.0)]
    fn test_to_number(#[case] value: Value, #[case] expected: f64) {
        assert_eq!(to_number(&value), Number::new(expected));
    }

    #[rstest]
    #[case::none(Value::None)]
    #[case::object(Value::empty_object())]
    #[case::word(Value::from("abc"))]
    #[case::pair(Value::from(json!([1, 2])))]
    fn test_to_number_nan(#[case] value: Value) {
        assert!(to_number(&value).is_nan());
    }

    #[rstest]
    #[case::array(Value::from(json!([1, null, "a", [2, 3]])), "1,,a,2,3")]
    #[case::object(Value::from(json!({"a": 1})), "[object Object]")]
    #[case::fraction(Value::from(1.5), "1.5")]
    fn test_to_string(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(to_string(&value), expected);
    }

    #[test]
    fn test_to_string_skips_cycles() {
        let value = Value::from(json!([1]));
        if let Value::Array(items) = &value {
            items.borrow_mut().push(value.clone());
        }
        assert_eq!(to_string(&value), "1,");
    }

    #[rstest]
    #[case::string(Value::from("a"), Value::from("a"))]
    #[case::number(Value::from(2), Value::from(2))]
    #[case::boolean(Value::Bool(true), Value::from("true"))]
    #[case::null(Value::Null, Value::from("null"))]
    fn test_to_key(#[case] value: Value, #[case] expected: Value) {
        assert_eq!(to_key(&value), expected);
    }

    #[rstest]
    #[case::number_string(Value::from(1), Value::from("1"), true)]
    #[case::bool_number(Value::Bool(true), Value::from(1), true)]
    #[case::null_none(Value::Null, Value::None, true)]
    #[case::null_zero(Value::Null, Value::from(0), false)]
    #[case::array_string(Value::from(json!([1, 2])), Value::from("1,2"), true)]
    #[case::distinct_arrays(Value::from(json!([1])), Value::from(json!([1])), false)]
    #[case::nan(Value::from(f64::NAN), Value::from(f64::NAN), false)]
    fn test_loose_eq(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(loose_eq(&a, &b), expected);
    }

    #[test]
    fn test_strict_eq_uses_identity_for_containers() {
        let list = Value::from(json!([1]));
        assert!(strict_eq(&list, &list.clone()));
        assert!(!strict_eq(&list, &Value::from(json!([1]))));
        assert!(!strict_eq(&Value::from(1), &Value::from("1")));
    }

    #[rstest]
    #[case::numbers(Value::from(1), Value::from(2), Some(Ordering::Less))]
    #[case::strings(Value::from("b"), Value::from("a"), Some(Ordering::Greater))]
    #[case::numeric_strings(Value::from("10"), Value::from("9"), Some(Ordering::Less))]
    #[case::mixed(Value::from("10"), Value::from(9), Some(Ordering::Greater))]
    #[case::null_is_zero(Value::Null, Value::from(0), Some(Ordering::Equal))]
    #[case::nan(Value::None, Value::from(0), None)]
    fn test_compare(#[case] a: Value, #[case] b: Value, #[case] expected: Option<Ordering>) {
        assert_eq!(compare(&a, &b), expected);
    }

    #[test]
    fn test_relational_helpers() {
        assert!(less_than(&Value::from(1), &Value::from(2)));
        assert!(less_or_equal(&Value::from(2), &Value::from(2)));
        assert!(greater_than(&Value::from(3), &Value::from(2)));
        assert!(greater_or_equal(&Value::from(2), &Value::from(2)));
        assert!(!less_or_equal(&Value::None, &Value::None));
    }
}
