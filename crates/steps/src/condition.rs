//! Condition evaluation against structured data.
//!
//! All conditions in a sequence are ANDed and an empty sequence is `true`.
//! A condition whose field is absent from the data evaluates to `false`;
//! missing data is never an error. Evaluation is pure: the same conditions
//! against the same data always give the same answer.

use serde_json::Value;

use crate::model::{Condition, ConditionOperator};

/// Anything a dot-separated field path can be resolved against.
pub trait Lookup {
    fn lookup(&self, path: &str) -> Option<&Value>;
}

impl Lookup for Value {
    fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(self, path)
    }
}

/// Walk `path` (`a.b.0.c`) into `root`. Numeric segments index arrays.
/// An empty path returns the root itself.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(root);
    }

    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Evaluate every condition against `data`; `true` only if all hold.
pub fn evaluate_all<L: Lookup + ?Sized>(conditions: &[Condition], data: &L) -> bool {
    conditions.iter().all(|c| evaluate(c, data))
}

/// Evaluate a single condition.
pub fn evaluate<L: Lookup + ?Sized>(condition: &Condition, data: &L) -> bool {
    let Some(actual) = data.lookup(&condition.field) else {
        return false;
    };
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Exists => true,
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !values_equal(actual, expected),

        ConditionOperator::GreaterThan => compare(actual, expected, |a, b| a > b),
        ConditionOperator::GreaterThanOrEquals => compare(actual, expected, |a, b| a >= b),
        ConditionOperator::LessThan => compare(actual, expected, |a, b| a < b),
        ConditionOperator::LessThanOrEquals => compare(actual, expected, |a, b| a <= b),

        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !contains(actual, expected),
        ConditionOperator::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(s), Some(prefix)) => s.starts_with(prefix),
            _ => false,
        },
        ConditionOperator::EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(s), Some(suffix)) => s.ends_with(suffix),
            _ => false,
        },

        ConditionOperator::In => member_of(actual, expected),
        ConditionOperator::NotIn => expected.is_array() && !member_of(actual, expected),
    }
}

/// JSON equality, except that numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => expected.as_str().is_some_and(|needle| s.contains(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        _ => false,
    }
}

fn member_of(actual: &Value, expected: &Value) -> bool {
    expected
        .as_array()
        .is_some_and(|list| list.iter().any(|candidate| values_equal(actual, candidate)))
}
