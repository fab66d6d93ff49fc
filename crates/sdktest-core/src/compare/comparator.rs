//! Field-by-field comparison of expected data against actual values.
//!
//! A field matches when its raw value is deeply equal to the expectation.
//! Failing that, the comparator consults the single highest-precedence
//! [`Capability`] of the actual value; there is no further fallback.

use serde_json::Value;
use std::fmt;

use super::value::{CanonicalMap, Capability, FieldValue, FlatMap};

/// One field whose actual value did not match the expectation.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// The field name.
    pub field: String,
    /// What the test author asserted.
    pub expected: Value,
    /// The raw actual value (`null` when the field was absent).
    pub actual: Value,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} want {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Decide whether `actual` satisfies `expected`.
#[must_use]
pub fn values_match(expected: &Value, actual: &FieldValue) -> bool {
    if expected == actual.raw() {
        return true;
    }

    match actual.capability() {
        Capability::Stringable(rendered) => expected.as_str() == Some(rendered),
        Capability::NestedValue(inner) => expected == inner,
        Capability::IntConvertible(int) => *expected == Value::from(int),
        Capability::Plain => false,
    }
}

/// Compare every expected field against the actual values.
///
/// Only the expected keys are checked; extra actual fields are ignored.
/// Every mismatch is returned, in expected-key order.
#[must_use]
pub fn compare_fields(want: &CanonicalMap, got: &FlatMap) -> Vec<Mismatch> {
    let missing = FieldValue::plain(Value::Null);

    want.iter()
        .filter_map(|(field, expected)| {
            let actual = got.get(field).unwrap_or(&missing);
            if values_match(expected, actual) {
                None
            } else {
                Some(Mismatch {
                    field: field.clone(),
                    expected: expected.clone(),
                    actual: actual.raw().clone(),
                })
            }
        })
        .collect()
}
