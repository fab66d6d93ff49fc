//! Canonical value model shared by the decoder, the flattener and the comparator.
//!
//! Decoded requests are plain JSON-shaped data. Response fields may carry
//! extra renderings (a money type that prints as `"9.99"`, an enum that knows
//! its integer code) which the comparator falls back to when the raw value
//! does not match.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field name to untyped value. Both decoded requests and expected data use this.
pub type CanonicalMap = Map<String, Value>;

/// Field name to actual value, as produced by flattening a response.
pub type FlatMap = BTreeMap<String, FieldValue>;

/// Reserved key of a map that wraps its payload.
pub const NESTED_VALUE_KEY: &str = "Value";

/// A value that knows how to render itself as a string.
pub trait RenderString {
    fn render_string(&self) -> String;
}

/// A value that knows its underlying integer.
pub trait RenderInt {
    fn render_int(&self) -> i64;
}

/// An actual value handed to the comparator.
///
/// Carries the raw value used for the deep-equality pass plus whichever
/// renderings the originating type offers.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    raw: Value,
    rendered: Option<String>,
    int: Option<i64>,
}

/// The capability a [`FieldValue`] exposes, in comparator precedence order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capability<'a> {
    /// Compare against the string rendering.
    Stringable(&'a str),
    /// Compare against the entry under [`NESTED_VALUE_KEY`].
    NestedValue(&'a Value),
    /// Compare against the integer rendering.
    IntConvertible(i64),
    /// Nothing beyond the raw value.
    Plain,
}

impl FieldValue {
    /// A value with no renderings.
    pub fn plain(raw: impl Into<Value>) -> Self {
        Self {
            raw: raw.into(),
            rendered: None,
            int: None,
        }
    }

    /// A value whose type renders itself as a string.
    pub fn stringable<T: RenderString + ?Sized>(raw: impl Into<Value>, value: &T) -> Self {
        Self::plain(raw).with_string(value.render_string())
    }

    /// A value whose type converts to an integer.
    pub fn int_convertible<T: RenderInt + ?Sized>(raw: impl Into<Value>, value: &T) -> Self {
        Self::plain(raw).with_int(value.render_int())
    }

    /// Attach a string rendering.
    #[must_use]
    pub fn with_string(mut self, rendered: impl Into<String>) -> Self {
        self.rendered = Some(rendered.into());
        self
    }

    /// Attach an integer rendering.
    #[must_use]
    pub fn with_int(mut self, int: i64) -> Self {
        self.int = Some(int);
        self
    }

    /// The raw value.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Consume into the raw value.
    #[must_use]
    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// The highest-precedence capability this value exposes.
    ///
    /// String rendering wins over a nested `"Value"` entry, which wins over
    /// integer rendering.
    #[must_use]
    pub fn capability(&self) -> Capability<'_> {
        if let Some(rendered) = &self.rendered {
            return Capability::Stringable(rendered);
        }
        if let Value::Object(map) = &self.raw {
            if let Some(inner) = map.get(NESTED_VALUE_KEY) {
                return Capability::NestedValue(inner);
            }
        }
        match self.int {
            Some(int) => Capability::IntConvertible(int),
            None => Capability::Plain,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(raw: Value) -> Self {
        Self::plain(raw)
    }
}

/// Lift a decoded request into comparator input.
#[must_use]
pub fn plain_map(map: &CanonicalMap) -> FlatMap {
    map.iter()
        .map(|(key, value)| (key.clone(), FieldValue::plain(value.clone())))
        .collect()
}

/// Short name of a value's shape, for error messages.
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Code(i64);

    impl RenderString for Code {
        fn render_string(&self) -> String {
            format!("C{}", self.0)
        }
    }

    impl RenderInt for Code {
        fn render_int(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_plain_has_no_capability() {
        assert_eq!(FieldValue::plain("x").capability(), Capability::Plain);
        assert_eq!(FieldValue::plain(json!({"a": 1})).capability(), Capability::Plain);
    }

    #[test]
    fn test_string_rendering_wins() {
        let value = FieldValue::stringable(json!({"Value": 7}), &Code(7)).with_int(7);
        assert_eq!(value.capability(), Capability::Stringable("C7"));
    }

    #[test]
    fn test_nested_value_before_int() {
        let value = FieldValue::int_convertible(json!({"Value": "seven"}), &Code(7));
        assert_eq!(value.capability(), Capability::NestedValue(&json!("seven")));
    }

    #[test]
    fn test_int_rendering() {
        let value = FieldValue::int_convertible(json!("SEVEN"), &Code(7));
        assert_eq!(value.capability(), Capability::IntConvertible(7));
        assert_eq!(value.raw(), &json!("SEVEN"));
    }

    #[test]
    fn test_plain_map_lifts_every_entry() {
        let map = json!({"a": "1", "b": [1, 2]});
        let flat = plain_map(map.as_object().unwrap());
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["b"], FieldValue::plain(json!([1, 2])));
    }
}
