//! Value comparison for request and response validation.
//!
//! - [`value`] - The canonical mapping and the capability-bearing [`FieldValue`]
//! - [`comparator`] - Field-by-field comparison with capability dispatch
//! - [`flatten`](mod@flatten) - Reducing response objects to a [`FlatMap`]

pub mod comparator;
pub mod flatten;
pub mod value;

pub use comparator::{compare_fields, values_match, Mismatch};
pub use flatten::{flatten, flatten_serialized, Fields, Member};
pub use value::{
    plain_map, value_kind, CanonicalMap, Capability, FieldValue, FlatMap, RenderInt, RenderString,
    NESTED_VALUE_KEY,
};
