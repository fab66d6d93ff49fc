//! Reduce a response object to a flat field-name-to-value mapping.
//!
//! Response types describe themselves through [`Fields`]. Members of an
//! embedded record are hoisted to the top level, one level deep; anything
//! embedded below that stays a single opaque entry.

use serde::Serialize;
use serde_json::Value;

use super::value::{value_kind, CanonicalMap, FieldValue, FlatMap};
use crate::error::{FlattenError, FlattenResult};

/// A direct member of a response record.
pub enum Member<'a> {
    /// A field value.
    Value(FieldValue),
    /// A composed record whose members belong to the parent.
    Embedded(&'a dyn Fields),
}

impl<'a> Member<'a> {
    /// A plain field value.
    pub fn value(raw: impl Into<Value>) -> Self {
        Self::Value(FieldValue::plain(raw))
    }

    /// An embedded record.
    pub fn embedded(record: &'a dyn Fields) -> Self {
        Self::Embedded(record)
    }
}

impl From<FieldValue> for Member<'_> {
    fn from(value: FieldValue) -> Self {
        Self::Value(value)
    }
}

/// Enumerate the direct members of a response record.
pub trait Fields {
    fn fields(&self) -> Vec<(String, Member<'_>)>;
}

/// Flatten a response record.
///
/// # Errors
///
/// Returns an error if the record has no members or hoisting produces a
/// duplicate name.
pub fn flatten(record: &dyn Fields) -> FlattenResult<FlatMap> {
    let members = record.fields();
    if members.is_empty() {
        return Err(FlattenError::NoFields);
    }

    let mut flat = FlatMap::new();
    for (name, member) in members {
        match member {
            Member::Value(value) => insert_unique(&mut flat, name, value)?,
            Member::Embedded(embedded) => {
                for (inner_name, inner) in embedded.fields() {
                    let value = match inner {
                        Member::Value(value) => value,
                        Member::Embedded(deeper) => FieldValue::plain(render_record(deeper)),
                    };
                    insert_unique(&mut flat, inner_name, value)?;
                }
            }
        }
    }

    Ok(flat)
}

/// Flatten any serializable response via its JSON form.
///
/// Every top-level member becomes a plain value; `#[serde(flatten)]` already
/// hoists embedded structs during serialization.
///
/// # Errors
///
/// Returns an error if serialization fails, or the value does not serialize
/// to a non-empty JSON object.
pub fn flatten_serialized<T: Serialize + ?Sized>(response: &T) -> FlattenResult<FlatMap> {
    let value =
        serde_json::to_value(response).map_err(|e| FlattenError::Serialize(e.to_string()))?;

    match value {
        Value::Object(map) if map.is_empty() => Err(FlattenError::NoFields),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, FieldValue::plain(value)))
            .collect()),
        other => Err(FlattenError::NotARecord {
            found: value_kind(&other),
        }),
    }
}

fn insert_unique(flat: &mut FlatMap, name: String, value: FieldValue) -> FlattenResult<()> {
    if flat.contains_key(&name) {
        return Err(FlattenError::DuplicateField(name));
    }
    flat.insert(name, value);
    Ok(())
}

/// Render a record as a nested mapping of raw values, without hoisting.
fn render_record(record: &dyn Fields) -> Value {
    let map: CanonicalMap = record
        .fields()
        .into_iter()
        .map(|(name, member)| {
            let value = match member {
                Member::Value(value) => value.into_raw(),
                Member::Embedded(inner) => render_record(inner),
            };
            (name, value)
        })
        .collect();
    Value::Object(map)
}
