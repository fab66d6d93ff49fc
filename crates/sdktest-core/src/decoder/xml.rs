//! XML document to generic tree conversion.
//!
//! Produces JSON-shaped values so XML payloads land in the same canonical
//! model as every other encoding:
//!
//! - an element holding only text becomes a string (never a number)
//! - an element with children or attributes becomes a mapping
//! - repeated sibling elements become a sequence
//! - attributes are keyed `-name`; text next to attributes or children is keyed `#text`
//! - an element with nothing inside becomes the empty string

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::fmt::Display;

use crate::compare::{value_kind, CanonicalMap};
use crate::error::{DecodeError, DecodeResult};

const ATTRIBUTE_PREFIX: char = '-';
const TEXT_KEY: &str = "#text";

/// An element whose end tag has not been read yet.
struct OpenElement {
    name: String,
    attributes: CanonicalMap,
    children: CanonicalMap,
    text: String,
}

impl OpenElement {
    fn new(start: &BytesStart<'_>) -> DecodeResult<Self> {
        let mut attributes = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref());
            let value = attribute.unescape_value().map_err(xml_error)?;
            attributes.insert(
                format!("{ATTRIBUTE_PREFIX}{key}"),
                Value::String(value.into_owned()),
            );
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn into_value(self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text);
        }

        let mut map = self.attributes;
        for (name, child) in self.children {
            map.insert(name, child);
        }
        if !self.text.trim().is_empty() {
            map.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(map)
    }
}

/// Parse an XML document into `{root_name: tree}`.
///
/// # Errors
///
/// Returns [`DecodeError::Xml`] for malformed documents and documents
/// without a root element.
pub fn parse_document(input: &[u8]) -> DecodeResult<CanonicalMap> {
    let text = std::str::from_utf8(input)?;
    let mut reader = Reader::from_str(text);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut document = Map::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(OpenElement::new(&start)?),
            Event::Empty(start) => {
                let element = OpenElement::new(&start)?;
                close_element(&mut stack, &mut document, element);
            }
            Event::End(_) => {
                // quick-xml already verified the end tag matches
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_error("unexpected end tag"))?;
                close_element(&mut stack, &mut document, element);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let data = data.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&data))?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes carry no data
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(xml_error(format!("unclosed element <{}>", open.name)));
    }
    if document.is_empty() {
        return Err(xml_error("document has no root element"));
    }
    Ok(document)
}

/// Descend into the root element of a parsed document.
///
/// An empty root yields an empty mapping; the caller treats that as a failed
/// decode.
///
/// # Errors
///
/// Returns an error if the root is absent or holds a non-empty scalar or a
/// sequence.
pub fn descend_root(mut document: CanonicalMap, root: &str) -> DecodeResult<CanonicalMap> {
    match document.remove(root) {
        None => Err(DecodeError::MissingRoot(root.to_string())),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(other) => Err(DecodeError::RootNotMapping {
            root: root.to_string(),
            found: value_kind(&other),
        }),
    }
}

fn close_element(stack: &mut [OpenElement], document: &mut CanonicalMap, element: OpenElement) {
    let name = element.name.clone();
    let value = element.into_value();
    match stack.last_mut() {
        Some(parent) => insert_child(&mut parent.children, name, value),
        None => insert_child(document, name, value),
    }
}

fn append_text(stack: &mut [OpenElement], text: &str) -> DecodeResult<()> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(xml_error("text outside of the root element")),
    }
}

/// Insert a child, turning repeated names into a sequence.
fn insert_child(children: &mut CanonicalMap, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

fn xml_error(error: impl Display) -> DecodeError {
    DecodeError::Xml {
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: &str) -> Value {
        Value::Object(parse_document(input.as_bytes()).unwrap())
    }

    #[test]
    fn test_text_elements_stay_strings() {
        assert_eq!(
            parse("<xml><code>0</code><total_fee>100</total_fee></xml>"),
            json!({"xml": {"code": "0", "total_fee": "100"}})
        );
    }

    #[test]
    fn test_whitespace_between_elements_ignored() {
        let doc = "<?xml version=\"1.0\"?>\n<xml>\n  <a>1</a>\n  <!-- note -->\n  <b>2</b>\n</xml>\n";
        assert_eq!(parse(doc), json!({"xml": {"a": "1", "b": "2"}}));
    }

    #[test]
    fn test_cdata_is_text() {
        assert_eq!(
            parse("<xml><return_msg><![CDATA[OK & done]]></return_msg></xml>"),
            json!({"xml": {"return_msg": "OK & done"}})
        );
    }

    #[test]
    fn test_entities_unescaped() {
        assert_eq!(
            parse("<xml><q>a &lt; b</q></xml>"),
            json!({"xml": {"q": "a < b"}})
        );
    }

    #[test]
    fn test_repeated_elements_become_sequence() {
        assert_eq!(
            parse("<xml><item>a</item><item>b</item><item>c</item></xml>"),
            json!({"xml": {"item": ["a", "b", "c"]}})
        );
    }

    #[test]
    fn test_attributes_and_text() {
        assert_eq!(
            parse(r#"<xml><fee currency="CNY">100</fee><flag on="1"/></xml>"#),
            json!({"xml": {
                "fee": {"-currency": "CNY", "#text": "100"},
                "flag": {"-on": "1"}
            }})
        );
    }

    #[test]
    fn test_empty_elements() {
        assert_eq!(
            parse("<xml><a></a><b/></xml>"),
            json!({"xml": {"a": "", "b": ""}})
        );
    }

    #[test]
    fn test_malformed_documents() {
        for input in ["", "   ", "<xml><a>1</b></xml>", "<xml><a>1</a>", "just text"] {
            let result = parse_document(input.as_bytes());
            assert!(
                matches!(result, Err(DecodeError::Xml { .. })),
                "{input:?} should fail, got {result:?}"
            );
        }
    }

    #[test]
    fn test_descend_root() {
        let doc = parse_document(b"<xml><status>OK</status></xml>").unwrap();
        let map = descend_root(doc, "xml").unwrap();
        assert_eq!(map["status"], json!("OK"));
    }

    #[test]
    fn test_descend_missing_root() {
        let doc = parse_document(b"<response><a>1</a></response>").unwrap();
        assert!(matches!(
            descend_root(doc, "xml"),
            Err(DecodeError::MissingRoot(root)) if root == "xml"
        ));
    }

    #[test]
    fn test_descend_scalar_root() {
        let doc = parse_document(b"<xml>hello</xml>").unwrap();
        assert!(matches!(
            descend_root(doc, "xml"),
            Err(DecodeError::RootNotMapping { found: "string", .. })
        ));
    }

    #[test]
    fn test_descend_empty_root() {
        let doc = parse_document(b"<xml></xml>").unwrap();
        assert!(descend_root(doc, "xml").unwrap().is_empty());
    }
}
