//! Encoding-agnostic request decoding.
//!
//! Every supported [`EncodingMode`] reduces a raw HTTP request to the same
//! [`CanonicalMap`], which is then checked against the expected request
//! fields field by field.

pub mod xml;

use bytes::Bytes;
use hyper::Method;
use serde_json::Value;
use url::form_urlencoded;

use crate::compare::{compare_fields, plain_map, value_kind, CanonicalMap, Mismatch};
use crate::config::{EncodingMode, HarnessConfig, DEFAULT_XML_ROOT};
use crate::error::{DecodeError, DecodeResult};

/// A request as received by the mock endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    /// The request method.
    pub method: Method,
    /// The request path, without the query string.
    pub path: String,
    /// The raw query string, if any.
    pub query: Option<String>,
    /// The `Content-Type` header, if present and readable.
    pub content_type: Option<String>,
    /// The full request body.
    pub body: Bytes,
}

impl RawRequest {
    /// Create a request with no query string and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Set the raw query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the `Content-Type` header.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn query_bytes(&self) -> &[u8] {
        self.query.as_deref().unwrap_or_default().as_bytes()
    }

    /// The body as URL-encoded form data.
    ///
    /// Only POST, PUT and PATCH bodies count, and only when they are
    /// untyped or declared `application/x-www-form-urlencoded`. Anything
    /// else yields no form fields.
    fn form_bytes(&self) -> &[u8] {
        let method_has_form = matches!(self.method, Method::POST | Method::PUT | Method::PATCH);
        let typed_as_form = self.content_type.as_deref().map_or(true, |value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case(FORM_CONTENT_TYPE)
        });
        if method_has_form && typed_as_form {
            self.body.as_ref()
        } else {
            &[]
        }
    }
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Decodes requests according to one encoding mode.
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    mode: EncodingMode,
    xml_root: String,
    data_field: Option<String>,
}

impl RequestDecoder {
    /// Create a decoder with the default XML root and no data field.
    #[must_use]
    pub fn new(mode: EncodingMode) -> Self {
        Self {
            mode,
            xml_root: DEFAULT_XML_ROOT.to_string(),
            data_field: None,
        }
    }

    /// Create a decoder matching a harness configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            mode: config.resp_type,
            xml_root: config.xml_root().to_string(),
            data_field: config.data_field.clone(),
        }
    }

    /// Set the XML root key.
    #[must_use]
    pub fn with_xml_root(mut self, root: impl Into<String>) -> Self {
        self.xml_root = root.into();
        self
    }

    /// Set the field holding the nested payload.
    #[must_use]
    pub fn with_data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = Some(field.into());
        self
    }

    /// The configured mode.
    #[must_use]
    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    /// Decode a request into a canonical mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed, the nested payload or
    /// XML root is missing, or decoding yields no fields at all.
    pub fn decode(&self, request: &RawRequest) -> DecodeResult<CanonicalMap> {
        let map = match self.mode {
            EncodingMode::Query => first_values(request.query_bytes()),
            EncodingMode::Form => {
                // Body fields win; the query string only fills gaps
                let mut map = first_values(request.form_bytes());
                for (key, value) in first_values(request.query_bytes()) {
                    map.entry(key).or_insert(value);
                }
                map
            }
            EncodingMode::Json => json_object(&request.body)?,
            EncodingMode::Xml => {
                xml::descend_root(xml::parse_document(&request.body)?, &self.xml_root)?
            }
            EncodingMode::FormXml => {
                let payload = self.nested_payload(request.form_bytes())?;
                xml::descend_root(xml::parse_document(payload.as_bytes())?, &self.xml_root)?
            }
            EncodingMode::QueryJson => {
                let payload = self.nested_payload(request.query_bytes())?;
                json_object(payload.as_bytes())?
            }
        };

        if map.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(map)
    }

    /// Decode a request and compare it against the expected fields.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails; no comparison happens in that case.
    pub fn validate(
        &self,
        request: &RawRequest,
        want: &CanonicalMap,
    ) -> DecodeResult<Vec<Mismatch>> {
        let got = self.decode(request)?;
        Ok(compare_fields(want, &plain_map(&got)))
    }

    /// Pull the data field's first value out of a URL-encoded string.
    fn nested_payload(&self, encoded: &[u8]) -> DecodeResult<String> {
        let field = self.data_field.as_deref().unwrap_or_default();
        form_urlencoded::parse(encoded)
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| DecodeError::MissingDataField(field.to_string()))
    }
}

/// Parse URL-encoded pairs, keeping the first value of each key.
fn first_values(encoded: &[u8]) -> CanonicalMap {
    let mut map = CanonicalMap::new();
    for (key, value) in form_urlencoded::parse(encoded) {
        map.entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    map
}

fn json_object(payload: &[u8]) -> DecodeResult<CanonicalMap> {
    match serde_json::from_slice(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject {
            found: value_kind(&other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(body: &'static str) -> RawRequest {
        RawRequest::new(Method::POST, "/api").with_body(body)
    }

    fn get(query: &str) -> RawRequest {
        RawRequest::new(Method::GET, "/api").with_query(query)
    }

    /// Encode string fields the way a client would for each mode.
    fn encode(mode: EncodingMode, fields: &CanonicalMap) -> RawRequest {
        fn url_encoded(pairs: &[(&str, String)]) -> String {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in pairs {
                serializer.append_pair(key, value);
            }
            serializer.finish()
        }

        let strings: Vec<(&str, String)> = fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str().unwrap().to_string()))
            .collect();
        let escape = |text: &str| {
            text.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
        };
        let xml_doc = strings
            .iter()
            .fold(String::from("<xml>"), |doc, (key, value)| {
                format!("{doc}<{key}>{}</{key}>", escape(value.as_str()))
            })
            + "</xml>";
        let json_doc = Value::Object(fields.clone()).to_string();

        let request = RawRequest::new(Method::POST, "/api");
        match mode {
            EncodingMode::Query => request.with_query(url_encoded(&strings)),
            EncodingMode::Form => request.with_body(url_encoded(&strings)),
            EncodingMode::Json => request.with_body(json_doc),
            EncodingMode::Xml => request.with_body(xml_doc),
            EncodingMode::FormXml => request.with_body(url_encoded(&[("data", xml_doc)])),
            EncodingMode::QueryJson => request.with_query(url_encoded(&[("data", json_doc)])),
        }
    }

    #[test]
    fn test_every_mode_decodes_what_it_encodes() {
        let fields = json!({
            "appid": "wx8888888888888888",
            "body": "tea & cake <x2>",
            "notify_url": "https://example.com/notify?a=1&b=2",
            "total_fee": "1",
        });
        let fields = fields.as_object().unwrap();

        for mode in EncodingMode::ALL {
            let decoder = RequestDecoder::new(mode).with_data_field("data");
            let request = encode(mode, fields);
            let mismatches = decoder
                .validate(&request, fields)
                .unwrap_or_else(|e| panic!("{mode} failed to decode: {e}"));
            assert!(mismatches.is_empty(), "{mode}: {mismatches:?}");
        }
    }

    #[test]
    fn test_form_body_ignored_unless_typed_as_form() {
        let decoder = RequestDecoder::new(EncodingMode::Form);

        let json_body = post("a=1")
            .with_query("b=2")
            .with_content_type("application/json");
        let map = decoder.decode(&json_body).unwrap();
        assert_eq!(map, *json!({"b": "2"}).as_object().unwrap());

        let get_body = RawRequest::new(Method::GET, "/api")
            .with_query("b=2")
            .with_body("a=1");
        assert!(!decoder.decode(&get_body).unwrap().contains_key("a"));

        let form_body = post("a=1")
            .with_content_type("Application/X-WWW-Form-Urlencoded; charset=utf-8");
        assert_eq!(decoder.decode(&form_body).unwrap()["a"], "1");
    }

    #[test]
    fn test_form_xml_payload_needs_form_body() {
        let decoder = RequestDecoder::new(EncodingMode::FormXml).with_data_field("data");
        let request = post("data=%3Cxml%3E%3Ca%3E1%3C%2Fa%3E%3C%2Fxml%3E")
            .with_content_type("text/plain");
        assert!(matches!(
            decoder.decode(&request),
            Err(DecodeError::MissingDataField(field)) if field == "data"
        ));
    }

    #[test]
    fn test_non_utf8_xml_body() {
        let decoder = RequestDecoder::new(EncodingMode::Xml);
        let request = RawRequest::new(Method::POST, "/api")
            .with_body(Bytes::from_static(b"<xml>\xFF</xml>"));
        assert!(matches!(decoder.decode(&request), Err(DecodeError::Utf8(_))));
    }

    #[test]
    fn test_query_first_value_wins() {
        let decoder = RequestDecoder::new(EncodingMode::Query);
        let map = decoder.decode(&get("a=1&b=two%20words&a=2")).unwrap();
        assert_eq!(Value::Object(map), json!({"a": "1", "b": "two words"}));
    }

    #[test]
    fn test_query_without_parameters_is_empty() {
        let decoder = RequestDecoder::new(EncodingMode::Query);
        let request = RawRequest::new(Method::GET, "/api");
        assert!(matches!(decoder.decode(&request), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_form_body() {
        let decoder = RequestDecoder::new(EncodingMode::Form);
        let map = decoder.decode(&post("appid=wx1&fee=100&fee=200")).unwrap();
        assert_eq!(Value::Object(map), json!({"appid": "wx1", "fee": "100"}));
    }

    #[test]
    fn test_form_body_wins_over_query() {
        let decoder = RequestDecoder::new(EncodingMode::Form);
        let request = post("a=body").with_query("a=query&b=query");
        let map = decoder.decode(&request).unwrap();
        assert_eq!(Value::Object(map), json!({"a": "body", "b": "query"}));
    }

    #[test]
    fn test_json_body() {
        let decoder = RequestDecoder::new(EncodingMode::Json);
        let map = decoder
            .decode(&post(r#"{"id":"42","amount":{"total":1}}"#))
            .unwrap();
        assert_eq!(map["id"], json!("42"));
        assert_eq!(map["amount"], json!({"total": 1}));
    }

    #[test]
    fn test_json_failures() {
        let decoder = RequestDecoder::new(EncodingMode::Json);
        assert!(matches!(decoder.decode(&post("{")), Err(DecodeError::Json(_))));
        assert!(matches!(decoder.decode(&post("")), Err(DecodeError::Json(_))));
        assert!(matches!(
            decoder.decode(&post("[1]")),
            Err(DecodeError::NotAnObject { found: "sequence" })
        ));
        assert!(matches!(decoder.decode(&post("{}")), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_xml_body() {
        let decoder = RequestDecoder::new(EncodingMode::Xml);
        let map = decoder
            .decode(&post("<xml><status>OK</status></xml>"))
            .unwrap();
        assert_eq!(Value::Object(map), json!({"status": "OK"}));
    }

    #[test]
    fn test_xml_empty_root_is_failure() {
        let decoder = RequestDecoder::new(EncodingMode::Xml);
        assert!(matches!(
            decoder.decode(&post("<xml></xml>")),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_xml_custom_root() {
        let decoder = RequestDecoder::new(EncodingMode::Xml).with_xml_root("request");
        let map = decoder
            .decode(&post("<request><a>1</a></request>"))
            .unwrap();
        assert_eq!(map["a"], json!("1"));

        assert!(matches!(
            decoder.decode(&post("<xml><a>1</a></xml>")),
            Err(DecodeError::MissingRoot(_))
        ));
    }

    #[test]
    fn test_xml_scalar_root_is_reported() {
        let decoder = RequestDecoder::new(EncodingMode::Xml);
        assert!(matches!(
            decoder.decode(&post("<xml>plain</xml>")),
            Err(DecodeError::RootNotMapping { .. })
        ));
    }

    #[test]
    fn test_form_xml() {
        let decoder = RequestDecoder::new(EncodingMode::FormXml).with_data_field("biz_content");
        let request = post("biz_content=%3Cxml%3E%3Ccode%3E0%3C%2Fcode%3E%3C%2Fxml%3E");
        let map = decoder.decode(&request).unwrap();
        assert_eq!(Value::Object(map), json!({"code": "0"}));
    }

    #[test]
    fn test_form_xml_missing_field() {
        let decoder = RequestDecoder::new(EncodingMode::FormXml).with_data_field("biz_content");
        assert!(matches!(
            decoder.decode(&post("other=1")),
            Err(DecodeError::MissingDataField(field)) if field == "biz_content"
        ));
    }

    #[test]
    fn test_query_json() {
        let decoder = RequestDecoder::new(EncodingMode::QueryJson).with_data_field("biz_content");
        let request = get(
            "method=alipay.trade.pay&biz_content=%7B%22out_trade_no%22%3A%2220150320010101001%22%7D",
        );
        let map = decoder.decode(&request).unwrap();
        assert_eq!(
            Value::Object(map),
            json!({"out_trade_no": "20150320010101001"})
        );
    }

    #[test]
    fn test_query_json_not_an_object() {
        let decoder = RequestDecoder::new(EncodingMode::QueryJson).with_data_field("biz_content");
        assert!(matches!(
            decoder.decode(&get("biz_content=%22text%22")),
            Err(DecodeError::NotAnObject { found: "string" })
        ));
    }

    #[test]
    fn test_validate_ignores_unasserted_fields() {
        let decoder = RequestDecoder::new(EncodingMode::Json);
        let want = json!({"id": "42"});
        let mismatches = decoder
            .validate(
                &post(r#"{"id":"42","name":"alice"}"#),
                want.as_object().unwrap(),
            )
            .unwrap();
        assert!(mismatches.is_empty());
    }

    #[test]
    fn test_validate_reports_mismatches() {
        let decoder = RequestDecoder::new(EncodingMode::Query);
        let want = json!({"a": "1", "b": "2"});
        let mismatches = decoder
            .validate(&get("a=9&b=2"), want.as_object().unwrap())
            .unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, "a");
        assert_eq!(mismatches[0].actual, json!("9"));
    }

    #[test]
    fn test_from_config() {
        let mut config = HarnessConfig::new(EncodingMode::FormXml);
        config.xml_root = String::new();
        config.data_field = Some("req".to_string());

        let decoder = RequestDecoder::from_config(&config);
        assert_eq!(decoder.mode(), EncodingMode::FormXml);
        let map = decoder
            .decode(&post("req=%3Cxml%3E%3Ca%3E1%3C%2Fa%3E%3C%2Fxml%3E"))
            .unwrap();
        assert_eq!(map["a"], json!("1"));
    }
}
