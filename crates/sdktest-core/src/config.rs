//! Configuration types for the SDK test harness.
//!
//! A harness is configured once per test, either programmatically through
//! [`crate::HarnessBuilder`] or from a YAML document, and is read-only from
//! then on.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use crate::compare::{value_kind, CanonicalMap};
use crate::error::{ConfigError, ConfigResult};

/// Root key used when descending into a parsed XML document.
pub const DEFAULT_XML_ROOT: &str = "xml";

/// How the logical request payload is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum EncodingMode {
    /// URL query string; first value of each parameter.
    #[serde(rename = "query")]
    Query,
    /// URL-encoded body; first value of each field.
    #[serde(rename = "form")]
    Form,
    /// JSON object body.
    #[serde(rename = "json")]
    Json,
    /// XML body, descended into the root element.
    #[serde(rename = "xml")]
    Xml,
    /// URL-encoded body with one field holding an XML document.
    #[serde(rename = "formXML")]
    FormXml,
    /// Query string with one parameter holding a JSON object.
    #[serde(rename = "queryJSON")]
    QueryJson,
}

impl EncodingMode {
    /// All supported modes.
    pub const ALL: [EncodingMode; 6] = [
        Self::Query,
        Self::Form,
        Self::Json,
        Self::Xml,
        Self::FormXml,
        Self::QueryJson,
    ];

    /// The configuration name of this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Form => "form",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::FormXml => "formXML",
            Self::QueryJson => "queryJSON",
        }
    }

    /// Check if the payload is nested inside a named form field or query parameter.
    #[must_use]
    pub fn requires_data_field(&self) -> bool {
        matches!(self, Self::FormXml | Self::QueryJson)
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

/// Configuration for one harness instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Decode rule applied to every request hitting the endpoint.
    pub resp_type: EncodingMode,

    /// Root element to descend into for XML payloads.
    #[serde(default = "default_xml_root")]
    pub xml_root: String,

    /// Form field or query parameter holding the nested payload
    /// (`formXML` / `queryJSON` only).
    #[serde(default)]
    pub data_field: Option<String>,

    /// Canned response body, written verbatim for every matching request.
    #[serde(default, with = "body_text")]
    pub resp_data: Bytes,

    /// Expected request fields. `None` skips request validation.
    #[serde(default)]
    pub req_want: Option<CanonicalMap>,

    /// Expected response fields. `None` skips response validation.
    #[serde(default)]
    pub resp_want: Option<CanonicalMap>,

    /// Path the endpoint is registered under. A trailing `/` matches the subtree.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Address the mock server binds to.
    #[serde(default = "default_listen_address")]
    pub listen: String,

    /// Logging configuration (used by the standalone runner).
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

// Default value functions

fn default_xml_root() -> String {
    DEFAULT_XML_ROOT.to_string()
}

fn default_uri() -> String {
    "/".to_string()
}

fn default_listen_address() -> String {
    "127.0.0.1:0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Canned bodies are written as plain text in YAML.
mod body_text {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        String::deserialize(deserializer).map(Bytes::from)
    }
}

// Configuration loading and validation

impl HarnessConfig {
    /// Create a configuration for the given mode with every other field defaulted.
    #[must_use]
    pub fn new(resp_type: EncodingMode) -> Self {
        Self {
            resp_type,
            xml_root: default_xml_root(),
            data_field: None,
            resp_data: Bytes::new(),
            req_want: None,
            resp_want: None,
            uri: default_uri(),
            listen: default_listen_address(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the mode nests its payload and `data_field` is unset or empty
    /// - `uri` is not an absolute path
    /// - `listen` is not a socket address
    pub fn validate(&self) -> ConfigResult<()> {
        if self.resp_type.requires_data_field()
            && self.data_field.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingDataField {
                mode: self.resp_type.as_str(),
            });
        }

        if !self.uri.starts_with('/') {
            return Err(ConfigError::InvalidUri(self.uri.clone()));
        }

        self.listen_addr()?;
        Ok(())
    }

    /// The XML root key, falling back to `"xml"` when blank.
    #[must_use]
    pub fn xml_root(&self) -> &str {
        if self.xml_root.is_empty() {
            DEFAULT_XML_ROOT
        } else {
            &self.xml_root
        }
    }

    /// Parse the listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn listen_addr(&self) -> ConfigResult<SocketAddr> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.listen.clone()))
    }
}

/// Convert author-supplied expected data into a canonical mapping.
///
/// # Errors
///
/// Returns an error if the value is not a JSON object.
pub fn expect_mapping(
    field: &'static str,
    value: serde_json::Value,
) -> ConfigResult<CanonicalMap> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ConfigError::NotAMapping {
            field,
            found: value_kind(&other),
        }),
    }
}
