//! Domain error types for the SDK test harness.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

use crate::report::Report;

/// Errors related to harness configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The encoding mode name is not one of the supported modes.
    #[error("unknown encoding mode '{0}' (expected one of query, form, json, xml, formXML, queryJSON)")]
    UnknownMode(String),

    /// Modes that nest a payload inside an outer field need to know which field.
    #[error("encoding mode {mode} requires data_field to be set")]
    MissingDataField { mode: &'static str },

    /// The endpoint path must be absolute.
    #[error("endpoint uri must start with '/', got '{0}'")]
    InvalidUri(String),

    /// Invalid listen address format.
    #[error("invalid listen address: {0} (expected 'host:port')")]
    InvalidAddress(String),

    /// Expected field data must be a key-value mapping.
    #[error("{field} must be a mapping, got {found}")]
    NotAMapping {
        field: &'static str,
        found: &'static str,
    },

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Errors raised while turning a raw request into a canonical mapping.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload had to be text but was not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Malformed JSON payload.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed XML payload.
    #[error("invalid XML payload: {message}")]
    Xml { message: String },

    /// The JSON payload parsed, but is not an object.
    #[error("JSON payload is not an object, got {found}")]
    NotAnObject { found: &'static str },

    /// The field carrying the nested payload is absent.
    #[error("data field '{0}' not found in request")]
    MissingDataField(String),

    /// The configured XML root element is absent.
    #[error("root element '{0}' not found in XML payload")]
    MissingRoot(String),

    /// The XML root element holds something other than child elements.
    #[error("root element '{root}' does not hold a mapping, got {found}")]
    RootNotMapping { root: String, found: &'static str },

    /// The payload parsed but produced no fields.
    #[error("decoded request is empty")]
    Empty,
}

/// Errors raised while flattening a response object into a canonical mapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlattenError {
    /// The response does not describe a record with named members.
    #[error("response is not a record, got {found}")]
    NotARecord { found: &'static str },

    /// The response enumerated no members at all.
    #[error("response exposes no fields")]
    NoFields,

    /// Hoisting an embedded record produced a name that is already taken.
    #[error("field '{0}' appears more than once after flattening")]
    DuplicateField(String),

    /// The response could not be serialized for inspection.
    #[error("failed to serialize response: {0}")]
    Serialize(String),
}

/// Errors surfaced by the harness itself.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Binding or serving the mock endpoint failed.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    /// The harness configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The response object could not be flattened; no comparison is possible.
    #[error("response flattening failed: {0}")]
    Flatten(#[from] FlattenError),

    /// The harness was already closed.
    #[error("harness is closed")]
    Closed,

    /// The harness closed with recorded failures.
    #[error("sdk test failed: {0}")]
    Failed(Report),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for request decoding.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result type alias for response flattening.
pub type FlattenResult<T> = std::result::Result<T, FlattenError>;
