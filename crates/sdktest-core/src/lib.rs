//! SDK Test Harness Core Library
//!
//! Stands up a local mock HTTP endpoint for an SDK under test, decodes the
//! requests the SDK sends across several wire encodings, and validates both
//! the outbound request and the SDK's parsed response against key-value data
//! supplied by the test author.
//!
//! # Architecture
//!
//! - [`config`] - Harness configuration, YAML loading and validation
//! - [`error`] - Domain-specific error types
//! - [`compare`] - Capability-aware value comparison and response flattening
//! - [`decoder`] - Encoding-agnostic request decoding
//! - [`server`] - The hyper-backed mock endpoint and its request log
//! - [`harness`] - [`MockHarness`], tying the pieces together for one test
//! - [`report`] - Recorded failures and the end-of-test report
//!
//! # Example
//!
//! ```rust,ignore
//! use sdktest_core::{EncodingMode, HarnessBuilder};
//! use serde_json::json;
//!
//! let mut harness = HarnessBuilder::new(EncodingMode::Json)
//!     .uri("/v1/pay")
//!     .resp_data(r#"{"code":"0","amount":999}"#)
//!     .req_want(json!({"id": "42"}))
//!     .resp_want(json!({"Amount": "9.99"}))
//!     .start()
//!     .await?;
//!
//! let resp = my_sdk::Client::new(harness.url()).pay("42").await?;
//! harness.validate_response(&resp)?;
//! harness.close()?;
//! harness.assert_clean();
//! ```

#![forbid(unsafe_code)]

pub mod compare;
pub mod config;
pub mod decoder;
pub mod error;
pub mod harness;
pub mod report;
pub mod server;

// Re-export commonly used types
pub use compare::{
    flatten, flatten_serialized, CanonicalMap, FieldValue, Fields, FlatMap, Member, Mismatch,
    RenderInt, RenderString,
};
pub use config::{EncodingMode, HarnessConfig, LoggingConfig};
pub use decoder::{RawRequest, RequestDecoder};
pub use error::{ConfigError, DecodeError, FlattenError, HarnessError, Result};
pub use harness::{HarnessBuilder, HarnessState, MockHarness};
pub use report::{Failure, Report};
