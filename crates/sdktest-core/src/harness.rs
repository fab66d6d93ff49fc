//! The per-test mock harness.
//!
//! Provides a complete test environment with:
//! - A mock endpoint serving one canned response body
//! - Request validation against the expected request fields
//! - Response validation against the expected response fields
//!
//! # Close policy
//!
//! Closing is explicit: call [`MockHarness::close`] when the test is done
//! with the endpoint. Validating a response never closes the harness.
//! Dropping a harness that was not closed releases the server as well.
//!
//! Recorded failures always reach the test. `close()` returns them as
//! [`HarnessError::Failed`], and dropping a harness whose failures were never
//! handed out through `close()`, [`MockHarness::report`],
//! [`MockHarness::failures`] or [`MockHarness::assert_clean`] panics.

use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::compare::{compare_fields, flatten, flatten_serialized, Fields, FlatMap, Mismatch};
use crate::config::{expect_mapping, EncodingMode, HarnessConfig};
use crate::decoder::{RawRequest, RequestDecoder};
use crate::error::{ConfigResult, FlattenResult, HarnessError, Result};
use crate::report::{Failure, FailureLog, Report};
use crate::server::{MockServer, ResponseGenerator};

/// Lifecycle of a harness. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    /// Configured, not yet listening.
    Constructed,
    /// Accepting requests.
    Serving,
    /// Server released.
    Closed,
}

/// Mock endpoint plus request and response validation for one test.
pub struct MockHarness {
    /// Test configuration
    config: Arc<HarnessConfig>,
    /// The mock server
    server: MockServer,
    /// Base URL of the running server
    url: String,
    state: HarnessState,
    failures: FailureLog,
    /// How many recorded failures the caller has already been shown.
    surfaced: AtomicUsize,
}

impl MockHarness {
    /// Validate the configuration and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the listen
    /// address cannot be bound.
    pub async fn start(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let listen = config.listen_addr()?;
        let config = Arc::new(config);

        let mut harness = Self {
            server: MockServer::new(listen, config.uri.as_str()),
            config,
            url: String::new(),
            state: HarnessState::Constructed,
            failures: FailureLog::default(),
            surfaced: AtomicUsize::new(0),
        };

        let generator = request_validator(Arc::clone(&harness.config), harness.failures.clone());
        let addr = harness.server.start(generator).await?;
        harness.url = format!("http://{addr}");
        harness.state = HarnessState::Serving;

        info!(
            url = %harness.url,
            uri = %harness.config.uri,
            mode = %harness.config.resp_type,
            "harness serving"
        );
        Ok(harness)
    }

    /// Base URL for the SDK under test, e.g. `http://127.0.0.1:40123`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full URL of the registered endpoint.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.url, self.config.uri)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// The harness configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Validate a response object the SDK parsed from the canned body.
    ///
    /// Returns the mismatches found, which are also recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Flatten`] if the response cannot be
    /// flattened, and [`HarnessError::Closed`] after [`Self::close`].
    pub fn validate_response(&self, response: &dyn Fields) -> Result<Vec<Mismatch>> {
        self.check_response(|| flatten(response))
    }

    /// Validate any serializable response object via its JSON form.
    ///
    /// # Errors
    ///
    /// Same as [`Self::validate_response`].
    pub fn validate_serialized_response<T: Serialize + ?Sized>(
        &self,
        response: &T,
    ) -> Result<Vec<Mismatch>> {
        self.check_response(|| flatten_serialized(response))
    }

    fn check_response<F>(&self, flatten_response: F) -> Result<Vec<Mismatch>>
    where
        F: FnOnce() -> FlattenResult<FlatMap>,
    {
        if self.state == HarnessState::Closed {
            return Err(HarnessError::Closed);
        }

        let Some(want) = &self.config.resp_want else {
            debug!("no expected response fields, skipping response validation");
            return Ok(Vec::new());
        };

        let flat = flatten_response().map_err(|e| {
            warn!(error = %e, "response flattening failed");
            self.failures.push(Failure::Flatten {
                message: e.to_string(),
            });
            e
        })?;

        let mismatches = compare_fields(want, &flat);
        for mismatch in &mismatches {
            warn!(
                field = %mismatch.field,
                expected = %mismatch.expected,
                actual = %mismatch.actual,
                "response field mismatch"
            );
            self.failures
                .push(Failure::ResponseMismatch(mismatch.clone()));
        }
        Ok(mismatches)
    }

    /// Get all requests the endpoint received.
    pub async fn received_requests(&self) -> Vec<RawRequest> {
        self.server.get_requests().await
    }

    /// Get the last request the endpoint received.
    pub async fn last_request(&self) -> Option<RawRequest> {
        self.server.last_request().await
    }

    /// Clear the request log.
    pub async fn clear_requests(&self) {
        self.server.clear_requests().await;
    }

    /// Every failure recorded so far.
    #[must_use]
    pub fn failures(&self) -> Vec<Failure> {
        self.report().failures
    }

    /// Snapshot report of every failure recorded so far.
    #[must_use]
    pub fn report(&self) -> Report {
        let failures = self.failures.snapshot();
        self.surfaced.fetch_max(failures.len(), Ordering::Relaxed);
        Report { failures }
    }

    /// Panic with every recorded failure unless there are none.
    ///
    /// # Panics
    ///
    /// Panics if any decode failure or field mismatch was recorded.
    pub fn assert_clean(&self) {
        let report = self.report();
        assert!(report.is_clean(), "sdk test failed: {report}");
    }

    /// Release the server and report the outcome of the test.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Failed`] carrying the full report if any
    /// failure was recorded, and [`HarnessError::Closed`] if the harness was
    /// already closed.
    pub fn close(&mut self) -> Result<()> {
        if self.state == HarnessState::Closed {
            return Err(HarnessError::Closed);
        }
        self.server.stop();
        self.state = HarnessState::Closed;

        let report = self.report();
        if report.is_clean() {
            debug!(url = %self.url, "harness closed");
            return Ok(());
        }
        warn!(url = %self.url, failures = report.failures.len(), "harness closed with failures");
        Err(HarnessError::Failed(report))
    }
}

impl Drop for MockHarness {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let failures = self.failures.snapshot();
        let unseen = failures.len().saturating_sub(*self.surfaced.get_mut());
        if unseen > 0 {
            panic!(
                "sdk test failed: harness dropped with {unseen} unreported failure(s)\n{}",
                Report { failures }
            );
        }
    }
}

/// Build the per-request callback: validate first, then hand back the canned body.
fn request_validator(config: Arc<HarnessConfig>, failures: FailureLog) -> ResponseGenerator {
    let decoder = RequestDecoder::from_config(&config);

    Arc::new(move |request: &RawRequest| {
        match &config.req_want {
            None => {
                debug!(
                    path = %request.path,
                    "no expected request fields, skipping request validation"
                );
            }
            Some(want) => match decoder.validate(request, want) {
                Ok(mismatches) => {
                    for mismatch in mismatches {
                        warn!(
                            path = %request.path,
                            field = %mismatch.field,
                            expected = %mismatch.expected,
                            actual = %mismatch.actual,
                            "request field mismatch"
                        );
                        failures.push(Failure::RequestMismatch {
                            path: request.path.clone(),
                            mismatch,
                        });
                    }
                }
                Err(e) => {
                    warn!(path = %request.path, error = %e, "request decode failed");
                    failures.push(Failure::Decode {
                        path: request.path.clone(),
                        message: e.to_string(),
                    });
                }
            },
        }

        config.resp_data.clone()
    })
}

/// Builder for creating a harness with specific configuration.
pub struct HarnessBuilder {
    config: HarnessConfig,
    req_want: Option<serde_json::Value>,
    resp_want: Option<serde_json::Value>,
}

impl HarnessBuilder {
    /// Create a new builder for the given mode, with default values elsewhere.
    #[must_use]
    pub fn new(resp_type: EncodingMode) -> Self {
        Self {
            config: HarnessConfig::new(resp_type),
            req_want: None,
            resp_want: None,
        }
    }

    /// Set the XML root key.
    #[must_use]
    pub fn xml_root(mut self, root: impl Into<String>) -> Self {
        self.config.xml_root = root.into();
        self
    }

    /// Set the form field or query parameter holding the nested payload.
    #[must_use]
    pub fn data_field(mut self, field: impl Into<String>) -> Self {
        self.config.data_field = Some(field.into());
        self
    }

    /// Set the canned response body.
    #[must_use]
    pub fn resp_data(mut self, body: impl Into<Bytes>) -> Self {
        self.config.resp_data = body.into();
        self
    }

    /// Set the expected request fields (a JSON object).
    #[must_use]
    pub fn req_want(mut self, want: serde_json::Value) -> Self {
        self.req_want = Some(want);
        self
    }

    /// Set the expected response fields (a JSON object).
    #[must_use]
    pub fn resp_want(mut self, want: serde_json::Value) -> Self {
        self.resp_want = Some(want);
        self
    }

    /// Set the endpoint path.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config.uri = uri.into();
        self
    }

    /// Set the listen address.
    #[must_use]
    pub fn listen(mut self, address: impl Into<String>) -> Self {
        self.config.listen = address.into();
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the expected data are not JSON objects or
    /// validation fails.
    pub fn config(self) -> ConfigResult<HarnessConfig> {
        let mut config = self.config;
        if let Some(want) = self.req_want {
            config.req_want = Some(expect_mapping("req_want", want)?);
        }
        if let Some(want) = self.resp_want {
            config.resp_want = Some(expect_mapping("resp_want", want)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration and start the harness.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server
    /// cannot start.
    pub async fn start(self) -> Result<MockHarness> {
        MockHarness::start(self.config()?).await
    }
}
