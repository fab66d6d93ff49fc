//! Recorded failures for one harness.
//!
//! Request validation runs inside the server task, where a panic would only
//! take down that connection. Failures are therefore recorded here and
//! surfaced to the test through [`Report`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::compare::Mismatch;

/// One problem found while validating a request or a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// A request could not be decoded; its fields were not compared.
    Decode { path: String, message: String },
    /// A decoded request field did not match.
    RequestMismatch { path: String, mismatch: Mismatch },
    /// A flattened response field did not match.
    ResponseMismatch(Mismatch),
    /// The response object could not be flattened.
    Flatten { message: String },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { path, message } => {
                write!(f, "request {path}: decode failed: {message}")
            }
            Self::RequestMismatch { path, mismatch } => write!(f, "request {path}: {mismatch}"),
            Self::ResponseMismatch(mismatch) => write!(f, "response: {mismatch}"),
            Self::Flatten { message } => write!(f, "response: {message}"),
        }
    }
}

/// Snapshot of every failure recorded by a harness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Failures in the order they were recorded.
    pub failures: Vec<Failure>,
}

impl Report {
    /// Check if nothing went wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures raised while decoding requests.
    pub fn decode_failures(&self) -> impl Iterator<Item = &Failure> {
        self.failures
            .iter()
            .filter(|f| matches!(f, Failure::Decode { .. }))
    }

    /// Field mismatches, request side and response side.
    pub fn mismatches(&self) -> impl Iterator<Item = &Mismatch> {
        self.failures.iter().filter_map(|f| match f {
            Failure::RequestMismatch { mismatch, .. } | Failure::ResponseMismatch(mismatch) => {
                Some(mismatch)
            }
            _ => None,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("no failures");
        }
        write!(f, "{} failure(s):", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

/// Shared, append-only failure log.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureLog {
    entries: Arc<Mutex<Vec<Failure>>>,
}

impl FailureLog {
    pub(crate) fn push(&self, failure: Failure) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }

    pub(crate) fn snapshot(&self) -> Vec<Failure> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
