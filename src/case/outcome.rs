//! Test outcome taxonomy

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::platform::PlatformError;

/// Proof that `prepare` succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready;

/// Successful execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Free-form diagnostic detail
    pub detail: Option<String>,
}

impl Outcome {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

/// Why a test did not run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing capabilities: {}", join_capabilities(.0))]
    MissingCapabilities(Vec<Capability>),

    #[error("hardware unavailable: {0}")]
    Unavailable(String),
}

fn join_capabilities(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<PlatformError> for SkipReason {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Unavailable(capability) => SkipReason::MissingCapabilities(vec![capability]),
            other => SkipReason::Unavailable(other.to_string()),
        }
    }
}

/// Failure cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    /// No result within the per-test bound
    TimedOut,
    /// Response contradicts the protocol expectation
    ProtocolMismatch,
    /// Response of the wrong kind or a platform error event
    UnexpectedResponse,
    /// Suite cancelled
    Cancelled,
    /// Platform channel refused a request
    Platform,
    /// Same metric recorded twice
    DuplicateMetric,
    /// Metric value or name rejected by the report log
    InvalidMetric,
    /// Test code panicked
    Panicked,
}

impl FailureCause {
    /// Errors are programming faults in the test; failures are device faults
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            FailureCause::DuplicateMetric | FailureCause::InvalidMetric | FailureCause::Panicked
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            FailureCause::TimedOut => "Timed out",
            FailureCause::ProtocolMismatch => "Protocol mismatch",
            FailureCause::UnexpectedResponse => "Unexpected response",
            FailureCause::Cancelled => "Cancelled",
            FailureCause::Platform => "Platform error",
            FailureCause::DuplicateMetric => "Duplicate metric",
            FailureCause::InvalidMetric => "Invalid metric",
            FailureCause::Panicked => "Test panicked",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Test-local failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{cause}: {detail}")]
pub struct Failure {
    pub cause: FailureCause,
    pub detail: String,
}

impl Failure {
    pub fn new(cause: FailureCause, detail: impl Into<String>) -> Self {
        Self {
            cause,
            detail: detail.into(),
        }
    }

    pub fn timed_out(detail: impl Into<String>) -> Self {
        Self::new(FailureCause::TimedOut, detail)
    }

    pub fn protocol_mismatch(detail: impl Into<String>) -> Self {
        Self::new(FailureCause::ProtocolMismatch, detail)
    }

    pub fn unexpected_response(detail: impl Into<String>) -> Self {
        Self::new(FailureCause::UnexpectedResponse, detail)
    }

    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(FailureCause::Cancelled, detail)
    }

    pub fn platform(detail: impl Into<String>) -> Self {
        Self::new(FailureCause::Platform, detail)
    }

    pub fn panicked(detail: impl Into<String>) -> Self {
        Self::new(FailureCause::Panicked, detail)
    }
}

impl From<PlatformError> for Failure {
    fn from(err: PlatformError) -> Self {
        Failure::platform(err.to_string())
    }
}
