//! Report error taxonomy

use crate::collector::TransportError;

/// Errors raised while recording or flushing metric reports
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The same metric name was recorded twice for one test
    #[error("metric '{metric}' already recorded for {test}")]
    DuplicateMetric { test: String, metric: String },

    /// A test key could not be parsed
    #[error("invalid test key '{0}': expected <class>#<method>")]
    InvalidKey(String),

    /// A metric value is NaN or infinite
    #[error("metric '{metric}' has a non-finite value")]
    InvalidValue { metric: String },

    /// A legacy result string has no summary/details separator
    #[error("unrecognized result string: {0}")]
    UnrecognizedResult(String),

    /// Flush failed in the transport; logs stay unsent
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Returns true for errors caused by a misbehaving test rather than I/O
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            ReportError::DuplicateMetric { .. }
                | ReportError::InvalidKey(_)
                | ReportError::InvalidValue { .. }
        )
    }
}
