//! Per-test result record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::failure::Status;
use crate::case::{Failure, FailureCause, SkipReason, TestId};

/// Drop characters outside the XML 1.0 `Char` production
pub fn sanitize_detail(detail: &str) -> String {
    detail
        .chars()
        .filter(|&c| {
            matches!(c,
                '\u{9}' | '\u{A}' | '\u{D}'
                | '\u{20}'..='\u{D7FF}'
                | '\u{E000}'..='\u{FFFD}'
                | '\u{10000}'..='\u{10FFFF}')
        })
        .collect()
}

/// Result of one test; immutable once produced by the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: TestId,

    pub status: Status,

    /// Failure cause (fail and error only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,

    /// Diagnostic detail, sanitized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,

    /// Metrics submitted to the report sink
    pub metrics: usize,
}

impl TestResult {
    fn new(id: TestId, status: Status, started_at: DateTime<Utc>) -> Self {
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        Self {
            id,
            status,
            cause: None,
            detail: None,
            started_at,
            duration_ms,
            metrics: 0,
        }
    }

    pub fn passed(id: TestId, started_at: DateTime<Utc>, detail: Option<String>) -> Self {
        Self::new(id, Status::Pass, started_at).with_detail(detail)
    }

    pub fn skipped(id: TestId, started_at: DateTime<Utc>, reason: &SkipReason) -> Self {
        Self::new(id, Status::Skipped, started_at).with_detail(Some(reason.to_string()))
    }

    /// Fail or error, depending on the cause
    pub fn failed(id: TestId, started_at: DateTime<Utc>, failure: &Failure) -> Self {
        let status = if failure.cause.is_error() {
            Status::Error
        } else {
            Status::Fail
        };
        let mut result = Self::new(id, status, started_at).with_detail(Some(failure.detail.clone()));
        result.cause = Some(failure.cause);
        result
    }

    fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail
            .map(|d| sanitize_detail(&d))
            .filter(|d| !d.is_empty());
        self
    }

    pub(crate) fn with_metrics(mut self, metrics: usize) -> Self {
        self.metrics = metrics;
        self
    }
}
