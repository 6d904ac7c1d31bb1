//! Suite summary (suite_summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::failure::{ExitCode, Status};
use super::test_result::TestResult;
use crate::config::DEFAULT_REPORT_DIR;

/// Schema version for suite_summary.json
pub const SUITE_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for suite_summary.json
pub const SUITE_SUMMARY_SCHEMA_ID: &str = "cts-harness/suite_summary@1";

/// Delivery state of the suite's metric reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatus {
    /// Every log reached the collector
    pub flushed: bool,

    /// Logs delivered by the last flush
    pub logs_sent: usize,

    /// Logs still waiting for delivery
    pub pending: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Transport error of the last flush
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Collector directory, relative to the run's output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl ReportStatus {
    /// Collector directory for a later flush: `requested`, else the one this run used
    pub fn report_dir(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .or_else(|| self.dir.clone())
            .unwrap_or_else(|| DEFAULT_REPORT_DIR.to_string())
    }
}

/// Suite summary (suite_summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Suite run identifier
    pub suite_id: String,

    pub suite_name: String,

    /// ABI the metrics were reported under
    pub abi: String,

    /// When the summary was created
    pub created_at: DateTime<Utc>,

    /// Worst test status, raised to `error` on transport failure
    pub status: Status,

    /// Process exit code for this suite
    pub exit_code: i32,

    pub test_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,

    /// Suite was cancelled by a signal
    pub cancelled: bool,

    /// Wall-clock duration of the suite in milliseconds
    pub duration_ms: u64,

    /// Per-test results in run order
    pub results: Vec<TestResult>,

    pub report: ReportStatus,

    /// Human-readable summary
    pub human_summary: String,
}

impl SuiteSummary {
    /// Aggregate test results
    pub fn new(
        suite_id: String,
        suite_name: String,
        abi: String,
        results: Vec<TestResult>,
        cancelled: bool,
        duration_ms: u64,
    ) -> Self {
        let mut summary = Self {
            schema_version: SUITE_SUMMARY_SCHEMA_VERSION,
            schema_id: SUITE_SUMMARY_SCHEMA_ID.to_string(),
            suite_id,
            suite_name,
            abi,
            created_at: Utc::now(),
            status: Status::Pass,
            exit_code: ExitCode::Success.as_i32(),
            test_count: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            skipped: 0,
            cancelled,
            duration_ms,
            results,
            report: ReportStatus::default(),
            human_summary: String::new(),
        };
        summary.recompute();
        summary
    }

    /// Attach the report delivery state
    pub fn with_report(mut self, report: ReportStatus) -> Self {
        self.report = report;
        self.recompute();
        self
    }

    /// Replace the report delivery state after a retried flush
    pub fn set_report(&mut self, report: ReportStatus) {
        self.report = report;
        self.recompute();
    }

    fn recompute(&mut self) {
        let (mut passed, mut failed, mut errored, mut skipped) = (0, 0, 0, 0);
        for result in &self.results {
            match result.status {
                Status::Pass => passed += 1,
                Status::Fail => failed += 1,
                Status::Error => errored += 1,
                Status::Skipped => skipped += 1,
            }
        }
        self.test_count = self.results.len();
        self.passed = passed;
        self.failed = failed;
        self.errored = errored;
        self.skipped = skipped;

        let transport_failed = self.report.error.is_some();
        let mut status = Status::aggregate(self.results.iter().map(|r| r.status));
        if transport_failed {
            status = status.max(Status::Error);
        }
        self.status = status;
        self.exit_code = ExitCode::for_suite(status, self.cancelled, transport_failed).as_i32();
        self.human_summary = self.generate_human_summary();
    }

    fn generate_human_summary(&self) -> String {
        let mut text = if self.test_count == 0 {
            "No tests selected".to_string()
        } else {
            format!(
                "{}: {} passed, {} failed, {} errored, {} skipped of {}",
                self.status.as_str(),
                self.passed,
                self.failed,
                self.errored,
                self.skipped,
                self.test_count
            )
        };
        if self.cancelled {
            text.push_str(" (cancelled)");
        }
        if let Some(error) = &self.report.error {
            text.push_str(&format!("; report delivery failed: {}", error));
        }
        text
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }

    /// Get the exit code as ExitCode enum
    pub fn exit_code_enum(&self) -> Option<ExitCode> {
        ExitCode::from_i32(self.exit_code)
    }
}
