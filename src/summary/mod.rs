//! Suite results and exit codes
//!
//! Implements suite_summary.json and the stable exit code table.

mod failure;
mod suite_summary;
mod test_result;

pub use failure::{ExitCode, Status};
pub use suite_summary::{
    ReportStatus, SuiteSummary, SUITE_SUMMARY_SCHEMA_ID, SUITE_SUMMARY_SCHEMA_VERSION,
};
pub use test_result::{sanitize_detail, TestResult};
