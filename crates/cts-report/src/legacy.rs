//! Legacy `summary++++details` result strings
//!
//! Older device-side tests hand their results back as a single string under
//! the `COMPATIBILITY_TEST_RESULT` metric key. The summary and details halves
//! are joined by `++++`; detail entries are joined by `+++`.

use crate::error::ReportError;
use crate::log::MetricReportLog;
use crate::metric::Metric;

/// Metric key the legacy string is reported under
pub const RESULT_KEY: &str = "COMPATIBILITY_TEST_RESULT";

/// Separator between summary and details
pub const SUMMARY_SEPARATOR: &str = "++++";

/// Separator between detail entries
pub const DETAIL_SEPARATOR: &str = "+++";

fn encode_metric(metric: &Metric) -> String {
    format!(
        "{}|{}|{}|{}",
        metric.name,
        metric.result_type.as_str(),
        metric.unit.as_str(),
        metric.value.render()
    )
}

/// Encode a log as `summary++++details`
pub fn encode(log: &MetricReportLog) -> String {
    let summary = log.summary.as_ref().map(encode_metric).unwrap_or_default();
    let details = log
        .metrics
        .values()
        .map(encode_metric)
        .collect::<Vec<_>>()
        .join(DETAIL_SEPARATOR);

    format!("{}{}{}", summary, SUMMARY_SEPARATOR, details)
}

/// Split a legacy result string into (summary, details)
///
/// The split happens at the last `++++`, so a summary may itself contain
/// plus signs.
pub fn parse(result: &str) -> Result<(String, String), ReportError> {
    result
        .rsplit_once(SUMMARY_SEPARATOR)
        .map(|(summary, details)| (summary.to_string(), details.to_string()))
        .ok_or_else(|| ReportError::UnrecognizedResult(result.to_string()))
}
