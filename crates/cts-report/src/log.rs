//! Per-test metric report log

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::key::TestKey;
use crate::legacy;
use crate::metric::{Metric, MetricValue, ResultType, ResultUnit};

/// Metrics recorded by one test
///
/// A log is mutated only by the test that owns it. Once the test completes
/// the log is moved into the [`crate::ReportSink`] and never written again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReportLog {
    /// Owning test
    pub key: TestKey,

    /// When recording started
    pub created_at: DateTime<Utc>,

    /// Headline metric for the test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Metric>,

    /// Detail metrics by name
    #[serde(default)]
    pub metrics: BTreeMap<String, Metric>,
}

impl MetricReportLog {
    /// Start an empty log for a test
    pub fn new(key: TestKey) -> Self {
        Self {
            key,
            created_at: Utc::now(),
            summary: None,
            metrics: BTreeMap::new(),
        }
    }

    /// Start a log from a `class#method` name
    pub fn for_test(class_method: &str, abi: &str) -> Result<Self, ReportError> {
        Ok(Self::new(TestKey::parse(class_method, abi)?))
    }

    /// Record a detail metric
    ///
    /// Each metric name may be written once per log.
    pub fn add_value(
        &mut self,
        name: &str,
        value: impl Into<MetricValue>,
        unit: ResultUnit,
        result_type: ResultType,
    ) -> Result<(), ReportError> {
        let value = value.into();
        if !value.is_finite() {
            return Err(ReportError::InvalidValue {
                metric: name.to_string(),
            });
        }
        if self.metrics.contains_key(name) {
            return Err(ReportError::DuplicateMetric {
                test: self.key.to_string(),
                metric: name.to_string(),
            });
        }

        self.metrics
            .insert(name.to_string(), Metric::new(name, value, unit, result_type));
        Ok(())
    }

    /// Record the headline metric
    pub fn set_summary(
        &mut self,
        name: &str,
        value: f64,
        unit: ResultUnit,
        result_type: ResultType,
    ) -> Result<(), ReportError> {
        if !value.is_finite() {
            return Err(ReportError::InvalidValue {
                metric: name.to_string(),
            });
        }
        if self.summary.is_some() {
            return Err(ReportError::DuplicateMetric {
                test: self.key.to_string(),
                metric: name.to_string(),
            });
        }

        self.summary = Some(Metric::new(name, value, unit, result_type));
        Ok(())
    }

    /// Look up a detail metric
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    /// Number of recorded metrics, summary included
    pub fn len(&self) -> usize {
        self.metrics.len() + usize::from(self.summary.is_some())
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Legacy `summary++++details` result string
    pub fn to_result_string(&self) -> String {
        legacy::encode(self)
    }
}
