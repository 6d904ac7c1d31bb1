//! Metric values, units and aggregation policies

use serde::{Deserialize, Serialize};

/// How the host should judge or aggregate a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Larger values are better (throughput, score)
    HigherBetter,
    /// Smaller values are better (latency)
    LowerBetter,
    /// Informational only
    Neutral,
    /// Value should be surfaced as a warning
    Warning,
}

impl ResultType {
    /// Wire name of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::HigherBetter => "higher_better",
            ResultType::LowerBetter => "lower_better",
            ResultType::Neutral => "neutral",
            ResultType::Warning => "warning",
        }
    }
}

/// Unit of a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultUnit {
    None,
    Ms,
    Us,
    Fps,
    Ops,
    Kbps,
    Mbps,
    Byte,
    Count,
    Score,
    Hz,
    Percent,
}

impl ResultUnit {
    /// Wire name of the unit
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultUnit::None => "none",
            ResultUnit::Ms => "ms",
            ResultUnit::Us => "us",
            ResultUnit::Fps => "fps",
            ResultUnit::Ops => "ops",
            ResultUnit::Kbps => "kbps",
            ResultUnit::Mbps => "mbps",
            ResultUnit::Byte => "byte",
            ResultUnit::Count => "count",
            ResultUnit::Score => "score",
            ResultUnit::Hz => "hz",
            ResultUnit::Percent => "percent",
        }
    }
}

/// A single measurement or a series of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Single(f64),
    Series(Vec<f64>),
}

impl MetricValue {
    /// True if every sample is a finite number
    pub fn is_finite(&self) -> bool {
        match self {
            MetricValue::Single(v) => v.is_finite(),
            MetricValue::Series(values) => values.iter().all(|v| v.is_finite()),
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            MetricValue::Single(_) => 1,
            MetricValue::Series(values) => values.len(),
        }
    }

    /// True for an empty series
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the value for the legacy details string
    pub fn render(&self) -> String {
        match self {
            MetricValue::Single(v) => format!("{}", v),
            MetricValue::Series(values) => values
                .iter()
                .map(|v| format!("{}", v))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Single(value)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(values: Vec<f64>) -> Self {
        MetricValue::Series(values)
    }
}

/// One named metric with its unit and aggregation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name, unique within a report log
    pub name: String,

    /// Measured value(s)
    pub value: MetricValue,

    /// Unit of the value
    pub unit: ResultUnit,

    /// Aggregation policy
    #[serde(rename = "type")]
    pub result_type: ResultType,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<MetricValue>,
        unit: ResultUnit,
        result_type: ResultType,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit,
            result_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_detection() {
        assert!(MetricValue::Single(1.5).is_finite());
        assert!(!MetricValue::Single(f64::NAN).is_finite());
        assert!(!MetricValue::Series(vec![1.0, f64::INFINITY]).is_finite());
    }

    #[test]
    fn test_metric_serializes_type_field() {
        let metric = Metric::new("latency", 12.0, ResultUnit::Ms, ResultType::LowerBetter);
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["type"], "lower_better");
        assert_eq!(json["unit"], "ms");
        assert_eq!(json["value"], 12.0);
    }

    #[test]
    fn test_series_render() {
        let value = MetricValue::from(vec![1.0, 2.5]);
        assert_eq!(value.render(), "1 2.5");
        assert_eq!(value.len(), 2);
    }
}
