//! Report sink: accumulates report logs and flushes them to a host collector

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::ReportBatch;
use crate::collector::HostCollector;
use crate::error::ReportError;
use crate::key::TestKey;
use crate::log::MetricReportLog;
use crate::metric::{MetricValue, ResultType, ResultUnit};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SinkEntry {
    log: MetricReportLog,
    sent: bool,
}

/// Outcome of a flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReceipt {
    /// Number of logs sent in this flush
    pub sent: usize,

    /// Batch identifier (None when there was nothing to send)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,

    /// Collector-reported location of the batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl FlushReceipt {
    fn nothing_sent() -> Self {
        Self {
            sent: 0,
            batch_id: None,
            location: None,
        }
    }
}

/// Accumulates report logs for one suite run
///
/// Each log carries a sent flag. A flush sends only unsent logs, so a second
/// flush with no new records is a no-op, and a failed flush can be retried
/// without re-running any test.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReportSink {
    #[serde(with = "entry_list")]
    entries: BTreeMap<TestKey, SinkEntry>,
}

/// Saved form of the entries: a list, each log carrying its own key
mod entry_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::SinkEntry;
    use crate::key::TestKey;

    pub fn serialize<S: Serializer>(
        entries: &BTreeMap<TestKey, SinkEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(entries.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<TestKey, SinkEntry>, D::Error> {
        let list = Vec::<SinkEntry>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|e| (e.log.key.clone(), e)).collect())
    }
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new test boundary for `key`, discarding any earlier log
    pub fn begin_test(&mut self, key: TestKey) {
        if self.entries.contains_key(&key) {
            debug!(test = %key, "new test boundary replaces earlier log");
        }
        self.entries.insert(
            key.clone(),
            SinkEntry {
                log: MetricReportLog::new(key),
                sent: false,
            },
        );
    }

    /// Record a neutral metric for a test
    pub fn record(
        &mut self,
        key: &TestKey,
        name: &str,
        value: impl Into<MetricValue>,
        unit: ResultUnit,
    ) -> Result<(), ReportError> {
        self.record_with_type(key, name, value, unit, ResultType::Neutral)
    }

    /// Record a metric with an explicit aggregation policy
    ///
    /// Fails with `DuplicateMetric` if `name` was already recorded for `key`
    /// since the last boundary.
    pub fn record_with_type(
        &mut self,
        key: &TestKey,
        name: &str,
        value: impl Into<MetricValue>,
        unit: ResultUnit,
        result_type: ResultType,
    ) -> Result<(), ReportError> {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| SinkEntry {
                log: MetricReportLog::new(key.clone()),
                sent: false,
            });

        entry.log.add_value(name, value, unit, result_type)?;
        entry.sent = false;
        Ok(())
    }

    /// Take ownership of a completed log
    ///
    /// Completion is a boundary: an earlier log for the same key is replaced.
    pub fn submit(&mut self, log: MetricReportLog) {
        debug!(test = %log.key, metrics = log.len(), "report log submitted");
        self.entries.insert(log.key.clone(), SinkEntry { log, sent: false });
    }

    /// Log recorded for a test
    pub fn log(&self, key: &TestKey) -> Option<&MetricReportLog> {
        self.entries.get(key).map(|e| &e.log)
    }

    /// All logs in key order
    pub fn logs(&self) -> impl Iterator<Item = &MetricReportLog> {
        self.entries.values().map(|e| &e.log)
    }

    /// Whether the log for `key` has been sent (None if unknown)
    pub fn is_sent(&self, key: &TestKey) -> Option<bool> {
        self.entries.get(key).map(|e| e.sent)
    }

    /// Number of logs held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no logs are held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of logs not yet sent
    pub fn unsent_count(&self) -> usize {
        self.entries.values().filter(|e| !e.sent).count()
    }

    /// Send every unsent log to the collector as one batch
    ///
    /// On transport failure nothing is marked sent and the logs stay in
    /// memory for a retry.
    pub fn flush(&mut self, collector: &mut dyn HostCollector) -> Result<FlushReceipt, ReportError> {
        let pending: Vec<TestKey> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.sent)
            .map(|(key, _)| key.clone())
            .collect();

        if pending.is_empty() {
            debug!("flush: nothing unsent");
            return Ok(FlushReceipt::nothing_sent());
        }

        let logs = pending
            .iter()
            .filter_map(|key| self.entries.get(key).map(|e| e.log.clone()))
            .collect();
        let batch = ReportBatch::new(logs)?;
        let batch_id = batch.batch_id.clone();

        let receipt = match collector.accept(batch) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(batch_id = %batch_id, pending = pending.len(), error = %e, "flush failed");
                return Err(ReportError::Transport(e));
            }
        };

        for key in &pending {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.sent = true;
            }
        }

        info!(batch_id = %receipt.batch_id, sent = pending.len(), location = %receipt.location, "reports flushed");
        Ok(FlushReceipt {
            sent: pending.len(),
            batch_id: Some(receipt.batch_id),
            location: Some(receipt.location),
        })
    }

    /// Persist the sink, sent flags included, with write-then-rename
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load a previously saved sink
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
