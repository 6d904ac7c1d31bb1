//! Host collectors: the receiving end of a report flush
//!
//! - `HostCollector`: accepts a serialized batch and reports success/failure
//! - `DirectoryCollector`: writes each batch to `<dir>/batch-<id>.json`
//! - `MemoryCollector`: keeps batches in-process, with failure injection

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batch::ReportBatch;

/// Transport errors raised while handing a batch to the host
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collector rejected batch {batch_id}: {reason}")]
    Rejected { batch_id: String, reason: String },

    #[error("collector unavailable: {0}")]
    Unavailable(String),
}

/// Acknowledgement returned by a collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorReceipt {
    /// Batch that was accepted
    pub batch_id: String,

    /// Where the batch landed (path, URL, or "memory")
    pub location: String,
}

/// Receiving end of a report flush
pub trait HostCollector {
    /// Accept one batch; the collector takes ownership of it
    fn accept(&mut self, batch: ReportBatch) -> Result<CollectorReceipt, TransportError>;
}

/// Collector that writes batches as JSON files into a directory
#[derive(Debug, Clone)]
pub struct DirectoryCollector {
    dir: PathBuf,
}

impl DirectoryCollector {
    /// Create a collector rooted at `dir` (created on first batch)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a batch is written to
    pub fn batch_path(&self, batch_id: &str) -> PathBuf {
        self.dir.join(format!("batch-{}.json", batch_id))
    }
}

impl HostCollector for DirectoryCollector {
    fn accept(&mut self, batch: ReportBatch) -> Result<CollectorReceipt, TransportError> {
        fs::create_dir_all(&self.dir)?;

        let json = batch.to_json()?;
        let final_path = self.batch_path(&batch.batch_id);
        let temp_path = self.dir.join(format!(".batch-{}.json.tmp", batch.batch_id));

        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, &final_path)?;

        debug!(batch_id = %batch.batch_id, path = %final_path.display(), "batch written");
        Ok(CollectorReceipt {
            batch_id: batch.batch_id,
            location: final_path.to_string_lossy().to_string(),
        })
    }
}

/// In-process collector for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryCollector {
    batches: Vec<ReportBatch>,
    /// Number of upcoming accepts that should fail
    fail_next: u32,
    /// Total accept calls, including failed ones
    attempts: u32,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` accepts fail with `Unavailable`
    pub fn fail_next(&mut self, count: u32) {
        self.fail_next = count;
    }

    /// Batches accepted so far
    pub fn batches(&self) -> &[ReportBatch] {
        &self.batches
    }

    /// Number of accept calls, including failed ones
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl HostCollector for MemoryCollector {
    fn accept(&mut self, batch: ReportBatch) -> Result<CollectorReceipt, TransportError> {
        self.attempts += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(TransportError::Unavailable("injected failure".to_string()));
        }

        let receipt = CollectorReceipt {
            batch_id: batch.batch_id.clone(),
            location: "memory".to_string(),
        };
        self.batches.push(batch);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MetricReportLog;
    use tempfile::TempDir;

    fn batch() -> ReportBatch {
        let log = MetricReportLog::for_test("wifi.P2p#upnp", "x86").unwrap();
        ReportBatch::new(vec![log]).unwrap()
    }

    #[test]
    fn test_directory_collector_writes_batch() {
        let tmp = TempDir::new().unwrap();
        let mut collector = DirectoryCollector::new(tmp.path().join("reports"));

        let batch = batch();
        let id = batch.batch_id.clone();
        let receipt = collector.accept(batch).unwrap();

        assert_eq!(receipt.batch_id, id);
        let written = fs::read_to_string(collector.batch_path(&id)).unwrap();
        let loaded = ReportBatch::from_json(&written).unwrap();
        assert_eq!(loaded.batch_id, id);
        assert!(loaded.verify_digest().unwrap());
        // No temp file left behind
        assert!(!tmp
            .path()
            .join("reports")
            .join(format!(".batch-{}.json.tmp", id))
            .exists());
    }

    #[test]
    fn test_directory_collector_io_failure() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("reports");
        fs::write(&blocker, "not a directory").unwrap();

        let mut collector = DirectoryCollector::new(&blocker);
        assert!(matches!(collector.accept(batch()), Err(TransportError::Io(_))));
    }

    #[test]
    fn test_memory_collector_failure_injection() {
        let mut collector = MemoryCollector::new();
        collector.fail_next(1);

        assert!(collector.accept(batch()).is_err());
        assert!(collector.accept(batch()).is_ok());
        assert_eq!(collector.attempts(), 2);
        assert_eq!(collector.batches().len(), 1);
    }
}
