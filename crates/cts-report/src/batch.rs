//! Serialized batch of report logs handed to a host collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ReportError;
use crate::log::MetricReportLog;

/// Schema version for report batches
pub const BATCH_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for report batches
pub const BATCH_SCHEMA_ID: &str = "cts-report/batch@1";

/// One flush worth of report logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBatch {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Batch identifier (ULID, lowercase)
    pub batch_id: String,

    /// When the batch was assembled
    pub created_at: DateTime<Utc>,

    /// Logs in key order
    pub logs: Vec<MetricReportLog>,

    /// SHA-256 hex digest of the JCS-canonical `logs` array
    pub digest: String,
}

impl ReportBatch {
    /// Assemble a batch and compute its digest
    pub fn new(logs: Vec<MetricReportLog>) -> Result<Self, ReportError> {
        let digest = Self::compute_digest(&logs)?;
        Ok(Self {
            schema_version: BATCH_SCHEMA_VERSION,
            schema_id: BATCH_SCHEMA_ID.to_string(),
            batch_id: ulid::Ulid::new().to_string().to_lowercase(),
            created_at: Utc::now(),
            logs,
            digest,
        })
    }

    /// SHA-256 over the RFC 8785 canonical form of the logs
    pub fn compute_digest(logs: &[MetricReportLog]) -> Result<String, ReportError> {
        let jcs_bytes = serde_json_canonicalizer::to_vec(&logs)
            .map_err(|e| ReportError::Canonicalization(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Check the stored digest against the logs
    pub fn verify_digest(&self) -> Result<bool, ReportError> {
        Ok(Self::compute_digest(&self.logs)? == self.digest)
    }

    /// Number of logs in the batch
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// True if the batch carries no logs
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
