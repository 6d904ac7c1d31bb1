//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Per-test timeout when nothing overrides it
pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 30_000;

/// Platform poll slice
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Collector directory, relative to the output directory
pub const DEFAULT_REPORT_DIR: &str = "reports";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Suite name used when the suite file has none
    pub suite_name: String,

    /// Per-test timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,

    /// Poll slice in milliseconds (default: 50)
    pub poll_interval_ms: u64,

    /// Report directory under the output directory (default: "reports")
    pub report_dir: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            suite_name: "cts".to_string(),
            timeout_ms: DEFAULT_TEST_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            report_dir: DEFAULT_REPORT_DIR.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "suite": {
                "name": self.suite_name,
                "timeout_ms": self.timeout_ms,
                "poll_interval_ms": self.poll_interval_ms,
                "include": [],
                "exclude": []
            },
            "report": {
                "dir": self.report_dir
            },
            "tests": []
        })
    }
}
