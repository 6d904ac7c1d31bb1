//! Suite configuration
//!
//! A suite file lists test entries in run order plus suite settings:
//!
//! ```toml
//! [suite]
//! name = "wifi-p2p"
//! abi = "arm64-v8a"
//! timeout_ms = 5000
//! exclude = ["*#slow*"]
//!
//! [[tests]]
//! id = "wifi.p2p.ServiceDiscovery#dnsPtr"
//! kind = "wifi_p2p_service_discovery"
//! params = { query = "dns_ptr", service = "_ipp._tcp" }
//! ```

use std::collections::BTreeSet;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPORT_DIR, DEFAULT_TEST_TIMEOUT_MS};
use super::effective::ConfigError;
use crate::capability::CapabilitySet;
use crate::case::{CaseKind, TestId};
use crate::timeout::TimeoutConfig;

fn default_suite_name() -> String {
    "cts".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TEST_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_report_dir() -> String {
    DEFAULT_REPORT_DIR.to_string()
}

/// `[suite]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSettings {
    #[serde(default = "default_suite_name")]
    pub name: String,

    /// ABI reported with every metric log; falls back to the device ABI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Glob patterns over test ids; empty selects everything
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns over test ids; exclusion wins over inclusion
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            name: default_suite_name(),
            abi: None,
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

/// `[report]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Collector directory, relative to the output directory
    #[serde(default = "default_report_dir")]
    pub dir: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: default_report_dir(),
        }
    }
}

/// One `[[tests]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEntry {
    pub id: TestId,

    pub kind: CaseKind,

    /// Capabilities required on top of the ones the kind implies
    #[serde(default)]
    pub requires: CapabilitySet,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: Value,
}

/// Whole suite configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub suite: SuiteSettings,

    #[serde(default)]
    pub report: ReportSettings,

    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

impl SuiteConfig {
    /// Deserialize a merged config value
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(format!("invalid suite config: {}", e)))
    }

    /// Check settings and entries
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(abi) = &self.suite.abi {
            if abi.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "suite.abi must not be empty".to_string(),
                ));
            }
        }

        self.timeouts()
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("suite: {}", e)))?;

        let mut seen = BTreeSet::new();
        for entry in &self.tests {
            if !seen.insert(&entry.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate test id '{}'",
                    entry.id
                )));
            }
        }

        build_globset(&self.suite.include)?;
        build_globset(&self.suite.exclude)?;
        Ok(())
    }

    /// Per-test timeout and poll slice
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::from_millis(self.suite.timeout_ms, self.suite.poll_interval_ms)
    }

    /// Entries that pass the include/exclude filters, in suite order
    pub fn selected_tests(&self) -> Result<Vec<TestEntry>, ConfigError> {
        let include = build_globset(&self.suite.include)?;
        let exclude = build_globset(&self.suite.exclude)?;

        Ok(self
            .tests
            .iter()
            .filter(|entry| {
                let id = entry.id.to_string();
                let included = self.suite.include.is_empty() || include.is_match(&id);
                included && !exclude.is_match(&id)
            })
            .cloned()
            .collect())
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            ConfigError::ValidationError(format!("invalid pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConfigError::ValidationError(format!("invalid patterns: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
[suite]
name = "radios"
abi = "arm64-v8a"
timeout_ms = 5000

[[tests]]
id = "wifi.p2p.ServiceDiscovery#dnsPtr"
kind = "wifi_p2p_service_discovery"
params = { query = "dns_ptr", service = "_ipp._tcp" }

[[tests]]
id = "wifi.p2p.ServiceDiscovery#upnp"
kind = "wifi_p2p_service_discovery"
params = { query = "upnp", search_target = "upnp:rootdevice" }

[[tests]]
id = "bluetooth.le.Connect#secure"
kind = "ble_secure_connect"
requires = ["bluetooth.le.long_range"]
params = { address = "AA:BB:CC:DD:EE:01" }
"#;

    fn parse(content: &str) -> SuiteConfig {
        toml::from_str(content).unwrap()
    }

    fn ids(entries: &[TestEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.to_string()).collect()
    }

    #[test]
    fn test_parse_suite() {
        let config = parse(SUITE);
        config.validate().unwrap();

        assert_eq!(config.suite.name, "radios");
        assert_eq!(config.suite.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.tests.len(), 3);
        assert_eq!(config.tests[2].kind, CaseKind::BleSecureConnect);
        assert_eq!(config.tests[2].requires.len(), 1);
        assert_eq!(config.tests[0].params["service"], "_ipp._tcp");
        assert_eq!(config.report.dir, "reports");
    }

    #[test]
    fn test_filters() {
        let mut config = parse(SUITE);
        assert_eq!(config.selected_tests().unwrap().len(), 3);

        config.suite.include = vec!["wifi.p2p.*".to_string()];
        assert_eq!(
            ids(&config.selected_tests().unwrap()),
            vec!["wifi.p2p.ServiceDiscovery#dnsPtr", "wifi.p2p.ServiceDiscovery#upnp"]
        );

        config.suite.exclude = vec!["*#upnp".to_string()];
        assert_eq!(
            ids(&config.selected_tests().unwrap()),
            vec!["wifi.p2p.ServiceDiscovery#dnsPtr"]
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut config = parse(SUITE);
        let dup = config.tests[0].clone();
        config.tests.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate test id"));
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = parse(SUITE);
        config.suite.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.suite.timeout_ms = 1000;
        config.suite.poll_interval_ms = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_glob_rejected() {
        let mut config = parse(SUITE);
        config.suite.include = vec!["wifi[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let value = serde_json::json!({
            "tests": [{ "id": "a.B#c", "kind": "nfc_tap" }]
        });
        assert!(SuiteConfig::from_value(value).is_err());
    }
}
