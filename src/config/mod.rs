//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host/user config (~/.config/cts-harness/config.toml)
//! 3. Suite file (--suite)
//! 4. CLI flags
//!
//! The merged value is deserialized into a `SuiteConfig`.

mod defaults;
mod effective;
mod merge;
mod suite;

pub use defaults::{
    BuiltinDefaults, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPORT_DIR, DEFAULT_TEST_TIMEOUT_MS,
};
pub use effective::{default_host_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use suite::{ReportSettings, SuiteConfig, SuiteSettings, TestEntry};
