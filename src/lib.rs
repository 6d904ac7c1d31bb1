//! CTS harness - device capability compliance tests
//!
//! Runs compliance checks against a device's radios (WiFi P2P service
//! discovery, Bluetooth LE secure connections), bounds every wait on the
//! hardware, and reports metrics to a host collector through `cts-report`.

pub mod capability;
pub mod case;
pub mod config;
pub mod mock;
pub mod platform;
pub mod runner;
pub mod signal;
pub mod summary;
pub mod timeout;

pub use capability::{Capability, CapabilitySet, DeviceProfile};
pub use case::{ExecContext, Failure, FailureCause, Outcome, SkipReason, TestCase, TestEnv, TestId};
pub use config::{ConfigError, EffectiveConfig, SuiteConfig, TestEntry};
pub use platform::{Event, Platform, PlatformError, Request, Session, SimPlatform};
pub use runner::{RunnerConfig, SuiteRun, SuiteState, TestRunner};
pub use signal::{CancelToken, SignalHandler};
pub use summary::{ExitCode, Status, SuiteSummary, TestResult};
pub use timeout::TimeoutConfig;
