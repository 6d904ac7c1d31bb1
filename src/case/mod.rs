//! Test cases
//!
//! A test case is one unit of work with a uniform lifecycle:
//! `prepare` -> `execute` -> `cleanup`. The runner calls `cleanup` exactly
//! once on every path, so a case must release any platform session there.
//!
//! Concrete checks compose a strategy rather than subclass:
//! - `ServiceDiscoveryCase`: WiFi P2P service discovery driven by a `ServiceQuery`
//! - `BleConnectCase`: Bluetooth LE (secure) connection

mod ble;
mod context;
mod discovery;
mod outcome;
pub mod registry;

pub use ble::{BleConnectCase, BleConnectParams};
pub use context::ExecContext;
pub use discovery::{DiscoveryParams, Expectation, QueryKind, ServiceDiscoveryCase, ServiceQuery};
pub use outcome::{Failure, FailureCause, Outcome, Ready, SkipReason};
pub use registry::{build_case, build_suite, CaseKind, RegistryError};

use std::fmt;

use cts_report::{ReportError, TestKey};
use serde::{Deserialize, Serialize};

use crate::capability::{CapabilitySet, DeviceProfile};
use crate::platform::Platform;

/// Test identity in `class#method` form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestId {
    class_name: String,
    method_name: String,
}

impl TestId {
    /// Parse a `class#method` identifier
    pub fn parse(id: &str) -> Result<Self, ReportError> {
        let key = TestKey::parse(id, "")?;
        Ok(Self {
            class_name: key.class_name,
            method_name: key.method_name,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Report key for this test under an ABI
    pub fn key(&self, abi: &str) -> TestKey {
        TestKey::new(self.class_name.clone(), self.method_name.clone(), abi)
    }
}

impl TryFrom<String> for TestId {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TestId> for String {
    fn from(value: TestId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.method_name)
    }
}

/// What a test case can reach while preparing
pub struct TestEnv {
    /// Device under test
    pub device: DeviceProfile,

    /// Hardware channels
    pub platform: Box<dyn Platform>,
}

impl TestEnv {
    pub fn new(device: DeviceProfile, platform: Box<dyn Platform>) -> Self {
        Self { device, platform }
    }
}

/// Uniform contract for one compliance check
pub trait TestCase {
    /// Test identity
    fn id(&self) -> &TestId;

    /// Capabilities the device must offer
    fn requirements(&self) -> &CapabilitySet;

    /// Acquire hardware; a skip is not a failure
    fn prepare(&mut self, env: &TestEnv) -> Result<Ready, SkipReason>;

    /// Run the check, waiting on the platform only through `ctx`
    fn execute(&mut self, ctx: &mut ExecContext) -> Result<Outcome, Failure>;

    /// Release everything `prepare` acquired; must tolerate not having prepared
    fn cleanup(&mut self);
}
