//! Test identity used to key metric reports

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Identifies the test a report log belongs to: class, method and ABI
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestKey {
    /// Test class (e.g. "android.net.wifi.p2p.ServiceDiscoveryTest")
    pub class_name: String,

    /// Test method (e.g. "testDnsPtr")
    pub method_name: String,

    /// ABI the test ran under (e.g. "arm64-v8a")
    pub abi: String,
}

impl TestKey {
    /// Create a key from its parts
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        abi: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            abi: abi.into(),
        }
    }

    /// Parse a `class#method` name and attach the ABI
    pub fn parse(class_method: &str, abi: &str) -> Result<Self, ReportError> {
        let (class_name, method_name) = class_method
            .split_once('#')
            .ok_or_else(|| ReportError::InvalidKey(class_method.to_string()))?;

        if class_name.is_empty() || method_name.is_empty() || method_name.contains('#') {
            return Err(ReportError::InvalidKey(class_method.to_string()));
        }

        Ok(Self::new(class_name, method_name, abi))
    }

    /// The `class#method` form
    pub fn class_method(&self) -> String {
        format!("{}#{}", self.class_name, self.method_name)
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}#{}", self.abi, self.class_name, self.method_name)
    }
}
