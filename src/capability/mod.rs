//! Device capabilities
//!
//! A capability is a named hardware or platform feature (e.g.
//! `wifi.p2p.service_discovery`). Test cases declare the capabilities they
//! require; the device profile declares what the device under test offers.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Bluetooth Low Energy
pub const BLE: &str = "bluetooth.le";
/// BLE secure (encrypted) connections
pub const BLE_SECURE: &str = "bluetooth.le.secure";
/// WiFi peer-to-peer
pub const WIFI_P2P: &str = "wifi.p2p";
/// WiFi P2P service discovery (DNS-SD / UPnP)
pub const WIFI_P2P_SERVICE_DISCOVERY: &str = "wifi.p2p.service_discovery";

/// Capability errors
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("invalid capability name '{0}': use lowercase letters, digits, '.', '_' or '-'")]
    InvalidName(String),
}

/// A named hardware/platform feature
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// Create a capability, validating its name
    pub fn new(name: impl Into<String>) -> Result<Self, CapabilityError> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.ends_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));

        if valid {
            Ok(Self(name))
        } else {
            Err(CapabilityError::InvalidName(name))
        }
    }

    /// Capability name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Built-in capability names are known to be valid
    pub(crate) fn builtin(name: &'static str) -> Self {
        Self(name.to_string())
    }
}

impl TryFrom<String> for Capability {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered set of capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of names
    pub fn parse<I, S>(names: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(Capability::new)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        self.0.contains(capability)
    }

    /// Capabilities in `required` that this set lacks
    pub fn missing(&self, required: &CapabilitySet) -> Vec<Capability> {
        required.0.difference(&self.0).cloned().collect()
    }

    /// Union with another set
    pub fn extend(&mut self, other: &CapabilitySet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Device under test, as declared by its profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Device model (informational)
    #[serde(default = "default_model")]
    pub model: String,

    /// ABI tests run under (e.g. "arm64-v8a")
    pub abi: String,

    /// Capabilities the device offers
    #[serde(default)]
    pub capabilities: CapabilitySet,
}

fn default_model() -> String {
    "unknown".to_string()
}

impl DeviceProfile {
    pub fn new(model: impl Into<String>, abi: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            model: model.into(),
            abi: abi.into(),
            capabilities,
        }
    }

    /// Capabilities from `required` the device lacks
    pub fn missing(&self, required: &CapabilitySet) -> Vec<Capability> {
        self.capabilities.missing(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_name_validation() {
        assert!(Capability::new("wifi.p2p").is_ok());
        assert!(Capability::new("bluetooth.le.secure").is_ok());
        assert!(Capability::new("").is_err());
        assert!(Capability::new("WiFi").is_err());
        assert!(Capability::new("wifi p2p").is_err());
        assert!(Capability::new(".wifi").is_err());
    }

    #[test]
    fn test_missing_capabilities() {
        let device = CapabilitySet::parse([WIFI_P2P, BLE]).unwrap();
        let required = CapabilitySet::parse([WIFI_P2P, WIFI_P2P_SERVICE_DISCOVERY]).unwrap();

        let missing = device.missing(&required);
        assert_eq!(missing, vec![Capability::builtin(WIFI_P2P_SERVICE_DISCOVERY)]);
        assert!(device.missing(&CapabilitySet::new()).is_empty());
    }

    #[test]
    fn test_set_deserializes_from_names() {
        let set: CapabilitySet = serde_json::from_str(r#"["wifi.p2p", "bluetooth.le"]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "bluetooth.le,wifi.p2p");

        let bad: Result<CapabilitySet, _> = serde_json::from_str(r#"["Bad Name"]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_device_profile_from_toml() {
        let profile: DeviceProfile = toml::from_str(
            r#"
            abi = "arm64-v8a"
            capabilities = ["wifi.p2p"]
            "#,
        )
        .unwrap();
        assert_eq!(profile.model, "unknown");
        assert!(profile.capabilities.contains(&Capability::builtin(WIFI_P2P)));
    }
}
