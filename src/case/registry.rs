//! Builds test cases from suite entries

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ble::{BleConnectCase, BleConnectParams};
use super::discovery::{DiscoveryParams, ServiceDiscoveryCase};
use super::{TestCase, TestId};
use crate::capability::CapabilitySet;
use crate::config::TestEntry;

/// Test kinds a suite entry can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    WifiP2pServiceDiscovery,
    BleSecureConnect,
}

impl CaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseKind::WifiP2pServiceDiscovery => "wifi_p2p_service_discovery",
            CaseKind::BleSecureConnect => "ble_secure_connect",
        }
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{id}: invalid params: {message}")]
    InvalidParams { id: TestId, message: String },

    #[error("duplicate test id '{0}'")]
    DuplicateId(TestId),
}

fn params<T: DeserializeOwned>(entry: &TestEntry) -> Result<T, RegistryError> {
    let value = match &entry.params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| RegistryError::InvalidParams {
        id: entry.id.clone(),
        message: e.to_string(),
    })
}

fn invalid(entry: &TestEntry) -> impl FnOnce(String) -> RegistryError + '_ {
    move |message| RegistryError::InvalidParams {
        id: entry.id.clone(),
        message,
    }
}

/// Build one case; its requirements are the kind's plus the entry's `requires`
pub fn build_case(entry: &TestEntry) -> Result<Box<dyn TestCase>, RegistryError> {
    let case: Box<dyn TestCase> = match entry.kind {
        CaseKind::WifiP2pServiceDiscovery => {
            let p: DiscoveryParams = params(entry)?;
            Box::new(
                ServiceDiscoveryCase::from_params(entry.id.clone(), &p)
                    .map_err(invalid(entry))?
                    .with_requirements(&entry.requires),
            )
        }
        CaseKind::BleSecureConnect => {
            let p: BleConnectParams = params(entry)?;
            Box::new(
                BleConnectCase::from_params(entry.id.clone(), &p)
                    .map_err(invalid(entry))?
                    .with_requirements(&entry.requires),
            )
        }
    };
    Ok(case)
}

/// Build every case in order; ids must be unique
pub fn build_suite(entries: &[TestEntry]) -> Result<Vec<Box<dyn TestCase>>, RegistryError> {
    let mut seen = BTreeSet::new();
    entries
        .iter()
        .map(|entry| {
            if !seen.insert(entry.id.clone()) {
                return Err(RegistryError::DuplicateId(entry.id.clone()));
            }
            build_case(entry)
        })
        .collect()
}

/// Requirements a built case would declare, without building it
pub fn requirements_of(entry: &TestEntry) -> Result<CapabilitySet, RegistryError> {
    build_case(entry).map(|case| case.requirements().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, BLE_SECURE, WIFI_P2P};
    use serde_json::json;

    fn entry(id: &str, kind: CaseKind, params: Value) -> TestEntry {
        TestEntry {
            id: TestId::parse(id).unwrap(),
            kind,
            requires: CapabilitySet::new(),
            params,
        }
    }

    #[test]
    fn test_build_discovery_case() {
        let mut e = entry(
            "wifi.p2p.ServiceDiscovery#dnsPtr",
            CaseKind::WifiP2pServiceDiscovery,
            json!({ "query": "dns_ptr", "service": "_ipp._tcp" }),
        );
        e.requires = CapabilitySet::parse(["wifi.p2p.group_owner"]).unwrap();

        let case = build_case(&e).unwrap();
        assert_eq!(case.id().to_string(), "wifi.p2p.ServiceDiscovery#dnsPtr");
        assert_eq!(case.requirements().len(), 3);
        assert!(case.requirements().contains(&Capability::new(WIFI_P2P).unwrap()));
    }

    #[test]
    fn test_ble_case_requires_secure_capability() {
        let e = entry(
            "bluetooth.le.Connect#secure",
            CaseKind::BleSecureConnect,
            json!({ "address": "AA:BB:CC:DD:EE:01" }),
        );
        let requires = requirements_of(&e).unwrap();
        assert!(requires.contains(&Capability::new(BLE_SECURE).unwrap()));
    }

    #[test]
    fn test_null_params_treated_as_empty() {
        let e = entry("wifi.p2p.ServiceDiscovery#all", CaseKind::WifiP2pServiceDiscovery, Value::Null);
        // `query` is required, so an empty table is rejected with a message
        let err = build_case(&e).err().unwrap();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_missing_query_field_is_invalid() {
        let e = entry(
            "wifi.p2p.ServiceDiscovery#upnp",
            CaseKind::WifiP2pServiceDiscovery,
            json!({ "query": "upnp" }),
        );
        let err = build_case(&e).err().unwrap();
        assert!(matches!(err, RegistryError::InvalidParams { .. }));
        assert!(err.to_string().contains("search_target"));
    }

    #[test]
    fn test_unknown_param_rejected() {
        let e = entry(
            "bluetooth.le.Connect#secure",
            CaseKind::BleSecureConnect,
            json!({ "address": "AA:BB:CC:DD:EE:01", "pin": 1234 }),
        );
        assert!(build_case(&e).is_err());
    }

    #[test]
    fn test_build_suite_keeps_order_and_rejects_duplicates() {
        let a = entry("wifi.p2p.ServiceDiscovery#all", CaseKind::WifiP2pServiceDiscovery, json!({ "query": "all" }));
        let b = entry("bluetooth.le.Connect#plain", CaseKind::BleSecureConnect, json!({ "address": "AA:BB:CC:DD:EE:02", "secure": false }));

        let cases = build_suite(&[a.clone(), b]).unwrap();
        let ids: Vec<String> = cases.iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["wifi.p2p.ServiceDiscovery#all", "bluetooth.le.Connect#plain"]);

        let err = build_suite(&[a.clone(), a]).err().unwrap();
        assert!(matches!(err, RegistryError::DuplicateId(_)));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CaseKind::BleSecureConnect.as_str(), "ble_secure_connect");
        let kind: CaseKind = serde_json::from_value(json!("wifi_p2p_service_discovery")).unwrap();
        assert_eq!(kind, CaseKind::WifiP2pServiceDiscovery);
    }
}
