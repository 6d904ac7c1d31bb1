//! Scripted platform simulator
//!
//! Stands in for real radios. A device file declares which capabilities the
//! simulated device offers and how it answers each request kind:
//!
//! ```toml
//! [device]
//! abi = "arm64-v8a"
//! capabilities = ["wifi.p2p", "wifi.p2p.service_discovery"]
//!
//! [[responses]]
//! on = "discover_services"
//! service_type = "bonjour"
//! events = [
//!     { delay_ms = 20, event = { kind = "service_found", service_type = "bonjour", service = "_ipp._tcp", instance = "printer" } },
//!     { delay_ms = 40, event = { kind = "discovery_complete" } },
//! ]
//! ```
//!
//! A request with no matching response gets no events at all.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Event, Platform, PlatformError, Request, RequestKind, ServiceType, Session};
use crate::capability::{Capability, CapabilitySet, DeviceProfile};

/// One event delivered `delay_ms` after the triggering request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(default)]
    pub delay_ms: u64,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn after(delay_ms: u64, event: Event) -> Self {
        Self { delay_ms, event }
    }
}

/// Events the simulator emits for matching requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedResponse {
    /// Request kind this response answers
    pub on: RequestKind,

    /// Only answer discovery requests for this service type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,

    /// Only answer connects to this address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Events to deliver
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

impl ScriptedResponse {
    pub fn on(kind: RequestKind, events: Vec<ScheduledEvent>) -> Self {
        Self {
            on: kind,
            service_type: None,
            address: None,
            events,
        }
    }

    fn matches(&self, request: &Request) -> bool {
        if self.on != request.kind() {
            return false;
        }
        match request {
            Request::DiscoverServices { service_type, .. } => {
                self.service_type.map_or(true, |t| t == *service_type)
            }
            Request::BleConnect { address, .. } => {
                self.address.as_deref().map_or(true, |a| a == address)
            }
        }
    }
}

/// Device file errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceFileError {
    #[error("IO error reading {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Simulated device: profile plus scripted responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFile {
    pub device: DeviceProfile,

    #[serde(default)]
    pub responses: Vec<ScriptedResponse>,
}

impl DeviceFile {
    /// Parse a device file from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, DeviceFileError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a device file from disk
    pub fn load(path: &Path) -> Result<Self, DeviceFileError> {
        let content = fs::read_to_string(path).map_err(|source| DeviceFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Default)]
struct SimState {
    open: BTreeSet<Capability>,
    requests: Vec<Request>,
}

/// In-process platform driven by scripted responses
#[derive(Debug, Clone)]
pub struct SimPlatform {
    available: CapabilitySet,
    script: Arc<Vec<ScriptedResponse>>,
    state: Arc<Mutex<SimState>>,
}

impl SimPlatform {
    /// Platform offering `available` with no scripted responses
    pub fn new(available: CapabilitySet) -> Self {
        Self {
            available,
            script: Arc::new(Vec::new()),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Platform built from a device file
    pub fn from_device_file(file: &DeviceFile) -> Self {
        Self {
            available: file.device.capabilities.clone(),
            script: Arc::new(file.responses.clone()),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Add a scripted response
    pub fn with_response(mut self, response: ScriptedResponse) -> Self {
        Arc::make_mut(&mut self.script).push(response);
        self
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<Request> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    /// Whether a session currently holds `capability`
    pub fn is_open(&self, capability: &Capability) -> bool {
        self.state
            .lock()
            .map(|s| s.open.contains(capability))
            .unwrap_or(false)
    }
}

impl Platform for SimPlatform {
    fn open(&self, capability: &Capability) -> Result<Box<dyn Session>, PlatformError> {
        if !self.available.contains(capability) {
            return Err(PlatformError::Unavailable(capability.clone()));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| PlatformError::Rejected("simulator state poisoned".to_string()))?;
        if !state.open.insert(capability.clone()) {
            return Err(PlatformError::Busy(capability.clone()));
        }

        trace!(capability = %capability, "session opened");
        Ok(Box::new(SimSession {
            capability: capability.clone(),
            script: Arc::clone(&self.script),
            state: Arc::clone(&self.state),
            queue: Vec::new(),
            closed: false,
        }))
    }

    fn open_handles(&self) -> usize {
        self.state.lock().map(|s| s.open.len()).unwrap_or(0)
    }
}

/// Session handed out by [`SimPlatform`]; released on close or drop
#[derive(Debug)]
pub struct SimSession {
    capability: Capability,
    script: Arc<Vec<ScriptedResponse>>,
    state: Arc<Mutex<SimState>>,
    /// Pending events ordered by due time
    queue: Vec<(Instant, Event)>,
    closed: bool,
}

impl Session for SimSession {
    fn capability(&self) -> &Capability {
        &self.capability
    }

    fn send(&mut self, request: Request) -> Result<(), PlatformError> {
        if self.closed {
            return Err(PlatformError::Closed);
        }

        let now = Instant::now();
        for response in self.script.iter().filter(|r| r.matches(&request)) {
            for scheduled in &response.events {
                let due = now + Duration::from_millis(scheduled.delay_ms);
                self.queue.push((due, scheduled.event.clone()));
            }
        }
        self.queue.sort_by_key(|(due, _)| *due);

        if let Ok(mut state) = self.state.lock() {
            state.requests.push(request);
        }
        Ok(())
    }

    fn next_event(&mut self, wait: Duration) -> Option<Event> {
        if let Some((due, _)) = self.queue.first() {
            let now = Instant::now();
            let until_due = due.saturating_duration_since(now);
            if until_due <= wait {
                sleep(until_due);
                let (_, event) = self.queue.remove(0);
                return Some(event);
            }
        }

        sleep(wait);
        None
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.clear();
        if let Ok(mut state) = self.state.lock() {
            state.open.remove(&self.capability);
        }
        trace!(capability = %self.capability, "session closed");
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{BLE, WIFI_P2P_SERVICE_DISCOVERY};

    fn cap(name: &'static str) -> Capability {
        Capability::builtin(name)
    }

    fn platform() -> SimPlatform {
        SimPlatform::new(CapabilitySet::parse([WIFI_P2P_SERVICE_DISCOVERY]).unwrap()).with_response(
            ScriptedResponse::on(
                RequestKind::DiscoverServices,
                vec![
                    ScheduledEvent::after(
                        5,
                        Event::ServiceFound {
                            service_type: ServiceType::Bonjour,
                            service: "_ipp._tcp".to_string(),
                            instance: "printer".to_string(),
                            txt: Default::default(),
                        },
                    ),
                    ScheduledEvent::after(10, Event::DiscoveryComplete),
                ],
            ),
        )
    }

    fn discover() -> Request {
        Request::DiscoverServices {
            service_type: ServiceType::Bonjour,
            query: None,
        }
    }

    #[test]
    fn test_unavailable_capability() {
        let platform = platform();
        assert!(matches!(
            platform.open(&cap(BLE)),
            Err(PlatformError::Unavailable(_))
        ));
    }

    #[test]
    fn test_sessions_are_exclusive() {
        let platform = platform();
        let mut first = platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)).unwrap();
        assert!(matches!(
            platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)),
            Err(PlatformError::Busy(_))
        ));
        assert_eq!(platform.open_handles(), 1);

        first.close();
        assert_eq!(platform.open_handles(), 0);
        assert!(platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)).is_ok());
    }

    #[test]
    fn test_drop_releases_session() {
        let platform = platform();
        {
            let _session = platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)).unwrap();
            assert!(platform.is_open(&cap(WIFI_P2P_SERVICE_DISCOVERY)));
        }
        assert!(!platform.is_open(&cap(WIFI_P2P_SERVICE_DISCOVERY)));
    }

    #[test]
    fn test_scripted_events_in_order() {
        let platform = platform();
        let mut session = platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)).unwrap();
        session.send(discover()).unwrap();

        let first = session.next_event(Duration::from_millis(200)).unwrap();
        assert!(matches!(first, Event::ServiceFound { .. }));
        let second = session.next_event(Duration::from_millis(200)).unwrap();
        assert_eq!(second, Event::DiscoveryComplete);
        assert!(session.next_event(Duration::from_millis(5)).is_none());
        assert_eq!(platform.requests(), vec![discover()]);
    }

    #[test]
    fn test_event_not_due_within_wait() {
        let platform = platform();
        let mut session = platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)).unwrap();
        session.send(discover()).unwrap();
        assert!(session.next_event(Duration::from_millis(0)).is_none());
    }

    #[test]
    fn test_unmatched_request_gets_no_events() {
        let platform = SimPlatform::new(CapabilitySet::parse([BLE]).unwrap());
        let mut session = platform.open(&cap(BLE)).unwrap();
        session
            .send(Request::BleConnect {
                address: "AA:BB".to_string(),
                secure: true,
            })
            .unwrap();
        assert!(session.next_event(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_send_after_close_fails() {
        let platform = platform();
        let mut session = platform.open(&cap(WIFI_P2P_SERVICE_DISCOVERY)).unwrap();
        session.close();
        assert!(matches!(session.send(discover()), Err(PlatformError::Closed)));
    }

    #[test]
    fn test_device_file_parses() {
        let file = DeviceFile::from_toml_str(
            r#"
            [device]
            model = "sim"
            abi = "arm64-v8a"
            capabilities = ["bluetooth.le", "bluetooth.le.secure"]

            [[responses]]
            on = "ble_connect"
            address = "AA:BB:CC:DD:EE:FF"
            events = [
                { delay_ms = 15, event = { kind = "connected", address = "AA:BB:CC:DD:EE:FF", encrypted = true, mtu = 247 } },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(file.device.abi, "arm64-v8a");
        assert_eq!(file.responses.len(), 1);
        assert_eq!(file.responses[0].on, RequestKind::BleConnect);
        assert!(matches!(
            file.responses[0].events[0].event,
            Event::Connected { mtu: 247, .. }
        ));
    }
}
