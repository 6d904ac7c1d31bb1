//! Platform channels
//!
//! Hardware is reached only through request/response channels:
//! - `Platform`: opens an exclusive `Session` for one capability
//! - `Session`: sends requests and yields asynchronous events
//!
//! A session may never deliver an event for a request. Callers bound every
//! wait and treat silence as a timeout.

mod sim;

pub use sim::{DeviceFile, ScheduledEvent, ScriptedResponse, SimPlatform, SimSession};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// Service discovery protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// DNS-SD (Bonjour) records
    Bonjour,
    /// UPnP search targets
    Upnp,
    /// Every supported protocol
    All,
}

/// Request sent to a platform session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Start peer service discovery
    DiscoverServices {
        service_type: ServiceType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    /// Connect to an LE peer
    BleConnect { address: String, secure: bool },
}

impl Request {
    /// Kind of this request
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::DiscoverServices { .. } => RequestKind::DiscoverServices,
            Request::BleConnect { .. } => RequestKind::BleConnect,
        }
    }
}

/// Request discriminant, used to script responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    DiscoverServices,
    BleConnect,
}

/// Asynchronous event delivered by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A peer reported a service
    ServiceFound {
        service_type: ServiceType,
        /// Registration type (`_ipp._tcp`) or UPnP search target
        service: String,
        instance: String,
        #[serde(default)]
        txt: BTreeMap<String, String>,
    },
    /// Discovery finished; no more services will be reported
    DiscoveryComplete,
    /// LE link established
    Connected {
        address: String,
        encrypted: bool,
        mtu: u16,
    },
    /// LE link dropped
    Disconnected { reason: String },
    /// Platform-level error for the last request
    Error { code: i32, message: String },
}

/// Platform errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("capability {0} is not available on this device")]
    Unavailable(Capability),

    #[error("capability {0} is held by another session")]
    Busy(Capability),

    #[error("session is closed")]
    Closed,

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Provider of exclusive hardware sessions
pub trait Platform {
    /// Open a session for one capability
    ///
    /// Fails with `Busy` while another session holds the same capability.
    fn open(&self, capability: &Capability) -> Result<Box<dyn Session>, PlatformError>;

    /// Number of sessions currently open
    fn open_handles(&self) -> usize;
}

/// An open, exclusive channel to one piece of hardware
pub trait Session {
    /// Capability this session holds
    fn capability(&self) -> &Capability;

    /// Send a request; responses arrive as events
    fn send(&mut self, request: Request) -> Result<(), PlatformError>;

    /// Wait up to `wait` for the next event
    fn next_event(&mut self, wait: Duration) -> Option<Event>;

    /// Release the hardware; idempotent
    fn close(&mut self);
}
