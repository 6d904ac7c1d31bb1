//! Bluetooth LE connection check

use cts_report::{ResultType, ResultUnit};
use serde::{Deserialize, Serialize};

use super::context::ExecContext;
use super::outcome::{Failure, Outcome, Ready, SkipReason};
use super::{TestCase, TestEnv, TestId};
use crate::capability::{Capability, CapabilitySet, BLE, BLE_SECURE};
use crate::platform::{Event, Request, Session};

fn default_secure() -> bool {
    true
}

/// Suite-file parameters for a BLE connect case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BleConnectParams {
    /// Peer address (e.g. "AA:BB:CC:DD:EE:FF")
    pub address: String,

    /// Request an encrypted (bonded) link
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// Override whether the link must report encryption; defaults to `secure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_encryption: Option<bool>,

    /// Smallest acceptable negotiated MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_mtu: Option<u16>,
}

/// Connect to an LE peer and verify the link
pub struct BleConnectCase {
    id: TestId,
    requires: CapabilitySet,
    address: String,
    secure: bool,
    require_encryption: bool,
    min_mtu: Option<u16>,
    session: Option<Box<dyn Session>>,
}

impl BleConnectCase {
    /// Secure connection to `address`
    pub fn new(id: TestId, address: impl Into<String>) -> Self {
        Self {
            id,
            requires: Self::implicit_requirements(true),
            address: address.into(),
            secure: true,
            require_encryption: true,
            min_mtu: None,
            session: None,
        }
    }

    pub fn from_params(id: TestId, params: &BleConnectParams) -> Result<Self, String> {
        if params.address.trim().is_empty() {
            return Err("'address' must not be empty".to_string());
        }
        let mut case = Self::new(id, params.address.clone());
        if !params.secure {
            case = case.insecure();
        }
        case.require_encryption = params.require_encryption.unwrap_or(params.secure);
        case.min_mtu = params.min_mtu;
        Ok(case)
    }

    /// Capabilities a connect case needs
    pub fn implicit_requirements(secure: bool) -> CapabilitySet {
        let mut set: CapabilitySet = std::iter::once(Capability::builtin(BLE)).collect();
        if secure {
            set.insert(Capability::builtin(BLE_SECURE));
        }
        set
    }

    /// Plain (unencrypted) connection
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self.require_encryption = false;
        self.requires = Self::implicit_requirements(false);
        self
    }

    pub fn with_min_mtu(mut self, mtu: u16) -> Self {
        self.min_mtu = Some(mtu);
        self
    }

    pub fn with_requirements(mut self, extra: &CapabilitySet) -> Self {
        self.requires.extend(extra);
        self
    }

    fn connect(&self, ctx: &mut ExecContext, session: &mut dyn Session) -> Result<Outcome, Failure> {
        session.send(Request::BleConnect {
            address: self.address.clone(),
            secure: self.secure,
        })?;

        match ctx.await_event(session)? {
            Event::Connected {
                address,
                encrypted,
                mtu,
            } => {
                if !address.eq_ignore_ascii_case(&self.address) {
                    return Err(Failure::protocol_mismatch(format!(
                        "connected to {}, expected {}",
                        address, self.address
                    )));
                }
                if self.require_encryption && !encrypted {
                    return Err(Failure::protocol_mismatch(format!(
                        "link to {} is not encrypted",
                        address
                    )));
                }
                if let Some(min) = self.min_mtu {
                    if mtu < min {
                        return Err(Failure::protocol_mismatch(format!(
                            "negotiated MTU {} below minimum {}",
                            mtu, min
                        )));
                    }
                }

                let latency_ms = ctx.elapsed().as_secs_f64() * 1000.0;
                ctx.record_summary(
                    "connect_latency_ms",
                    latency_ms,
                    ResultUnit::Ms,
                    ResultType::LowerBetter,
                )?;
                ctx.record(
                    "negotiated_mtu",
                    f64::from(mtu),
                    ResultUnit::Byte,
                    ResultType::HigherBetter,
                )?;

                Ok(Outcome::with_detail(format!(
                    "connected to {} (mtu {}, encrypted: {})",
                    address, mtu, encrypted
                )))
            }
            Event::Disconnected { reason } => Err(Failure::unexpected_response(format!(
                "disconnected before connecting: {}",
                reason
            ))),
            Event::Error { code, message } => Err(Failure::unexpected_response(format!(
                "connect error {}: {}",
                code, message
            ))),
            other => Err(Failure::unexpected_response(format!(
                "unexpected event during connect: {:?}",
                other
            ))),
        }
    }
}

impl TestCase for BleConnectCase {
    fn id(&self) -> &TestId {
        &self.id
    }

    fn requirements(&self) -> &CapabilitySet {
        &self.requires
    }

    fn prepare(&mut self, env: &TestEnv) -> Result<Ready, SkipReason> {
        let capability = if self.secure {
            Capability::builtin(BLE_SECURE)
        } else {
            Capability::builtin(BLE)
        };
        self.session = Some(env.platform.open(&capability)?);
        Ok(Ready)
    }

    fn execute(&mut self, ctx: &mut ExecContext) -> Result<Outcome, Failure> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| Failure::platform("LE session not open"))?;
        let result = self.connect(ctx, session.as_mut());
        self.session = Some(session);
        result
    }

    fn cleanup(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}
