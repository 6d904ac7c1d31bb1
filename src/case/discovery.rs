//! WiFi P2P service discovery check
//!
//! The case issues one discovery request built from a `ServiceQuery` and
//! compares the reported services with the expectation. A negative check
//! (`expect = "none"`) passes only if discovery completes without a
//! matching service.

use std::collections::BTreeMap;

use cts_report::{ResultType, ResultUnit};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::ExecContext;
use super::outcome::{Failure, Outcome, Ready, SkipReason};
use super::{TestCase, TestEnv, TestId};
use crate::capability::{Capability, CapabilitySet, WIFI_P2P, WIFI_P2P_SERVICE_DISCOVERY};
use crate::platform::{Event, Request, ServiceType, Session};

/// UPnP search target matching every service
pub const UPNP_SEARCH_ALL: &str = "ssdp:all";

/// What to ask peers for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceQuery {
    /// DNS-SD PTR lookup for a service type (e.g. `_ipp._tcp`)
    DnsPtr { service: String },
    /// DNS-SD TXT lookup for one instance of a service
    DnsTxt { service: String, instance: String },
    /// UPnP search target (e.g. `upnp:rootdevice`)
    Upnp { search_target: String },
    /// Every service of every supported protocol
    All,
}

impl ServiceQuery {
    pub fn service_type(&self) -> ServiceType {
        match self {
            ServiceQuery::DnsPtr { .. } | ServiceQuery::DnsTxt { .. } => ServiceType::Bonjour,
            ServiceQuery::Upnp { .. } => ServiceType::Upnp,
            ServiceQuery::All => ServiceType::All,
        }
    }

    /// Discovery request for this query
    pub fn request(&self) -> Request {
        let query = match self {
            ServiceQuery::DnsPtr { service } => Some(service.clone()),
            ServiceQuery::DnsTxt { service, instance } => Some(format!("{}.{}", instance, service)),
            ServiceQuery::Upnp { search_target } => Some(search_target.clone()),
            ServiceQuery::All => None,
        };
        Request::DiscoverServices {
            service_type: self.service_type(),
            query,
        }
    }

    /// Whether a reported service answers this query
    pub fn accepts(&self, event: &Event) -> bool {
        let Event::ServiceFound {
            service_type,
            service,
            instance,
            ..
        } = event
        else {
            return false;
        };
        if !self.covers(*service_type) {
            return false;
        }

        match self {
            ServiceQuery::DnsPtr { service: wanted } => service == wanted,
            ServiceQuery::DnsTxt {
                service: wanted_service,
                instance: wanted,
            } => service == wanted_service && instance == wanted,
            ServiceQuery::Upnp { search_target } => {
                search_target == UPNP_SEARCH_ALL || service == search_target
            }
            ServiceQuery::All => true,
        }
    }

    /// Whether responses of `family` may answer this query at all
    pub fn covers(&self, family: ServiceType) -> bool {
        match self.service_type() {
            ServiceType::All => true,
            wanted => family == wanted,
        }
    }
}

/// Expected discovery result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// At least one matching service (or every listed instance)
    #[default]
    Found,
    /// No matching service before discovery completes
    None,
}

/// Query discriminant as written in suite files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    DnsPtr,
    DnsTxt,
    Upnp,
    All,
}

/// Suite-file parameters for a discovery case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryParams {
    pub query: QueryKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_target: Option<String>,

    #[serde(default)]
    pub expect: Expectation,

    /// Instances that must all be reported
    #[serde(default)]
    pub instances: Vec<String>,

    /// TXT entries the reported record must carry
    #[serde(default)]
    pub txt: BTreeMap<String, String>,
}

impl DiscoveryParams {
    /// Resolve the query, checking the fields each kind needs
    pub fn to_query(&self) -> Result<ServiceQuery, String> {
        fn required(value: &Option<String>, field: &str, kind: &str) -> Result<String, String> {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("query '{}' requires '{}'", kind, field))
        }

        match self.query {
            QueryKind::DnsPtr => Ok(ServiceQuery::DnsPtr {
                service: required(&self.service, "service", "dns_ptr")?,
            }),
            QueryKind::DnsTxt => Ok(ServiceQuery::DnsTxt {
                service: required(&self.service, "service", "dns_txt")?,
                instance: required(&self.instance, "instance", "dns_txt")?,
            }),
            QueryKind::Upnp => Ok(ServiceQuery::Upnp {
                search_target: required(&self.search_target, "search_target", "upnp")?,
            }),
            QueryKind::All => Ok(ServiceQuery::All),
        }
    }
}

/// WiFi P2P service discovery check
pub struct ServiceDiscoveryCase {
    id: TestId,
    requires: CapabilitySet,
    query: ServiceQuery,
    expect: Expectation,
    instances: Vec<String>,
    txt: BTreeMap<String, String>,
    session: Option<Box<dyn Session>>,
}

impl ServiceDiscoveryCase {
    /// Expect at least one service answering `query`
    pub fn new(id: TestId, query: ServiceQuery) -> Self {
        Self {
            id,
            requires: Self::implicit_requirements(),
            query,
            expect: Expectation::Found,
            instances: Vec::new(),
            txt: BTreeMap::new(),
            session: None,
        }
    }

    /// Build from suite-file parameters
    pub fn from_params(id: TestId, params: &DiscoveryParams) -> Result<Self, String> {
        let query = params.to_query()?;
        if params.expect == Expectation::None && !params.instances.is_empty() {
            return Err("'instances' cannot be combined with expect = \"none\"".to_string());
        }
        Ok(Self {
            expect: params.expect,
            instances: params.instances.clone(),
            txt: params.txt.clone(),
            ..Self::new(id, query)
        })
    }

    /// Capabilities every discovery case needs
    pub fn implicit_requirements() -> CapabilitySet {
        [WIFI_P2P, WIFI_P2P_SERVICE_DISCOVERY]
            .into_iter()
            .map(Capability::builtin)
            .collect()
    }

    /// Require every listed instance
    pub fn expecting(mut self, instances: Vec<String>) -> Self {
        self.instances = instances;
        self
    }

    /// Require that no service answers
    pub fn expecting_none(mut self) -> Self {
        self.expect = Expectation::None;
        self
    }

    /// Require TXT entries on the reported record
    pub fn with_txt(mut self, txt: BTreeMap<String, String>) -> Self {
        self.txt = txt;
        self
    }

    /// Add requirements beyond the implicit ones
    pub fn with_requirements(mut self, extra: &CapabilitySet) -> Self {
        self.requires.extend(extra);
        self
    }

    fn check_txt(&self, instance: &str, txt: &BTreeMap<String, String>) -> Result<(), Failure> {
        for (key, expected) in &self.txt {
            match txt.get(key) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(Failure::protocol_mismatch(format!(
                        "{}: TXT '{}' is '{}', expected '{}'",
                        instance, key, actual, expected
                    )))
                }
                None => {
                    return Err(Failure::protocol_mismatch(format!(
                        "{}: TXT record lacks '{}'",
                        instance, key
                    )))
                }
            }
        }
        Ok(())
    }

    fn all_expected_found(&self, found: &[String]) -> bool {
        !self.instances.is_empty() && self.instances.iter().all(|i| found.contains(i))
    }
}

impl TestCase for ServiceDiscoveryCase {
    fn id(&self) -> &TestId {
        &self.id
    }

    fn requirements(&self) -> &CapabilitySet {
        &self.requires
    }

    fn prepare(&mut self, env: &TestEnv) -> Result<Ready, SkipReason> {
        let capability = Capability::builtin(WIFI_P2P_SERVICE_DISCOVERY);
        self.session = Some(env.platform.open(&capability)?);
        Ok(Ready)
    }

    fn execute(&mut self, ctx: &mut ExecContext) -> Result<Outcome, Failure> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| Failure::platform("discovery session not open"))?;
        let result = self.discover(ctx, session.as_mut());
        self.session = Some(session);
        result
    }

    fn cleanup(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

impl ServiceDiscoveryCase {
    fn discover(&self, ctx: &mut ExecContext, session: &mut dyn Session) -> Result<Outcome, Failure> {
        session.send(self.query.request())?;

        let mut found: Vec<String> = Vec::new();
        let mut first_match_ms: Option<f64> = None;

        loop {
            let event = ctx.await_event(session)?;
            match &event {
                Event::ServiceFound { instance, txt, .. } if self.query.accepts(&event) => {
                    if self.expect == Expectation::None {
                        return Err(Failure::protocol_mismatch(format!(
                            "unexpected service response from '{}'",
                            instance
                        )));
                    }
                    self.check_txt(instance, txt)?;

                    first_match_ms.get_or_insert(ctx.elapsed().as_secs_f64() * 1000.0);
                    if !found.contains(instance) {
                        found.push(instance.clone());
                    }
                    if self.all_expected_found(&found) {
                        break;
                    }
                }
                Event::ServiceFound {
                    service_type,
                    instance,
                    ..
                } if !self.query.covers(*service_type) => {
                    return Err(Failure::protocol_mismatch(format!(
                        "{:?} response from '{}' to a {:?} query",
                        service_type,
                        instance,
                        self.query.service_type()
                    )));
                }
                Event::ServiceFound {
                    service, instance, ..
                } => {
                    debug!(test = %self.id, service = %service, instance = %instance, "service does not answer query");
                }
                Event::DiscoveryComplete => break,
                Event::Error { code, message } => {
                    return Err(Failure::unexpected_response(format!(
                        "discovery error {}: {}",
                        code, message
                    )))
                }
                other => {
                    return Err(Failure::unexpected_response(format!(
                        "unexpected event during discovery: {:?}",
                        other
                    )))
                }
            }
        }

        if self.expect == Expectation::None {
            ctx.record("services_found", 0.0, ResultUnit::Count, ResultType::Neutral)?;
            return Ok(Outcome::with_detail("no matching service, as expected"));
        }

        let Some(latency_ms) = first_match_ms else {
            return Err(Failure::protocol_mismatch(
                "discovery completed without a matching service",
            ));
        };

        let missing: Vec<&str> = self
            .instances
            .iter()
            .filter(|i| !found.contains(i))
            .map(|i| i.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Failure::protocol_mismatch(format!(
                "instances not reported: {}",
                missing.join(", ")
            )));
        }

        ctx.record(
            "discovery_latency_ms",
            latency_ms,
            ResultUnit::Ms,
            ResultType::LowerBetter,
        )?;
        ctx.record(
            "services_found",
            found.len() as f64,
            ResultUnit::Count,
            ResultType::Neutral,
        )?;

        Ok(Outcome::with_detail(format!("found {}", found.join(", "))))
    }
}
