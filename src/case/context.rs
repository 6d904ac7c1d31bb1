//! Execution context handed to `TestCase::execute`
//!
//! All waiting on the platform goes through the context. Each wait is one
//! poll slice, and between slices the context checks the per-test deadline
//! and the suite cancellation token.

use std::time::Duration;

use cts_report::{MetricReportLog, MetricValue, ReportError, ResultType, ResultUnit};
use tracing::trace;

use super::outcome::{Failure, FailureCause};
use super::TestId;
use crate::platform::{Event, Session};
use crate::signal::CancelToken;
use crate::timeout::{TimeoutConfig, TimeoutEnforcer};

/// Deadline, cancellation and metric recording for one test execution
#[derive(Debug)]
pub struct ExecContext {
    test: TestId,
    enforcer: TimeoutEnforcer,
    cancel: CancelToken,
    log: MetricReportLog,
}

impl ExecContext {
    /// Start a context; the deadline clock starts now
    pub fn new(test: TestId, abi: &str, timeouts: TimeoutConfig, cancel: CancelToken) -> Self {
        let log = MetricReportLog::new(test.key(abi));
        Self {
            test,
            enforcer: TimeoutEnforcer::new(timeouts),
            cancel,
            log,
        }
    }

    pub fn test_id(&self) -> &TestId {
        &self.test
    }

    /// Fail with `Cancelled` if the suite was cancelled
    pub fn check_cancelled(&self) -> Result<(), Failure> {
        if self.cancel.is_cancelled() {
            return Err(Failure::cancelled("suite cancelled"));
        }
        Ok(())
    }

    /// Wait for the next event from `session`
    ///
    /// Fails with `Cancelled` or `TimedOut` at the first slice boundary after
    /// the condition holds. A session that never answers ends in `TimedOut`.
    pub fn await_event(&mut self, session: &mut dyn Session) -> Result<Event, Failure> {
        loop {
            self.check_cancelled()?;
            if self.enforcer.check().is_timeout() {
                return Err(Failure::timed_out(format!(
                    "no callback from {} within {} ms",
                    session.capability(),
                    self.enforcer.config().test_timeout.as_millis()
                )));
            }

            if let Some(event) = session.next_event(self.enforcer.next_wait()) {
                trace!(test = %self.test, ?event, "callback");
                return Ok(event);
            }
        }
    }

    /// Wait for an event accepted by `accept`, dropping others
    pub fn await_matching<F>(&mut self, session: &mut dyn Session, mut accept: F) -> Result<Event, Failure>
    where
        F: FnMut(&Event) -> bool,
    {
        loop {
            let event = self.await_event(session)?;
            if accept(&event) {
                return Ok(event);
            }
            trace!(test = %self.test, ?event, "ignored callback");
        }
    }

    /// Record a detail metric; a name may be recorded once per test
    pub fn record(
        &mut self,
        name: &str,
        value: impl Into<MetricValue>,
        unit: ResultUnit,
        result_type: ResultType,
    ) -> Result<(), Failure> {
        self.log
            .add_value(name, value, unit, result_type)
            .map_err(metric_failure)
    }

    /// Record the headline metric
    pub fn record_summary(
        &mut self,
        name: &str,
        value: f64,
        unit: ResultUnit,
        result_type: ResultType,
    ) -> Result<(), Failure> {
        self.log
            .set_summary(name, value, unit, result_type)
            .map_err(metric_failure)
    }

    /// Time since execution started
    pub fn elapsed(&self) -> Duration {
        self.enforcer.elapsed()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.enforcer.remaining()
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.enforcer.check().is_timeout()
    }

    /// Number of metrics recorded so far
    pub fn metrics_recorded(&self) -> usize {
        self.log.len()
    }

    /// Hand the recorded metrics back to the runner
    pub(crate) fn into_log(self) -> MetricReportLog {
        self.log
    }
}

fn metric_failure(err: ReportError) -> Failure {
    let cause = match err {
        ReportError::DuplicateMetric { .. } => FailureCause::DuplicateMetric,
        _ => FailureCause::InvalidMetric,
    };
    Failure::new(cause, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, CapabilitySet, BLE};
    use crate::platform::{Platform, SimPlatform};
    use std::time::Instant;

    fn ctx(timeout_ms: u64, cancel: CancelToken) -> ExecContext {
        ExecContext::new(
            TestId::parse("ble.Connect#secure").unwrap(),
            "arm64-v8a",
            TimeoutConfig::from_millis(timeout_ms, 5),
            cancel,
        )
    }

    fn silent_session() -> Box<dyn Session> {
        let platform = SimPlatform::new(CapabilitySet::parse([BLE]).unwrap());
        platform.open(&Capability::new(BLE).unwrap()).unwrap()
    }

    #[test]
    fn test_silent_session_times_out() {
        let mut ctx = ctx(40, CancelToken::new());
        let mut session = silent_session();

        let start = Instant::now();
        let err = ctx.await_event(session.as_mut()).unwrap_err();
        assert_eq!(err.cause, FailureCause::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(ctx.is_expired());
    }

    #[test]
    fn test_cancel_observed_at_boundary() {
        let cancel = CancelToken::new();
        let mut ctx = ctx(10_000, cancel.clone());
        let mut session = silent_session();
        cancel.cancel();

        let err = ctx.await_event(session.as_mut()).unwrap_err();
        assert_eq!(err.cause, FailureCause::Cancelled);
    }

    #[test]
    fn test_duplicate_metric_maps_to_failure() {
        let mut ctx = ctx(1000, CancelToken::new());
        ctx.record("mtu", 247.0, ResultUnit::Byte, ResultType::HigherBetter)
            .unwrap();
        let err = ctx
            .record("mtu", 23.0, ResultUnit::Byte, ResultType::HigherBetter)
            .unwrap_err();
        assert_eq!(err.cause, FailureCause::DuplicateMetric);
        assert_eq!(ctx.metrics_recorded(), 1);
    }

    #[test]
    fn test_invalid_metric_maps_to_failure() {
        let mut ctx = ctx(1000, CancelToken::new());
        let err = ctx
            .record("bad", f64::INFINITY, ResultUnit::None, ResultType::Neutral)
            .unwrap_err();
        assert_eq!(err.cause, FailureCause::InvalidMetric);
    }

    #[test]
    fn test_log_is_keyed_by_abi() {
        let mut ctx = ctx(1000, CancelToken::new());
        ctx.record_summary("latency", 3.0, ResultUnit::Ms, ResultType::LowerBetter)
            .unwrap();
        let log = ctx.into_log();
        assert_eq!(log.key.abi, "arm64-v8a");
        assert_eq!(log.key.class_method(), "ble.Connect#secure");
        assert!(log.summary.is_some());
    }
}
