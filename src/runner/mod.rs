//! Suite runner
//!
//! Runs test cases sequentially: they contend for exclusive hardware.
//!
//! Per test:
//! 1. cancelled suite: `Failure{Cancelled}` without preparing
//! 2. missing capability: `Skipped`
//! 3. `prepare`; a `SkipReason` is `Skipped`
//! 4. `execute` under a fresh deadline; a result after the deadline is
//!    `Failure{TimedOut}`, a panic is `Error`
//! 5. `cleanup`, exactly once, on every path above
//!
//! One test's outcome never stops the suite. After the last test the sink
//! is flushed to the host collector (REPORTING), then the suite is DONE.

mod state;

pub use state::{CurrentTest, SuiteState, SuiteStateData, SuiteStateError, TestPhase};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use cts_report::{FlushReceipt, HostCollector, ReportError, ReportSink};
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::case::{ExecContext, Failure, SkipReason, TestCase, TestEnv};
use crate::signal::CancelToken;
use crate::summary::{ExitCode, ReportStatus, Status, SuiteSummary, TestResult};
use crate::timeout::TimeoutConfig;

/// Suite-level settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub suite_name: String,

    /// ABI every report log is keyed under
    pub abi: String,

    pub timeouts: TimeoutConfig,
}

impl RunnerConfig {
    pub fn new(suite_name: impl Into<String>, abi: impl Into<String>, timeouts: TimeoutConfig) -> Self {
        Self {
            suite_name: suite_name.into(),
            abi: abi.into(),
            timeouts,
        }
    }
}

/// Everything a finished suite leaves behind
#[derive(Debug)]
pub struct SuiteRun {
    pub summary: SuiteSummary,
    pub state: SuiteStateData,
    pub sink: ReportSink,
}

impl SuiteRun {
    /// Re-send unsent logs without re-running any test
    pub fn retry_flush(&mut self, collector: &mut dyn HostCollector) -> Result<FlushReceipt, ReportError> {
        let result = self.sink.flush(collector);
        let report = report_status(&self.summary.report, &self.sink, &result);
        self.summary.set_report(report);
        result
    }

    pub fn exit_code(&self) -> ExitCode {
        self.summary.exit_code_enum().unwrap_or(ExitCode::TestError)
    }
}

/// Delivery state after a flush attempt
///
/// A flush with nothing left to send keeps the record of the batch that was
/// delivered before it.
pub fn report_status(
    previous: &ReportStatus,
    sink: &ReportSink,
    flush: &Result<FlushReceipt, ReportError>,
) -> ReportStatus {
    let pending = sink.unsent_count();
    match flush {
        Ok(receipt) if receipt.sent == 0 && pending == 0 => ReportStatus {
            flushed: true,
            pending: 0,
            error: None,
            ..previous.clone()
        },
        Ok(receipt) => ReportStatus {
            flushed: pending == 0,
            logs_sent: receipt.sent,
            pending,
            batch_id: receipt.batch_id.clone(),
            location: receipt.location.clone(),
            error: None,
            dir: previous.dir.clone(),
        },
        Err(e) => ReportStatus {
            flushed: false,
            logs_sent: 0,
            pending,
            batch_id: None,
            location: None,
            error: Some(e.to_string()),
            dir: previous.dir.clone(),
        },
    }
}

/// Sequential suite runner
pub struct TestRunner {
    config: RunnerConfig,
    cases: Vec<Box<dyn TestCase>>,
    cancel: CancelToken,
    state_path: Option<PathBuf>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig, cases: Vec<Box<dyn TestCase>>) -> Self {
        Self {
            config,
            cases,
            cancel: CancelToken::new(),
            state_path: None,
        }
    }

    /// Share a cancellation token (e.g. with the signal handler)
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Persist suite_state.json at every state change
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Run every case, then flush reports to `collector`
    pub fn run(self, env: &TestEnv, collector: &mut dyn HostCollector) -> SuiteRun {
        let TestRunner {
            config,
            mut cases,
            cancel,
            state_path,
        } = self;
        let state_path = state_path.as_deref();

        let suite_id = Ulid::new().to_string().to_lowercase();
        let mut state = SuiteStateData::new(suite_id.clone(), cases.len());
        let mut sink = ReportSink::new();
        let started = Instant::now();

        info!(suite = %config.suite_name, suite_id = %suite_id, tests = cases.len(), abi = %config.abi, "suite started");
        advance(&mut state, SuiteState::Preparing, state_path);
        advance(&mut state, SuiteState::Running, state_path);

        let mut results = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter_mut().enumerate() {
            let result = run_case(case.as_mut(), index, env, &config, &cancel, &mut sink, &mut state);
            state.complete_test();
            persist(&state, state_path);
            results.push(result);
        }

        advance(&mut state, SuiteState::Reporting, state_path);
        let flush = sink.flush(collector);
        if let Err(e) = &flush {
            error!(error = %e, pending = sink.unsent_count(), "report flush failed");
        }
        let report = report_status(&ReportStatus::default(), &sink, &flush);
        advance(&mut state, SuiteState::Done, state_path);

        let summary = SuiteSummary::new(
            suite_id,
            config.suite_name.clone(),
            config.abi.clone(),
            results,
            cancel.is_cancelled(),
            started.elapsed().as_millis() as u64,
        )
        .with_report(report);

        info!(status = ?summary.status, exit_code = summary.exit_code, "{}", summary.human_summary);
        SuiteRun {
            summary,
            state,
            sink,
        }
    }
}

fn advance(state: &mut SuiteStateData, next: SuiteState, path: Option<&Path>) {
    if let Err(e) = state.transition(next) {
        error!(error = %e, "suite state");
        return;
    }
    debug!(state = ?next, seq = state.seq, "suite state changed");
    persist(state, path);
}

fn persist(state: &SuiteStateData, path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(e) = state.write_to_file(path) {
            warn!(path = %path.display(), error = %e, "could not write suite state");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// One test, start to finish; `cleanup` runs exactly once whatever happens
#[tracing::instrument(name = "test", skip_all, fields(test = %case.id(), index = index))]
fn run_case(
    case: &mut dyn TestCase,
    index: usize,
    env: &TestEnv,
    config: &RunnerConfig,
    cancel: &CancelToken,
    sink: &mut ReportSink,
    state: &mut SuiteStateData,
) -> TestResult {
    let started_at = Utc::now();
    let result = attempt(case, index, env, config, cancel, sink, state);

    let id = case.id().to_string();
    state.set_current_test(index, &id, TestPhase::Cleanup);
    let result = match catch_unwind(AssertUnwindSafe(|| case.cleanup())) {
        Ok(()) => result,
        Err(payload) => {
            let message = format!("cleanup panicked: {}", panic_message(payload.as_ref()));
            error!(test = %id, "{}", message);
            if result.status.is_failure() {
                result
            } else {
                TestResult::failed(case.id().clone(), started_at, &Failure::panicked(message))
                    .with_metrics(result.metrics)
            }
        }
    };

    let leaked = env.platform.open_handles();
    if leaked > 0 {
        warn!(test = %id, handles = leaked, "platform handles still open after cleanup");
    }

    match result.status {
        Status::Pass | Status::Skipped => {
            info!(test = %id, status = ?result.status, duration_ms = result.duration_ms, "test finished")
        }
        _ => warn!(
            test = %id,
            status = ?result.status,
            cause = ?result.cause,
            detail = result.detail.as_deref().unwrap_or(""),
            "test finished"
        ),
    }
    result
}

/// Everything before cleanup
fn attempt(
    case: &mut dyn TestCase,
    index: usize,
    env: &TestEnv,
    config: &RunnerConfig,
    cancel: &CancelToken,
    sink: &mut ReportSink,
    state: &mut SuiteStateData,
) -> TestResult {
    let id = case.id().clone();
    let started_at = Utc::now();

    if cancel.is_cancelled() {
        return TestResult::failed(id, started_at, &Failure::cancelled("suite cancelled before test started"));
    }

    let missing = env.device.missing(case.requirements());
    if !missing.is_empty() {
        return TestResult::skipped(id, started_at, &SkipReason::MissingCapabilities(missing));
    }

    state.set_current_test(index, &id.to_string(), TestPhase::Prepare);
    match catch_unwind(AssertUnwindSafe(|| case.prepare(env))) {
        Ok(Ok(_ready)) => {}
        Ok(Err(reason)) => return TestResult::skipped(id, started_at, &reason),
        Err(payload) => {
            let message = format!("prepare panicked: {}", panic_message(payload.as_ref()));
            return TestResult::failed(id, started_at, &Failure::panicked(message));
        }
    }

    state.set_current_test(index, &id.to_string(), TestPhase::Execute);
    let mut ctx = ExecContext::new(id.clone(), &config.abi, config.timeouts, cancel.clone());
    let executed = catch_unwind(AssertUnwindSafe(|| case.execute(&mut ctx)));

    let outcome = match executed {
        Ok(Ok(_)) if ctx.is_expired() => Err(Failure::timed_out(format!(
            "result arrived after the {} ms deadline",
            config.timeouts.test_timeout.as_millis()
        ))),
        Ok(result) => result,
        Err(payload) => Err(Failure::panicked(panic_message(payload.as_ref()))),
    };

    let log = ctx.into_log();
    let metrics = log.len();
    if !log.is_empty() {
        sink.submit(log);
    }

    let result = match outcome {
        Ok(outcome) => TestResult::passed(id, started_at, outcome.detail),
        Err(failure) => TestResult::failed(id, started_at, &failure),
    };
    result.with_metrics(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilitySet, DeviceProfile, BLE};
    use crate::case::FailureCause;
    use crate::mock::{MockBehavior, MockCase};
    use crate::platform::SimPlatform;
    use cts_report::MemoryCollector;
    use std::time::Duration;

    fn env(capabilities: &[&str]) -> TestEnv {
        let caps = CapabilitySet::parse(capabilities.iter().copied()).unwrap();
        TestEnv::new(
            DeviceProfile::new("sim", "x86_64", caps.clone()),
            Box::new(SimPlatform::new(caps)),
        )
    }

    fn runner(cases: Vec<Box<dyn TestCase>>, timeout_ms: u64) -> TestRunner {
        TestRunner::new(
            RunnerConfig::new("unit", "x86_64", TimeoutConfig::from_millis(timeout_ms, 5)),
            cases,
        )
    }

    #[test]
    fn test_late_result_is_timeout() {
        let case = MockCase::new("a.Late#slow", MockBehavior::Late(Duration::from_millis(60))).unwrap();
        let counts = case.counts();
        let run = runner(vec![Box::new(case)], 20).run(&env(&[]), &mut MemoryCollector::new());

        let result = &run.summary.results[0];
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.cause, Some(FailureCause::TimedOut));
        assert_eq!(counts.cleanup(), 1);
    }

    #[test]
    fn test_panic_is_error_and_cleanup_runs() {
        let case = MockCase::new("a.Boom#execute", MockBehavior::Panic).unwrap();
        let counts = case.counts();
        let run = runner(vec![Box::new(case)], 1000).run(&env(&[]), &mut MemoryCollector::new());

        let result = &run.summary.results[0];
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.cause, Some(FailureCause::Panicked));
        assert!(result.detail.as_deref().unwrap_or("").contains("mock case panicked"));
        assert_eq!(counts.cleanup(), 1);
        assert_eq!(run.summary.exit_code, 20);
    }

    #[test]
    fn test_duplicate_metric_is_error() {
        let case = MockCase::new(
            "a.Metrics#twice",
            MockBehavior::DuplicateMetric {
                name: "found".to_string(),
            },
        )
        .unwrap();
        let run = runner(vec![Box::new(case)], 1000).run(&env(&[]), &mut MemoryCollector::new());

        let result = &run.summary.results[0];
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.cause, Some(FailureCause::DuplicateMetric));
        // The first value was kept
        assert_eq!(result.metrics, 1);
    }

    #[test]
    fn test_hang_on_silent_session_times_out() {
        let case = MockCase::new(
            "bluetooth.le.Connect#hang",
            MockBehavior::Hang {
                capability: crate::capability::Capability::new(BLE).unwrap(),
            },
        )
        .unwrap();
        let counts = case.counts();
        let env = env(&[BLE]);
        let run = runner(vec![Box::new(case)], 30).run(&env, &mut MemoryCollector::new());

        assert_eq!(run.summary.results[0].cause, Some(FailureCause::TimedOut));
        assert_eq!(counts.cleanup(), 1);
        assert_eq!(env.platform.open_handles(), 0);
        assert_eq!(run.state.state, SuiteState::Done);
    }

    #[test]
    fn test_cancelled_before_start() {
        let a = MockCase::pass("a.A#one").unwrap();
        let counts = a.counts();
        let runner = runner(vec![Box::new(a)], 1000);
        runner.cancel_token().cancel();

        let run = runner.run(&env(&[]), &mut MemoryCollector::new());
        assert_eq!(run.summary.results[0].cause, Some(FailureCause::Cancelled));
        assert_eq!(counts.prepare(), 0);
        assert_eq!(counts.cleanup(), 1);
        assert!(run.summary.cancelled);
        assert_eq!(run.summary.exit_code, 80);
    }

    #[test]
    fn test_state_file_written() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("suite_state.json");
        let run = runner(vec![Box::new(MockCase::pass("a.A#one").unwrap())], 1000)
            .with_state_file(&path)
            .run(&env(&[]), &mut MemoryCollector::new());

        let saved = SuiteStateData::from_file(&path).unwrap();
        assert_eq!(saved.state, SuiteState::Done);
        assert_eq!(saved.completed, 1);
        assert_eq!(saved.suite_id, run.summary.suite_id);
    }

    #[test]
    fn test_empty_retry_keeps_delivered_batch() {
        let case = MockCase::new(
            "a.Metrics#once",
            MockBehavior::Pass {
                metrics: vec![("found".to_string(), 1.0)],
            },
        )
        .unwrap();
        let mut collector = MemoryCollector::new();
        let mut run = runner(vec![Box::new(case)], 1000).run(&env(&[]), &mut collector);
        run.summary.report.dir = Some("reports".to_string());
        let delivered = run.summary.report.clone();
        assert_eq!(delivered.logs_sent, 1);
        assert!(delivered.batch_id.is_some());

        let receipt = run.retry_flush(&mut collector).unwrap();
        assert_eq!(receipt.sent, 0);
        assert_eq!(run.summary.report, delivered);
        assert_eq!(run.exit_code(), ExitCode::Success);
    }

    #[test]
    fn test_failed_flush_then_retry_records_batch() {
        let case = MockCase::new(
            "a.Metrics#once",
            MockBehavior::Pass {
                metrics: vec![("found".to_string(), 1.0)],
            },
        )
        .unwrap();
        let mut collector = MemoryCollector::new();
        collector.fail_next(1);
        let mut run = runner(vec![Box::new(case)], 1000).run(&env(&[]), &mut collector);
        assert_eq!(run.summary.report.pending, 1);
        assert!(run.summary.report.batch_id.is_none());

        run.retry_flush(&mut collector).unwrap();
        assert!(run.summary.report.flushed);
        assert_eq!(run.summary.report.logs_sent, 1);
        assert_eq!(run.summary.report.location.as_deref(), Some("memory"));
        assert!(run.summary.report.error.is_none());
    }
}
