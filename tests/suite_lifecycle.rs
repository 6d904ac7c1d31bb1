//! Suite lifecycle tests: outcome accounting, cleanup, timeouts, skips,
//! cancellation and report delivery through the runner

use cts_harness::capability::{Capability, CapabilitySet, DeviceProfile, BLE};
use cts_harness::case::FailureCause;
use cts_harness::mock::{MockBehavior, MockCase};
use cts_harness::runner::{RunnerConfig, SuiteState, TestRunner};
use cts_harness::{CancelToken, Failure, SimPlatform, Status, TestCase, TestEnv, TimeoutConfig};
use cts_report::{MemoryCollector, ReportSink, TestKey};

fn env(capabilities: &[&str]) -> TestEnv {
    let caps = CapabilitySet::parse(capabilities.iter().copied()).unwrap();
    TestEnv::new(
        DeviceProfile::new("sim", "arm64-v8a", caps.clone()),
        Box::new(SimPlatform::new(caps)),
    )
}

fn config(timeout_ms: u64) -> RunnerConfig {
    RunnerConfig::new("lifecycle", "arm64-v8a", TimeoutConfig::from_millis(timeout_ms, 5))
}

fn metrics(names: &[&str]) -> Vec<(String, f64)> {
    names.iter().map(|n| (n.to_string(), 1.0)).collect()
}

fn key(id: &str) -> TestKey {
    TestKey::parse(id, "arm64-v8a").unwrap()
}

fn has_log(sink: &ReportSink, id: &str) -> bool {
    sink.log(&key(id)).is_some()
}

#[test]
fn test_pass_fail_skip_aggregation() {
    let a = MockCase::new("suite.Mixed#a", MockBehavior::Pass { metrics: metrics(&["latency"]) }).unwrap();
    let b = MockCase::new(
        "suite.Mixed#b",
        MockBehavior::Fail {
            metrics: metrics(&["latency"]),
            failure: Failure::protocol_mismatch("wrong instance"),
        },
    )
    .unwrap();
    let c = MockCase::pass("suite.Mixed#c")
        .unwrap()
        .requiring(CapabilitySet::parse([BLE]).unwrap());
    let c_counts = c.counts();

    let cases: Vec<Box<dyn TestCase>> = vec![Box::new(a), Box::new(b), Box::new(c)];
    let mut collector = MemoryCollector::new();
    let run = TestRunner::new(config(1000), cases).run(&env(&[]), &mut collector);

    let statuses: Vec<Status> = run.summary.results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Fail, Status::Skipped]);
    assert_eq!(run.summary.status, Status::Fail);
    assert_eq!(run.summary.exit_code, 10);

    assert!(has_log(&run.sink, "suite.Mixed#a"));
    assert!(has_log(&run.sink, "suite.Mixed#b"));
    assert!(!has_log(&run.sink, "suite.Mixed#c"));
    assert_eq!(run.summary.results[2].metrics, 0);

    // The skipped case never reached prepare but still got its cleanup
    assert_eq!(c_counts.prepare(), 0);
    assert_eq!(c_counts.cleanup(), 1);

    assert_eq!(collector.batches().len(), 1);
    assert_eq!(collector.batches()[0].len(), 2);
    assert!(run.summary.report.flushed);
}

#[test]
fn test_every_case_gets_one_outcome_and_one_cleanup() {
    let behaviors = vec![
        MockBehavior::Pass { metrics: Vec::new() },
        MockBehavior::Fail {
            metrics: Vec::new(),
            failure: Failure::unexpected_response("disconnected"),
        },
        MockBehavior::Skip(cts_harness::SkipReason::Unavailable("radio off".to_string())),
        MockBehavior::Late(std::time::Duration::from_millis(40)),
        MockBehavior::Panic,
    ];

    let mut counts = Vec::new();
    let mut cases: Vec<Box<dyn TestCase>> = Vec::new();
    for (i, behavior) in behaviors.into_iter().enumerate() {
        let case = MockCase::new(&format!("suite.Paths#case{}", i), behavior).unwrap();
        counts.push(case.counts());
        cases.push(Box::new(case));
    }

    let run = TestRunner::new(config(20), cases).run(&env(&[]), &mut MemoryCollector::new());

    assert_eq!(run.summary.results.len(), counts.len());
    assert_eq!(run.summary.test_count, counts.len());
    for c in &counts {
        assert_eq!(c.cleanup(), 1);
    }
    assert_eq!(counts[2].execute(), 0);
    assert_eq!(run.summary.results[2].status, Status::Skipped);
    assert_eq!(run.summary.results[3].cause, Some(FailureCause::TimedOut));
    assert_eq!(run.summary.results[4].status, Status::Error);
    assert_eq!(run.summary.status, Status::Error);
    assert_eq!(run.state.state, SuiteState::Done);
    assert_eq!(run.state.completed, counts.len());
}

#[test]
fn test_silent_hardware_times_out_and_suite_continues() {
    let hang = MockCase::new(
        "bluetooth.le.Connect#silent",
        MockBehavior::Hang {
            capability: Capability::new(BLE).unwrap(),
        },
    )
    .unwrap();
    let after = MockCase::pass("suite.After#next").unwrap();
    let after_counts = after.counts();

    let env = env(&[BLE]);
    let cases: Vec<Box<dyn TestCase>> = vec![Box::new(hang), Box::new(after)];
    let run = TestRunner::new(config(30), cases).run(&env, &mut MemoryCollector::new());

    assert_eq!(run.summary.results[0].status, Status::Fail);
    assert_eq!(run.summary.results[0].cause, Some(FailureCause::TimedOut));
    assert_eq!(run.summary.results[1].status, Status::Pass);
    assert_eq!(after_counts.execute(), 1);
    assert_eq!(env.platform.open_handles(), 0);
}

#[test]
fn test_cancelled_suite_records_every_test() {
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut counts = Vec::new();
    let mut cases: Vec<Box<dyn TestCase>> = Vec::new();
    for i in 0..3 {
        let case = MockCase::pass(&format!("suite.Cancel#t{}", i)).unwrap();
        counts.push(case.counts());
        cases.push(Box::new(case));
    }

    let run = TestRunner::new(config(1000), cases)
        .with_cancel_token(cancel)
        .run(&env(&[]), &mut MemoryCollector::new());

    assert_eq!(run.summary.results.len(), 3);
    assert!(run
        .summary
        .results
        .iter()
        .all(|r| r.cause == Some(FailureCause::Cancelled)));
    assert!(counts.iter().all(|c| c.prepare() == 0 && c.cleanup() == 1));
    assert_eq!(run.state.state, SuiteState::Done);
    assert_eq!(run.summary.exit_code, 80);
}

#[test]
fn test_transport_failure_then_retry() {
    let a = MockCase::new("suite.Report#a", MockBehavior::Pass { metrics: metrics(&["mtu"]) }).unwrap();
    let cases: Vec<Box<dyn TestCase>> = vec![Box::new(a)];

    let mut collector = MemoryCollector::new();
    collector.fail_next(1);
    let mut run = TestRunner::new(config(1000), cases).run(&env(&[]), &mut collector);

    assert_eq!(run.summary.status, Status::Error);
    assert_eq!(run.summary.exit_code, 30);
    assert_eq!(run.summary.report.pending, 1);
    assert!(run.summary.report.error.is_some());
    assert_eq!(run.state.state, SuiteState::Done);

    let receipt = run.retry_flush(&mut collector).unwrap();
    assert_eq!(receipt.sent, 1);
    assert_eq!(run.summary.status, Status::Pass);
    assert_eq!(run.summary.exit_code, 0);
    assert_eq!(collector.batches().len(), 1);

    // Nothing new: the next flush is a no-op
    let again = run.retry_flush(&mut collector).unwrap();
    assert_eq!(again.sent, 0);
    assert_eq!(collector.batches().len(), 1);
}

#[test]
fn test_empty_suite_passes() {
    let run = TestRunner::new(config(1000), Vec::new()).run(&env(&[]), &mut MemoryCollector::new());
    assert_eq!(run.summary.status, Status::Pass);
    assert_eq!(run.summary.exit_code, 0);
    assert_eq!(run.summary.report.logs_sent, 0);
    assert_eq!(run.state.state, SuiteState::Done);
}
