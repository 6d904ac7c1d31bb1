//! Report flow tests: record, submit, flush to a directory, retry after failure

use cts_report::{
    DirectoryCollector, HostCollector, MemoryCollector, MetricReportLog, ReportBatch,
    ReportError, ReportSink, ResultType, ResultUnit, TestKey,
};
use std::fs;
use tempfile::TempDir;

fn completed_log(method: &str, latency: f64) -> MetricReportLog {
    let mut log = MetricReportLog::for_test(&format!("ble.SecureConnect#{}", method), "arm64-v8a")
        .unwrap();
    log.add_value("connect_latency_ms", latency, ResultUnit::Ms, ResultType::LowerBetter)
        .unwrap();
    log
}

#[test]
fn test_flush_to_directory_writes_one_batch() {
    let tmp = TempDir::new().unwrap();
    let mut collector = DirectoryCollector::new(tmp.path().join("reports"));
    let mut sink = ReportSink::new();

    sink.submit(completed_log("insecure", 30.0));
    sink.submit(completed_log("secure", 45.0));

    let receipt = sink.flush(&mut collector).unwrap();
    assert_eq!(receipt.sent, 2);

    let files: Vec<_> = fs::read_dir(tmp.path().join("reports"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(files.len(), 1);

    let batch = ReportBatch::from_json(&fs::read_to_string(files[0].path()).unwrap()).unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch.verify_digest().unwrap());
    // Logs are in key order
    assert_eq!(batch.logs[0].key.method_name, "insecure");
    assert_eq!(batch.logs[1].key.method_name, "secure");
}

#[test]
fn test_retry_after_transport_failure_sends_same_logs() {
    let mut collector = MemoryCollector::new();
    collector.fail_next(2);
    let mut sink = ReportSink::new();
    sink.submit(completed_log("secure", 45.0));

    for _ in 0..2 {
        assert!(matches!(
            sink.flush(&mut collector),
            Err(ReportError::Transport(_))
        ));
    }

    let receipt = sink.flush(&mut collector).unwrap();
    assert_eq!(receipt.sent, 1);
    assert_eq!(collector.attempts(), 3);
    assert_eq!(collector.batches().len(), 1);

    // Nothing new, nothing sent
    assert_eq!(sink.flush(&mut collector).unwrap().sent, 0);
    assert_eq!(collector.attempts(), 3);
}

#[test]
fn test_persisted_sink_can_be_flushed_later() {
    let tmp = TempDir::new().unwrap();
    let pending = tmp.path().join("pending_reports.json");

    let mut failing = MemoryCollector::new();
    failing.fail_next(1);
    let mut sink = ReportSink::new();
    sink.submit(completed_log("secure", 45.0));
    assert!(sink.flush(&mut failing).is_err());
    sink.save(&pending).unwrap();

    let mut reloaded = ReportSink::load(&pending).unwrap();
    let mut collector: Box<dyn HostCollector> =
        Box::new(DirectoryCollector::new(tmp.path().join("reports")));
    let receipt = reloaded.flush(collector.as_mut()).unwrap();
    assert_eq!(receipt.sent, 1);

    let key = TestKey::new("ble.SecureConnect", "secure", "arm64-v8a");
    assert_eq!(reloaded.is_sent(&key), Some(true));
}
