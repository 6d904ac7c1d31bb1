//! CTS Report Types
//!
//! Per-test metric report logs and the sink that ships them to a host
//! collector.
//!
//! A test records metrics into its own [`MetricReportLog`]. When the test
//! completes, the log is moved into the [`ReportSink`], which batches every
//! unsent log into a [`ReportBatch`] and hands it to a [`HostCollector`] on
//! flush.

pub mod batch;
pub mod collector;
pub mod error;
pub mod key;
pub mod legacy;
pub mod log;
pub mod metric;
pub mod sink;

pub use batch::{ReportBatch, BATCH_SCHEMA_ID, BATCH_SCHEMA_VERSION};
pub use collector::{CollectorReceipt, DirectoryCollector, HostCollector, MemoryCollector, TransportError};
pub use error::ReportError;
pub use key::TestKey;
pub use log::MetricReportLog;
pub use metric::{Metric, MetricValue, ResultType, ResultUnit};
pub use sink::{FlushReceipt, ReportSink};
