//! Scripted test case

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use cts_report::{ResultType, ResultUnit};

use crate::capability::{Capability, CapabilitySet};
use crate::case::{ExecContext, Failure, Outcome, Ready, SkipReason, TestCase, TestEnv, TestId};
use crate::platform::Session;

/// What a mock case does when run
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Record the metrics, then pass
    Pass { metrics: Vec<(String, f64)> },
    /// Record the metrics, then fail
    Fail {
        metrics: Vec<(String, f64)>,
        failure: Failure,
    },
    /// Refuse in prepare
    Skip(SkipReason),
    /// Open a session on `capability` in prepare and wait on it forever
    Hang { capability: Capability },
    /// Sleep this long in execute, then pass
    Late(Duration),
    /// Panic in execute
    Panic,
    /// Record `name` twice
    DuplicateMetric { name: String },
}

/// Lifecycle call counters
#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    prepare: Arc<AtomicUsize>,
    execute: Arc<AtomicUsize>,
    cleanup: Arc<AtomicUsize>,
}

impl CallCounts {
    pub fn prepare(&self) -> usize {
        self.prepare.load(Ordering::SeqCst)
    }

    pub fn execute(&self) -> usize {
        self.execute.load(Ordering::SeqCst)
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup.load(Ordering::SeqCst)
    }
}

/// Test case driven by a `MockBehavior`
pub struct MockCase {
    id: TestId,
    requires: CapabilitySet,
    behavior: MockBehavior,
    counts: CallCounts,
    session: Option<Box<dyn Session>>,
}

impl MockCase {
    pub fn new(id: &str, behavior: MockBehavior) -> Result<Self, cts_report::ReportError> {
        Ok(Self {
            id: TestId::parse(id)?,
            requires: CapabilitySet::new(),
            behavior,
            counts: CallCounts::default(),
            session: None,
        })
    }

    pub fn pass(id: &str) -> Result<Self, cts_report::ReportError> {
        Self::new(id, MockBehavior::Pass { metrics: Vec::new() })
    }

    pub fn requiring(mut self, requires: CapabilitySet) -> Self {
        self.requires = requires;
        self
    }

    /// Shared handle to this case's call counters
    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }

    fn record_all(ctx: &mut ExecContext, metrics: &[(String, f64)]) -> Result<(), Failure> {
        for (name, value) in metrics {
            ctx.record(name, *value, ResultUnit::None, ResultType::Neutral)?;
        }
        Ok(())
    }
}

impl TestCase for MockCase {
    fn id(&self) -> &TestId {
        &self.id
    }

    fn requirements(&self) -> &CapabilitySet {
        &self.requires
    }

    fn prepare(&mut self, env: &TestEnv) -> Result<Ready, SkipReason> {
        self.counts.prepare.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Skip(reason) => Err(reason.clone()),
            MockBehavior::Hang { capability } => {
                self.session = Some(env.platform.open(capability)?);
                Ok(Ready)
            }
            _ => Ok(Ready),
        }
    }

    fn execute(&mut self, ctx: &mut ExecContext) -> Result<Outcome, Failure> {
        self.counts.execute.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Pass { metrics } => {
                Self::record_all(ctx, metrics)?;
                Ok(Outcome::pass())
            }
            MockBehavior::Fail { metrics, failure } => {
                Self::record_all(ctx, metrics)?;
                Err(failure.clone())
            }
            MockBehavior::Skip(_) => Ok(Outcome::pass()),
            MockBehavior::Hang { .. } => {
                let session = self
                    .session
                    .as_mut()
                    .ok_or_else(|| Failure::platform("mock session not open"))?;
                let event = ctx.await_event(session.as_mut())?;
                Err(Failure::unexpected_response(format!("{:?}", event)))
            }
            MockBehavior::Late(delay) => {
                sleep(*delay);
                Ok(Outcome::with_detail("finished late"))
            }
            MockBehavior::Panic => panic!("mock case panicked"),
            MockBehavior::DuplicateMetric { name } => {
                ctx.record(name, 1.0, ResultUnit::Count, ResultType::Neutral)?;
                ctx.record(name, 2.0, ResultUnit::Count, ResultType::Neutral)?;
                Ok(Outcome::pass())
            }
        }
    }

    fn cleanup(&mut self) {
        self.counts.cleanup.fetch_add(1, Ordering::SeqCst);
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}
