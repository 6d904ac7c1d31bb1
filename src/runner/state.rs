//! Suite state machine
//!
//! Suite states: IDLE → PREPARING → RUNNING → REPORTING → DONE
//!
//! There is no failure state: a failing or cancelled suite still walks every
//! state and ends in DONE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Schema version for suite_state.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "cts-harness/suite_state@1";

static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Next sequence number for ordering state updates
fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Suite state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuiteState {
    /// Constructed, nothing started
    Idle,
    /// Configuration accepted, cases being set up
    Preparing,
    /// Executing tests in order
    Running,
    /// Flushing metric reports
    Reporting,
    /// Finished
    Done,
}

impl SuiteState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: SuiteState) -> bool {
        matches!(
            (self, target),
            (SuiteState::Idle, SuiteState::Preparing)
                | (SuiteState::Preparing, SuiteState::Running)
                | (SuiteState::Running, SuiteState::Reporting)
                | (SuiteState::Reporting, SuiteState::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SuiteState::Done)
    }
}

/// Phase of the test currently in the runner's hands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    Prepare,
    Execute,
    Cleanup,
}

/// Test currently being run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentTest {
    /// Position in the suite (0-based)
    pub index: usize,

    /// `class#method`
    pub test_id: String,

    pub phase: TestPhase,
}

/// Suite state artifact data (suite_state.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteStateData {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Suite run identifier
    pub suite_id: String,

    /// Current state
    pub state: SuiteState,

    /// When the suite was created
    pub created_at: DateTime<Utc>,

    /// When the state was last updated
    pub updated_at: DateTime<Utc>,

    /// Test in progress (RUNNING only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_test: Option<CurrentTest>,

    /// Tests with a recorded result
    pub completed: usize,

    /// Tests in the suite
    pub total: usize,

    /// Monotonic sequence counter for ordering
    pub seq: u64,
}

/// Errors for suite state operations
#[derive(Debug, thiserror::Error)]
pub enum SuiteStateError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: SuiteState, to: SuiteState },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SuiteStateData {
    /// Create a new suite in IDLE state
    pub fn new(suite_id: String, total: usize) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            suite_id,
            state: SuiteState::Idle,
            created_at: now,
            updated_at: now,
            current_test: None,
            completed: 0,
            total,
            seq: next_seq(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.seq = next_seq();
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: SuiteState) -> Result<(), SuiteStateError> {
        if !self.state.can_transition_to(new_state) {
            return Err(SuiteStateError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        self.state = new_state;
        self.current_test = None;
        self.touch();
        Ok(())
    }

    /// Enter a test phase
    pub fn set_current_test(&mut self, index: usize, test_id: &str, phase: TestPhase) {
        self.current_test = Some(CurrentTest {
            index,
            test_id: test_id.to_string(),
            phase,
        });
        self.touch();
    }

    /// Record that a test has its result
    pub fn complete_test(&mut self) {
        self.completed += 1;
        self.current_test = None;
        self.touch();
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> Result<(), SuiteStateError> {
        let json = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, SuiteStateError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }
}
