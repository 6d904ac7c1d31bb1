//! Status ordering and stable exit codes

use serde::{Deserialize, Serialize};

/// Test or suite status
///
/// Ordered by severity; a suite's status is the worst of its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not run: a capability was missing or the hardware was unavailable
    Skipped,
    /// Passed
    Pass,
    /// Device behaviour did not meet the check
    Fail,
    /// Test itself misbehaved (panic, metric misuse) or reporting failed
    Error,
}

impl Status {
    /// Worst status of `statuses`; an empty suite passes
    pub fn aggregate<I>(statuses: I) -> Status
    where
        I: IntoIterator<Item = Status>,
    {
        statuses.into_iter().max().unwrap_or(Status::Pass)
    }

    /// Default exit code for a suite ending in this status
    pub fn default_exit_code(&self) -> ExitCode {
        match self {
            Status::Skipped | Status::Pass => ExitCode::Success,
            Status::Fail => ExitCode::TestFailed,
            Status::Error => ExitCode::TestError,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Fail | Status::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Skipped => "skipped",
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Error => "error",
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Every test passed or was skipped
    #[default]
    Success = 0,
    /// At least one test failed
    TestFailed = 10,
    /// At least one test errored
    TestError = 20,
    /// Reports could not be delivered to the host collector
    Transport = 30,
    /// Suite, device or host configuration is invalid
    Config = 40,
    /// Suite was cancelled by a signal
    Cancelled = 80,
}

impl ExitCode {
    /// Exit code for a finished suite
    ///
    /// Precedence: cancelled, then transport failure, then test status.
    pub fn for_suite(status: Status, cancelled: bool, transport_failed: bool) -> Self {
        if cancelled {
            ExitCode::Cancelled
        } else if transport_failed {
            ExitCode::Transport
        } else {
            status.default_exit_code()
        }
    }

    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Create from integer value
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            10 => Some(ExitCode::TestFailed),
            20 => Some(ExitCode::TestError),
            30 => Some(ExitCode::Transport),
            40 => Some(ExitCode::Config),
            80 => Some(ExitCode::Cancelled),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}
