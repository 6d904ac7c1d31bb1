//! Per-test timeout enforcement
//!
//! Every test gets a fresh deadline when `execute` starts:
//! - `test_timeout`: maximum wall-clock time for one `execute` call
//! - `poll_interval`: longest single wait on a platform session, which
//!   bounds how late a cancellation is observed
//!
//! The enforcer only reports expiry. The execution context turns expiry into
//! `Failure{TimedOut}`, and the runner applies the same check to results that
//! arrive after the deadline.

use std::time::{Duration, Instant};

/// Upper bound for a single test (1 hour)
pub const MAX_TEST_TIMEOUT_MS: u64 = 3_600_000;

/// Upper bound for the poll interval
pub const MAX_POLL_INTERVAL_MS: u64 = 1_000;

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum wall-clock time per test (default: 30 s)
    pub test_timeout: Duration,

    /// Longest single wait for a platform event (default: 50 ms)
    pub poll_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl TimeoutConfig {
    /// Create from millisecond values
    pub fn from_millis(test_timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            test_timeout: Duration::from_millis(test_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    /// Validate bounds
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        let timeout_ms = self.test_timeout.as_millis() as u64;
        if timeout_ms == 0 || timeout_ms > MAX_TEST_TIMEOUT_MS {
            return Err(TimeoutValidationError::TestTimeoutOutOfBounds { value: timeout_ms });
        }

        let poll_ms = self.poll_interval.as_millis() as u64;
        if poll_ms == 0 || poll_ms > MAX_POLL_INTERVAL_MS {
            return Err(TimeoutValidationError::PollIntervalOutOfBounds { value: poll_ms });
        }

        Ok(())
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("timeout_ms must be in (0, 3600000], got {value}")]
    TestTimeoutOutOfBounds { value: u64 },

    #[error("poll_interval_ms must be in (0, 1000], got {value}")]
    PollIntervalOutOfBounds { value: u64 },
}

/// Timeout check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    /// Deadline not reached
    Ok,
    /// Deadline passed
    Expired,
}

impl TimeoutStatus {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutStatus::Expired)
    }
}

/// Deadline tracker for one test execution
#[derive(Debug)]
pub struct TimeoutEnforcer {
    config: TimeoutConfig,
    start_time: Instant,
}

impl TimeoutEnforcer {
    /// Start the clock
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Check the deadline
    pub fn check(&self) -> TimeoutStatus {
        if self.elapsed() >= self.config.test_timeout {
            TimeoutStatus::Expired
        } else {
            TimeoutStatus::Ok
        }
    }

    /// Time since the clock started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.config.test_timeout.saturating_sub(self.elapsed())
    }

    /// Next wait slice: the poll interval, clipped to the deadline
    pub fn next_wait(&self) -> Duration {
        self.remaining().min(self.config.poll_interval)
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.test_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = TimeoutConfig::from_millis(0, 50);
        assert!(matches!(
            config.validate(),
            Err(TimeoutValidationError::TestTimeoutOutOfBounds { value: 0 })
        ));
    }

    #[test]
    fn test_validation_timeout_too_large() {
        let config = TimeoutConfig::from_millis(MAX_TEST_TIMEOUT_MS + 1, 50);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_poll_interval() {
        assert!(TimeoutConfig::from_millis(1000, 0).validate().is_err());
        assert!(TimeoutConfig::from_millis(1000, 1001).validate().is_err());
        assert!(TimeoutConfig::from_millis(1000, 1000).validate().is_ok());
    }

    #[test]
    fn test_enforcer_not_expired_immediately() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::from_millis(10_000, 50));
        assert_eq!(enforcer.check(), TimeoutStatus::Ok);
        assert!(enforcer.remaining() > Duration::from_millis(9_000));
    }

    #[test]
    fn test_enforcer_expires() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::from_millis(20, 5));
        sleep(Duration::from_millis(30));
        assert!(enforcer.check().is_timeout());
        assert_eq!(enforcer.remaining(), Duration::ZERO);
        assert_eq!(enforcer.next_wait(), Duration::ZERO);
    }

    #[test]
    fn test_next_wait_is_poll_interval_when_far_from_deadline() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::from_millis(10_000, 25));
        assert_eq!(enforcer.next_wait(), Duration::from_millis(25));
    }
}
