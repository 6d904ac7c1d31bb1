//! Cancellation and signal handling (SIGINT/SIGTERM)
//!
//! On the first signal the shared cancellation token is set. The running test
//! observes it at its next callback boundary and fails with `Cancelled`;
//! tests not yet started are recorded as cancelled without running. The
//! suite still reaches `Done` and reports.
//!
//! On a second signal the process exits immediately with code 80.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Exit code for cancelled suites
pub const EXIT_CODE_CANCELLED: i32 = 80;

#[derive(Debug, Default)]
struct SignalState {
    cancel_requested: AtomicBool,
    signal_count: AtomicU8,
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: initiate graceful cancellation
    InitiateCancellation,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Shared, cloneable cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<SignalState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.state.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.state.cancel_requested.load(Ordering::SeqCst)
    }

    /// Number of signals received
    pub fn signal_count(&self) -> u8 {
        self.state.signal_count.load(Ordering::SeqCst)
    }

    /// Handle a signal and decide what to do
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.state.signal_count.fetch_add(1, Ordering::SeqCst);
        match count {
            0 => {
                self.cancel();
                SignalAction::InitiateCancellation
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Installs the process signal handler
pub struct SignalHandler {
    token: CancelToken,
}

impl SignalHandler {
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }

    /// Token the handler sets
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Install handlers for SIGINT and SIGTERM; call once at startup
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let token = self.token.clone();
        ctrlc::set_handler(move || match token.handle_signal() {
            SignalAction::InitiateCancellation => {
                warn!("received interrupt signal, cancelling suite");
            }
            SignalAction::ImmediateExit => {
                warn!("received second interrupt, exiting immediately");
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}
