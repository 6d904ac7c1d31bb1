//! Mock test cases
//!
//! Scripted `TestCase` implementations for exercising the runner without
//! real checks. Each behaviour drives one lifecycle path:
//!
//! - `pass` / `fail`: execute returns the scripted result
//! - `skip`: prepare refuses
//! - `hang`: execute waits on a silent session until the deadline
//! - `late`: execute sleeps past the deadline, then reports success
//! - `panic_in_execute`: execute panics
//! - `duplicate_metric`: execute records the same metric twice
//!
//! Call counters are shared handles so a test can inspect them after the
//! runner has consumed the case.

mod case;

pub use case::{CallCounts, MockBehavior, MockCase};
