//! Input and output lifecycle state machines
//!
//! Both machines are plain data plus a transition function. They never call
//! controllers themselves; the reconcile engine performs the I/O and feeds
//! the outcome back as events. Timestamps are monotonic and always passed in,
//! so every transition is testable without a runtime.

pub mod input;
pub mod output;

pub use input::{InputMachine, InputPhase, InputState};
pub use output::{OutputMachine, OutputPhase, OutputState};

use std::time::Duration;

/// What the owner should do after a failure was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Budget left: try again after the backoff
    Retry { after: Duration, attempt: u32 },
    /// Budget exhausted: the machine settled in its terminal failure state
    Exhausted,
}

/// Pick the backoff for the `attempt`-th retry (0-based), repeating the last
/// entry once the schedule runs out
pub(crate) fn backoff_at(schedule_ms: &[u64], attempt: u32) -> Duration {
    let index = (attempt as usize).min(schedule_ms.len().saturating_sub(1));
    Duration::from_millis(schedule_ms.get(index).copied().unwrap_or(0))
}
