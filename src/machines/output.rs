//! Output playback lifecycle: `Ready`, `Recreating`, `Error`
//!
//! The owner bounds each recreation by the configured timeout (1.5s by
//! default). A failed or timed-out recreation lands in `Error`; while retries
//! remain the owner waits out the backoff and calls [`OutputMachine::retry`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{backoff_at, FailureOutcome};
use crate::config::OutputMachineConfig;
use crate::error::{RouteError, RouteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Ready,
    Recreating { since: Instant },
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPhase {
    Ready,
    Recreating,
    Error,
}

impl fmt::Display for OutputPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputPhase::Ready => "ready",
            OutputPhase::Recreating => "recreating",
            OutputPhase::Error => "error",
        };
        f.write_str(s)
    }
}

impl OutputState {
    pub fn phase(&self) -> OutputPhase {
        match self {
            OutputState::Ready => OutputPhase::Ready,
            OutputState::Recreating { .. } => OutputPhase::Recreating,
            OutputState::Error => OutputPhase::Error,
        }
    }
}

pub struct OutputMachine {
    config: OutputMachineConfig,
    state: OutputState,
    retries_used: u32,
}

impl OutputMachine {
    pub fn new(config: OutputMachineConfig) -> Self {
        Self {
            config,
            state: OutputState::Ready,
            retries_used: 0,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    pub fn phase(&self) -> OutputPhase {
        self.state.phase()
    }

    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    pub fn can_retry(&self) -> bool {
        self.state == OutputState::Error && self.retries_used < self.config.max_retries
    }

    pub fn backoff_duration(&self) -> Duration {
        backoff_at(&self.config.backoff_ms, self.retries_used)
    }

    pub fn recreate_timeout(&self) -> Duration {
        self.config.recreate_timeout()
    }

    /// How long the current recreation has been running
    pub fn recreating_for(&self, now: Instant) -> Option<Duration> {
        match self.state {
            OutputState::Recreating { since } => Some(now.saturating_duration_since(since)),
            _ => None,
        }
    }

    /// Reconcile-driven recreation from `Ready` or `Error`; grants a fresh
    /// retry budget
    pub fn begin_recreate(&mut self, now: Instant) -> RouteResult<()> {
        if let OutputState::Recreating { .. } = self.state {
            return Err(self.invalid("recreate"));
        }
        self.retries_used = 0;
        self.transition(OutputState::Recreating { since: now }, "recreate");
        Ok(())
    }

    /// `Error` → `Recreating` after the backoff, consuming one retry
    pub fn retry(&mut self, now: Instant) -> RouteResult<()> {
        if !self.can_retry() {
            return Err(self.invalid("retry"));
        }
        self.retries_used += 1;
        self.transition(OutputState::Recreating { since: now }, "retry");
        Ok(())
    }

    pub fn recreate_succeeded(&mut self) -> RouteResult<()> {
        if !matches!(self.state, OutputState::Recreating { .. }) {
            return Err(self.invalid("recreated"));
        }
        self.retries_used = 0;
        self.transition(OutputState::Ready, "recreated");
        Ok(())
    }

    /// `Recreating` → `Error`, reporting whether a retry is allowed
    pub fn recreate_failed(&mut self, error: &RouteError) -> RouteResult<FailureOutcome> {
        if !matches!(self.state, OutputState::Recreating { .. }) {
            return Err(self.invalid("recreate_failed"));
        }
        self.transition(OutputState::Error, error.kind());

        if self.can_retry() {
            Ok(FailureOutcome::Retry {
                after: self.backoff_duration(),
                attempt: self.retries_used + 1,
            })
        } else {
            warn!(
                machine = "output",
                error = %error,
                retries_used = self.retries_used,
                "output retry budget exhausted"
            );
            Ok(FailureOutcome::Exhausted)
        }
    }

    fn transition(&mut self, to: OutputState, event: &'static str) {
        let from = self.state.phase();
        self.state = to;
        info!(
            machine = "output",
            from = %from,
            to = %to.phase(),
            event,
            retries_used = self.retries_used,
            "state transition"
        );
    }

    fn invalid(&self, event: &'static str) -> RouteError {
        RouteError::InvalidTransition {
            machine: "output",
            state: self.state.phase().to_string(),
            event,
        }
    }
}
