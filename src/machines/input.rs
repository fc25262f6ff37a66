//! Input capture lifecycle
//!
//! ```text
//! Stopped ──start──▶ Starting ──heartbeat──▶ Active
//!    ▲                  │  ▲                   │
//!    │            fail  │  │ retry (backoff)   │ heartbeat lost
//!    │                  ▼  │                   │
//!    │                 Failed ◀── budget spent ┘
//!    │
//! Stopping ◀── stop (from Starting / Active)
//! ```
//!
//! A restart is allowed while consecutive retries stay under `max_retries`
//! and fewer than `max_restarts_in_window` restarts happened in the rolling
//! window. Consecutive retries reset once the capture is Active again.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{backoff_at, FailureOutcome};
use crate::config::InputMachineConfig;
use crate::error::{RouteError, RouteResult};

/// Input machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Stopped,
    /// Waiting for the first heartbeat; fails once `deadline` passes
    Starting { since: Instant, deadline: Instant },
    Active { last_heartbeat: Instant },
    Stopping,
    Failed,
}

/// State tag without timestamps, for status reports and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPhase {
    Stopped,
    Starting,
    Active,
    Stopping,
    Failed,
}

impl fmt::Display for InputPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputPhase::Stopped => "stopped",
            InputPhase::Starting => "starting",
            InputPhase::Active => "active",
            InputPhase::Stopping => "stopping",
            InputPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl InputState {
    pub fn phase(&self) -> InputPhase {
        match self {
            InputState::Stopped => InputPhase::Stopped,
            InputState::Starting { .. } => InputPhase::Starting,
            InputState::Active { .. } => InputPhase::Active,
            InputState::Stopping => InputPhase::Stopping,
            InputState::Failed => InputPhase::Failed,
        }
    }
}

pub struct InputMachine {
    config: InputMachineConfig,
    state: InputState,
    consecutive_retries: u32,
    restarts: VecDeque<Instant>,
    /// Bumped on every scheduled retry and every stop; a retry timer only
    /// fires while its epoch is current
    retry_epoch: u64,
}

impl InputMachine {
    pub fn new(config: InputMachineConfig) -> Self {
        Self {
            config,
            state: InputState::Stopped,
            consecutive_retries: 0,
            restarts: VecDeque::new(),
            retry_epoch: 0,
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn phase(&self) -> InputPhase {
        self.state.phase()
    }

    pub fn consecutive_retries(&self) -> u32 {
        self.consecutive_retries
    }

    /// Restarts recorded inside the rolling window ending at `now`
    pub fn restarts_in_window(&self, now: Instant) -> usize {
        let window = self.config.restart_window();
        self.restarts
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < window)
            .count()
    }

    pub fn retry_epoch(&self) -> u64 {
        self.retry_epoch
    }

    /// Running or about to run, with budget left
    pub fn is_healthy(&self) -> bool {
        matches!(self.state, InputState::Starting { .. } | InputState::Active { .. })
    }

    /// Whether another restart fits both the consecutive and window budgets
    pub fn can_retry(&self, now: Instant) -> bool {
        self.consecutive_retries < self.config.max_retries
            && self.restarts_in_window(now) < self.config.max_restarts_in_window
    }

    /// Backoff before the next restart
    pub fn backoff_duration(&self) -> std::time::Duration {
        backoff_at(&self.config.backoff_ms, self.consecutive_retries)
    }

    pub fn start_timeout(&self) -> std::time::Duration {
        self.config.start_timeout()
    }

    /// `Stopped`/`Failed` → `Starting` for a reconcile-driven start
    ///
    /// Starting over from `Failed` grants a fresh budget.
    pub fn begin_start(&mut self, now: Instant) -> RouteResult<()> {
        match self.state {
            InputState::Stopped => {}
            InputState::Failed => {
                self.consecutive_retries = 0;
                self.restarts.clear();
            }
            _ => return Err(self.invalid("start")),
        }
        self.retry_epoch = self.retry_epoch.wrapping_add(1);
        self.transition(
            InputState::Starting {
                since: now,
                deadline: now + self.config.start_timeout(),
            },
            "start",
        );
        Ok(())
    }

    /// A scheduled retry is due; re-arms the start deadline
    ///
    /// Returns `false` when the retry was superseded (stopped or restarted).
    pub fn retry_due(&mut self, epoch: u64, now: Instant) -> bool {
        if epoch != self.retry_epoch || !matches!(self.state, InputState::Starting { .. }) {
            return false;
        }
        self.state = InputState::Starting {
            since: now,
            deadline: now + self.config.start_timeout(),
        };
        true
    }

    /// Heartbeat from the capture controller, stamped at `at`
    ///
    /// Heartbeats older than the current start attempt are ignored. Returns
    /// `true` when this heartbeat activated the input.
    pub fn heartbeat(&mut self, at: Instant) -> bool {
        match self.state {
            InputState::Starting { since, .. } if at >= since => {
                self.consecutive_retries = 0;
                self.transition(InputState::Active { last_heartbeat: at }, "heartbeat");
                true
            }
            InputState::Active { last_heartbeat } if at > last_heartbeat => {
                self.state = InputState::Active { last_heartbeat: at };
                false
            }
            _ => false,
        }
    }

    /// Timeout the watchdog should report, if any
    pub fn check_timeouts(&self, now: Instant) -> Option<RouteError> {
        match self.state {
            InputState::Starting { deadline, .. } if now >= deadline => {
                Some(RouteError::StartTimeout(self.config.start_timeout()))
            }
            InputState::Active { last_heartbeat }
                if now.saturating_duration_since(last_heartbeat) >= self.config.heartbeat_timeout() =>
            {
                Some(RouteError::HeartbeatTimeout(self.config.heartbeat_timeout()))
            }
            _ => None,
        }
    }

    /// Record a failed start or a lost heartbeat
    ///
    /// With budget left the machine moves to `Starting` with its deadline
    /// pushed past the backoff; the owner restarts the controller once the
    /// backoff elapses and calls [`InputMachine::retry_due`]. Otherwise it
    /// settles in `Failed`.
    pub fn fail(&mut self, now: Instant, error: &RouteError) -> RouteResult<FailureOutcome> {
        if !self.is_healthy() {
            return Err(self.invalid("fail"));
        }

        if !self.can_retry(now) {
            warn!(
                machine = "input",
                error = %error,
                consecutive_retries = self.consecutive_retries,
                restarts_in_window = self.restarts_in_window(now),
                "input retry budget exhausted"
            );
            self.transition(InputState::Failed, error.kind());
            return Ok(FailureOutcome::Exhausted);
        }

        let after = self.backoff_duration();
        self.consecutive_retries += 1;
        self.restarts.push_back(now);
        self.prune_restarts(now);
        self.retry_epoch = self.retry_epoch.wrapping_add(1);

        self.transition(
            InputState::Starting {
                since: now,
                deadline: now + after + self.config.start_timeout(),
            },
            error.kind(),
        );

        Ok(FailureOutcome::Retry {
            after,
            attempt: self.consecutive_retries,
        })
    }

    /// Explicit stop; always wins over a pending retry
    ///
    /// Returns `true` when the controller has to be stopped.
    pub fn begin_stop(&mut self) -> bool {
        self.retry_epoch = self.retry_epoch.wrapping_add(1);
        match self.state {
            InputState::Starting { .. } | InputState::Active { .. } => {
                self.transition(InputState::Stopping, "stop");
                true
            }
            InputState::Failed => {
                self.consecutive_retries = 0;
                self.transition(InputState::Stopped, "stop");
                false
            }
            InputState::Stopping | InputState::Stopped => false,
        }
    }

    /// `Stopping` → `Stopped`; a clean stop clears consecutive retries
    ///
    /// The rolling restart history is kept so stop/start cycles cannot
    /// bypass the window cap.
    pub fn stop_completed(&mut self) {
        if self.state == InputState::Stopping {
            self.consecutive_retries = 0;
            self.transition(InputState::Stopped, "stopped");
        }
    }

    fn prune_restarts(&mut self, now: Instant) {
        let window = self.config.restart_window();
        while let Some(oldest) = self.restarts.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&mut self, to: InputState, event: &'static str) {
        let from = self.state.phase();
        self.state = to;
        info!(
            machine = "input",
            from = %from,
            to = %to.phase(),
            event,
            consecutive_retries = self.consecutive_retries,
            restarts = self.restarts.len(),
            "state transition"
        );
    }

    fn invalid(&self, event: &'static str) -> RouteError {
        RouteError::InvalidTransition {
            machine: "input",
            state: self.state.phase().to_string(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn machine() -> InputMachine {
        InputMachine::new(InputMachineConfig::default())
    }

    fn lost() -> RouteError {
        RouteError::HeartbeatTimeout(Duration::from_secs(10))
    }

    #[test]
    fn test_start_then_heartbeat_activates() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        assert_eq!(m.phase(), InputPhase::Starting);
        assert!(m.heartbeat(t0 + Duration::from_millis(300)));
        assert_eq!(m.phase(), InputPhase::Active);
        assert!(!m.heartbeat(t0 + Duration::from_millis(400)));
    }

    #[test]
    fn test_heartbeat_older_than_attempt_ignored() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0 + Duration::from_secs(5)).unwrap();
        assert!(!m.heartbeat(t0));
        assert_eq!(m.phase(), InputPhase::Starting);
    }

    #[test]
    fn test_start_timeout_detected() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        assert!(m.check_timeouts(t0 + Duration::from_millis(2499)).is_none());
        assert!(matches!(
            m.check_timeouts(t0 + Duration::from_millis(2500)),
            Some(RouteError::StartTimeout(_))
        ));
    }

    #[test]
    fn test_heartbeat_timeout_detected() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        m.heartbeat(t0);
        assert!(m.check_timeouts(t0 + Duration::from_secs(9)).is_none());
        assert!(matches!(
            m.check_timeouts(t0 + Duration::from_secs(10)),
            Some(RouteError::HeartbeatTimeout(_))
        ));
    }

    #[test]
    fn test_backoff_and_consecutive_budget() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();

        let mut delays = Vec::new();
        for _ in 0..3 {
            match m.fail(t0, &lost()).unwrap() {
                FailureOutcome::Retry { after, .. } => delays.push(after),
                FailureOutcome::Exhausted => panic!("budget exhausted too early"),
            }
        }
        assert_eq!(
            delays,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );

        assert_eq!(m.fail(t0, &lost()).unwrap(), FailureOutcome::Exhausted);
        assert_eq!(m.phase(), InputPhase::Failed);
    }

    #[test]
    fn test_seventh_restart_in_window_fails() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();

        for i in 0..6 {
            let now = t0 + Duration::from_secs(60 * i);
            m.heartbeat(now);
            assert!(matches!(m.fail(now, &lost()).unwrap(), FailureOutcome::Retry { .. }));
        }
        let now = t0 + Duration::from_secs(400);
        m.heartbeat(now);
        assert_eq!(m.consecutive_retries(), 0);
        assert_eq!(m.restarts_in_window(now), 6);
        assert!(!m.can_retry(now));
        assert_eq!(m.fail(now, &lost()).unwrap(), FailureOutcome::Exhausted);
        assert_eq!(m.phase(), InputPhase::Failed);
    }

    #[test]
    fn test_restart_window_rolls() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        for _ in 0..6 {
            m.heartbeat(t0);
            m.fail(t0, &lost()).unwrap();
        }
        let later = t0 + Duration::from_secs(600);
        m.heartbeat(later);
        assert_eq!(m.restarts_in_window(later), 0);
        assert!(m.can_retry(later));
    }

    #[test]
    fn test_stop_wins_over_pending_retry() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        m.fail(t0, &lost()).unwrap();
        let epoch = m.retry_epoch();

        assert!(m.begin_stop());
        m.stop_completed();
        assert_eq!(m.phase(), InputPhase::Stopped);
        assert_eq!(m.consecutive_retries(), 0);
        assert!(!m.retry_due(epoch, t0 + Duration::from_secs(1)));
        // Window history survives a clean stop
        assert_eq!(m.restarts_in_window(t0), 1);
    }

    #[test]
    fn test_retry_due_rearms_deadline() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        m.fail(t0, &lost()).unwrap();
        let epoch = m.retry_epoch();

        let fire = t0 + Duration::from_secs(1);
        assert!(m.retry_due(epoch, fire));
        assert!(m.check_timeouts(fire + Duration::from_millis(2400)).is_none());
        assert!(m.check_timeouts(fire + Duration::from_millis(2500)).is_some());
    }

    #[test]
    fn test_failed_restart_resets_budget() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        for _ in 0..4 {
            m.fail(t0, &lost()).unwrap();
        }
        assert_eq!(m.phase(), InputPhase::Failed);
        assert!(m.fail(t0, &lost()).is_err());

        m.begin_start(t0).unwrap();
        assert_eq!(m.consecutive_retries(), 0);
        assert_eq!(m.restarts_in_window(t0), 0);
        assert!(m.can_retry(t0));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut m = machine();
        let t0 = Instant::now();
        assert!(m.fail(t0, &lost()).is_err());
        m.begin_start(t0).unwrap();
        let err = m.begin_start(t0).unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn test_stop_from_failed_goes_straight_to_stopped() {
        let mut m = machine();
        let t0 = Instant::now();
        m.begin_start(t0).unwrap();
        for _ in 0..4 {
            m.fail(t0, &lost()).unwrap();
        }
        assert!(!m.begin_stop());
        assert_eq!(m.phase(), InputPhase::Stopped);
    }
}
