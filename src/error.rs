//! Error taxonomy for route reconciliation
//!
//! Library code returns [`RouteError`]; adapters and the harness binary use
//! `anyhow` and convert at the boundary.

use std::time::Duration;

use thiserror::Error;

use crate::devices::Confidence;

/// Errors produced while reconciling audio routes
#[derive(Debug, Error)]
pub enum RouteError {
    /// The mapper could not identify the desired device
    #[error("mapping unusable ({confidence}): {reason}")]
    MappingUnusable {
        confidence: Confidence,
        reason: String,
    },

    /// Another client holds the capture device
    #[error("input device busy")]
    DeviceBusy,

    /// No input device exists to route to
    #[error("no input device available")]
    NoInputAvailable,

    /// The capture controller stopped emitting heartbeats
    #[error("no heartbeat for {0:?}")]
    HeartbeatTimeout(Duration),

    /// Output recreation did not finish in time
    #[error("output recreate exceeded {0:?}")]
    RecreateTimeout(Duration),

    /// A hard-stop context condition blocked the reconcile
    #[error("reconcile blocked: {0}")]
    ReconcileBlocked(&'static str),

    /// Input start did not complete in time
    #[error("input start exceeded {0:?}")]
    StartTimeout(Duration),

    /// External controller call failed
    #[error("controller error: {0}")]
    Controller(String),

    /// Device monitor failed to produce an inventory
    #[error("device monitor error: {0}")]
    Monitor(String),

    /// Output feeding is paused while the output is being recreated
    #[error("output queue paused")]
    QueuePaused,

    /// The route manager task is gone
    #[error("route manager stopped")]
    ManagerStopped,

    /// Rejected state machine transition
    #[error("invalid transition for {machine}: {event} in {state}")]
    InvalidTransition {
        machine: &'static str,
        state: String,
        event: &'static str,
    },
}

impl RouteError {
    /// Stable tag used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::MappingUnusable { .. } => "mapping_unusable",
            RouteError::DeviceBusy => "device_busy",
            RouteError::NoInputAvailable => "no_input_available",
            RouteError::HeartbeatTimeout(_) => "heartbeat_timeout",
            RouteError::RecreateTimeout(_) => "recreate_timeout",
            RouteError::ReconcileBlocked(_) => "reconcile_blocked",
            RouteError::StartTimeout(_) => "start_timeout",
            RouteError::Controller(_) => "controller",
            RouteError::Monitor(_) => "monitor",
            RouteError::QueuePaused => "queue_paused",
            RouteError::ManagerStopped => "manager_stopped",
            RouteError::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Whether a state machine retries this failure locally
    pub fn is_locally_retried(&self) -> bool {
        matches!(
            self,
            RouteError::DeviceBusy
                | RouteError::HeartbeatTimeout(_)
                | RouteError::RecreateTimeout(_)
                | RouteError::StartTimeout(_)
                | RouteError::Controller(_)
        )
    }
}

pub type RouteResult<T> = std::result::Result<T, RouteError>;
