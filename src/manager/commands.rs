//! Commands for the route manager actor
//!
//! Public commands arrive through [`super::RouteHandle`]. Internal commands
//! are sent back to the actor by the timers and tasks it spawns, so every
//! piece of engine bookkeeping still happens on the actor's own loop.

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::{InputPreference, RouteConfig};
use crate::devices::{DeviceInventory, DeviceNotification, DeviceSignature};
use crate::error::RouteResult;
use crate::output_queue::OutputUnit;
use crate::reconcile::{Effects, FollowUp, ReconcileOutcome, RouteStatus};

#[derive(Debug)]
pub enum RouteCommand {
    // -------------------------------------------------------------------------
    // Fire-and-forget
    // -------------------------------------------------------------------------
    /// Topology change from a monitor callback; debounced per device
    DeviceChanged(DeviceNotification),

    /// App mode, permissions or network changed; reconciles immediately
    ContextChanged,

    /// Replace the user's input selection (`None` follows the system default)
    SelectInput(Option<InputPreference>),

    /// Liveness signal pushed by the capture controller
    Heartbeat(Instant),

    /// Explicit stop of capture; cancels pending restarts
    StopInput,

    /// Manual reconcile request
    Reconcile,

    /// Hot-reloaded configuration
    UpdateConfig(Box<RouteConfig>),

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// Buffer one playback unit; answers with the ids evicted to make room
    EnqueueOutput {
        unit: OutputUnit,
        response: oneshot::Sender<RouteResult<Vec<String>>>,
    },

    /// Snapshot of the engine and queue
    Status(oneshot::Sender<RouteStatus>),

    /// Stop capture and playback, then end the actor
    Shutdown(oneshot::Sender<()>),

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------
    /// A debounce timer elapsed; only the latest epoch per device counts
    DebounceFired {
        signature: DeviceSignature,
        epoch: u64,
    },

    /// A follow-up delay elapsed
    FollowUpDue(FollowUp),

    /// Result of a poll of the device monitor; `None` when it failed
    Polled(Option<DeviceInventory>),

    /// A spawned reconcile returned
    ReconcileFinished {
        trigger: Option<DeviceSignature>,
        outcome: ReconcileOutcome,
    },

    /// A spawned input or output retry returned
    RetryFinished(Effects),
}
