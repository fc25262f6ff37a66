//! RouteHandle - public API for the route manager
//!
//! Fire-and-forget methods for triggers, async methods with oneshot
//! responses for queries. Cheap to clone and share with platform callbacks.

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::commands::RouteCommand;
use crate::config::{InputPreference, RouteConfig};
use crate::devices::DeviceNotification;
use crate::error::{RouteError, RouteResult};
use crate::output_queue::OutputUnit;
use crate::reconcile::RouteStatus;

#[derive(Clone)]
pub struct RouteHandle {
    cmd_tx: mpsc::UnboundedSender<RouteCommand>,
}

impl RouteHandle {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<RouteCommand>) -> Self {
        Self { cmd_tx }
    }

    // =========================================================================
    // Triggers (fire-and-forget)
    // =========================================================================

    /// Topology change from a native monitor callback
    pub fn device_changed(&self, notification: DeviceNotification) {
        let _ = self.cmd_tx.send(RouteCommand::DeviceChanged(notification));
    }

    /// Call after updating the context provider
    pub fn context_changed(&self) {
        let _ = self.cmd_tx.send(RouteCommand::ContextChanged);
    }

    pub fn select_input(&self, selection: Option<InputPreference>) {
        let _ = self.cmd_tx.send(RouteCommand::SelectInput(selection));
    }

    pub fn heartbeat(&self, at: Instant) {
        let _ = self.cmd_tx.send(RouteCommand::Heartbeat(at));
    }

    pub fn stop_input(&self) {
        let _ = self.cmd_tx.send(RouteCommand::StopInput);
    }

    pub fn reconcile(&self) {
        let _ = self.cmd_tx.send(RouteCommand::Reconcile);
    }

    pub fn update_config(&self, config: RouteConfig) {
        let _ = self.cmd_tx.send(RouteCommand::UpdateConfig(Box::new(config)));
    }

    // =========================================================================
    // Queries (async with response)
    // =========================================================================

    /// Buffer a playback unit
    ///
    /// Returns the ids of units evicted to stay within the queue caps, or
    /// [`RouteError::QueuePaused`] while the output is stuck recreating.
    pub async fn enqueue(&self, unit: OutputUnit) -> RouteResult<Vec<String>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(RouteCommand::EnqueueOutput {
                unit,
                response: response_tx,
            })
            .map_err(|_| RouteError::ManagerStopped)?;

        response_rx.await.map_err(|_| RouteError::ManagerStopped)?
    }

    /// Returns None once the manager has stopped
    pub async fn status(&self) -> Option<RouteStatus> {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(RouteCommand::Status(response_tx)).is_err() {
            return None;
        }
        response_rx.await.ok()
    }

    /// Stop capture and playback and wait for the actor to finish
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(RouteCommand::Shutdown(response_tx)).is_ok() {
            let _ = response_rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
