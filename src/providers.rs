//! External collaborators: device monitor, I/O controllers, context
//!
//! Platform adapters implement these traits. The core only ever talks to
//! them through the reconcile engine, and never while holding a lock.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::decision::SystemContext;
use crate::devices::{DeviceId, DeviceInventory, DeviceNotification};
use crate::output_queue::OutputUnit;

/// Source of the native device topology
#[async_trait]
pub trait DeviceMonitor: Send + Sync {
    /// Current inputs, outputs and system defaults
    async fn current_devices(&self) -> Result<DeviceInventory>;

    /// Register for push notifications
    ///
    /// Monitors without native callbacks keep the default, and the route
    /// manager falls back to polling [`DeviceMonitor::current_devices`].
    async fn subscribe(&self, _tx: mpsc::UnboundedSender<DeviceNotification>) -> Result<bool> {
        Ok(false)
    }
}

/// Capture side; only the reconcile engine calls it
#[async_trait]
pub trait InputController: Send + Sync {
    /// Start capturing; `None` means the system default input
    async fn start(&self, device: Option<DeviceId>) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    fn is_running(&self) -> bool;
    /// Time of the most recent liveness signal
    fn last_heartbeat(&self) -> Option<Instant>;
}

/// Playback side
#[async_trait]
pub trait OutputController: Send + Sync {
    fn is_ready(&self) -> bool;
    /// Rebuild the playback pipeline against the current default output
    async fn recreate(&self) -> Result<()>;
    async fn schedule_unit(&self, unit: OutputUnit) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Host conditions consulted on every reconcile
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> SystemContext;
}

/// Context held in memory and updated by the host
#[derive(Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<SystemContext>>,
}

impl SharedContext {
    pub fn new(ctx: SystemContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ctx)),
        }
    }

    pub fn set(&self, ctx: SystemContext) {
        *self.inner.write() = ctx;
    }

    pub fn update(&self, f: impl FnOnce(&mut SystemContext)) {
        f(&mut self.inner.write());
    }
}

impl ContextProvider for SharedContext {
    fn context(&self) -> SystemContext {
        *self.inner.read()
    }
}
