//! File-backed device monitor
//!
//! Reads the device topology from a YAML file and watches it with `notify`,
//! so hot-plug and default-device switches can be simulated by editing the
//! file. Used by the harness binary in place of a platform adapter.
//!
//! ```yaml
//! default_input: yeti
//! default_output: spk
//! inputs:
//!   - { id: builtin, name: "MacBook Pro Microphone", channels: 1 }
//!   - { id: yeti, name: "Blue Yeti USB", channels: 2 }
//! outputs:
//!   - { id: spk, name: "MacBook Pro Speakers", channels: 2 }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::devices::{diff_inventories, DeviceInventory, DeviceNotification};
use crate::file_watch;
use crate::providers::DeviceMonitor;

pub struct FileDeviceMonitor {
    path: PathBuf,
    /// Inventory the last diff was computed against
    baseline: Arc<Mutex<Option<DeviceInventory>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileDeviceMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baseline: Arc::new(Mutex::new(None)),
            watcher: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a topology document
    ///
    /// Entries under `inputs` are input-capable and entries under `outputs`
    /// output-capable, whatever the document says.
    pub fn parse(contents: &str) -> Result<DeviceInventory> {
        let mut inventory: DeviceInventory = if contents.trim().is_empty() {
            DeviceInventory::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        for device in &mut inventory.inputs {
            device.is_input = true;
        }
        for device in &mut inventory.outputs {
            device.is_output = true;
        }
        Ok(inventory)
    }

    pub async fn read(path: &Path) -> Result<DeviceInventory> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read topology file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse topology file: {}", path.display()))
    }

    /// Re-read the file and diff it against the baseline
    async fn reload(path: &Path, baseline: &Mutex<Option<DeviceInventory>>) -> Result<Vec<DeviceNotification>> {
        let next = Self::read(path).await?;
        let previous = baseline.lock().replace(next.clone());
        Ok(match previous {
            Some(previous) => diff_inventories(&previous, &next),
            None => Vec::new(),
        })
    }
}

#[async_trait]
impl DeviceMonitor for FileDeviceMonitor {
    async fn current_devices(&self) -> Result<DeviceInventory> {
        Self::read(&self.path).await
    }

    async fn subscribe(&self, tx: mpsc::UnboundedSender<DeviceNotification>) -> Result<bool> {
        Self::reload(&self.path, &self.baseline).await?;

        let path = self.path.clone();
        let baseline = self.baseline.clone();
        let watcher = file_watch::watch_file(&self.path, "topology", move || {
            push_changes(path.clone(), baseline.clone(), tx.clone())
        })?;
        *self.watcher.lock() = Some(watcher);

        Ok(true)
    }
}

/// Re-read the topology and push what changed since the baseline
async fn push_changes(
    path: PathBuf,
    baseline: Arc<Mutex<Option<DeviceInventory>>>,
    tx: mpsc::UnboundedSender<DeviceNotification>,
) {
    match FileDeviceMonitor::reload(&path, &baseline).await {
        Ok(notifications) => {
            for notification in notifications {
                info!(kind = ?notification.kind, device = %notification.device.name, "topology change");
                if tx.send(notification).is_err() {
                    return;
                }
            }
        }
        Err(e) => warn!("Ignoring unreadable topology update: {:#}", e),
    }
}
