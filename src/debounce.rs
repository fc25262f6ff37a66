//! Debounce manager - per-device delay curves for change notifications
//!
//! Bluetooth stacks fire bursts of connect/disconnect/default-changed
//! notifications while switching profiles. Each device (keyed by normalized
//! name + transport) gets a counter; every call grows the delay along the
//! transport's curve until it saturates at the curve's maximum.
//!
//! ## Epochs
//! Scheduling a delayed reconcile also bumps the device's epoch. A timer only
//! fires if its epoch is still current, so a burst collapses to the last
//! scheduled timer.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::trace;

use crate::config::{DebounceConfig, DebounceCurve};
use crate::devices::DeviceSignature;

/// Per-device bookkeeping
#[derive(Debug, Default, Clone, Copy)]
struct DebounceEntry {
    counter: u32,
    epoch: u64,
}

/// Per-device debounce state
pub struct DebounceManager {
    curves: RwLock<DebounceConfig>,
    entries: DashMap<String, DebounceEntry>,
}

impl DebounceManager {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            curves: RwLock::new(config),
            entries: DashMap::new(),
        }
    }

    /// Replace the curves (config hot-reload); counters are kept
    pub fn update_config(&self, config: DebounceConfig) {
        *self.curves.write() = config;
    }

    /// Delay for this notification, then advance the device's counter
    pub fn delay_for(&self, signature: &DeviceSignature) -> Duration {
        let curve = self.curves.read().curve_for(signature.transport());
        let mut entry = self.entries.entry(signature.debounce_key()).or_default();
        let delay = curve_delay(curve, entry.counter);
        entry.counter = entry.counter.saturating_add(1);

        trace!(
            device = %signature,
            counter = entry.counter,
            delay_ms = delay.as_millis() as u64,
            "debounce delay"
        );

        delay
    }

    /// Compute the delay and claim a new epoch in one step
    ///
    /// The returned epoch must be passed to [`DebounceManager::is_current`]
    /// when the timer fires.
    pub fn schedule(&self, signature: &DeviceSignature) -> (Duration, u64) {
        let delay = self.delay_for(signature);
        let mut entry = self.entries.entry(signature.debounce_key()).or_default();
        entry.epoch = entry.epoch.wrapping_add(1);
        (delay, entry.epoch)
    }

    /// Whether `epoch` is still the latest scheduled timer for the device
    pub fn is_current(&self, signature: &DeviceSignature, epoch: u64) -> bool {
        self.entries
            .get(&signature.debounce_key())
            .is_some_and(|entry| entry.epoch == epoch)
    }

    /// Zero one device's counter; its epoch is kept so pending timers still
    /// resolve correctly
    pub fn reset(&self, signature: &DeviceSignature) {
        if let Some(mut entry) = self.entries.get_mut(&signature.debounce_key()) {
            entry.counter = 0;
        }
    }

    /// Reset every counter
    pub fn clear_all(&self) {
        self.entries.iter_mut().for_each(|mut entry| entry.counter = 0);
    }

    /// Current counter for a device (0 when never seen)
    pub fn counter(&self, signature: &DeviceSignature) -> u32 {
        self.entries
            .get(&signature.debounce_key())
            .map(|entry| entry.counter)
            .unwrap_or(0)
    }
}

/// `initial + counter * increment`, capped at `max`
fn curve_delay(curve: DebounceCurve, counter: u32) -> Duration {
    let grown = curve
        .increment_ms
        .saturating_mul(u64::from(counter))
        .saturating_add(curve.initial_ms);
    Duration::from_millis(grown.min(curve.max_ms))
}
