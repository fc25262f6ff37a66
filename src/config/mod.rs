//! Configuration management for the route engine
//!
//! Handles loading, parsing, validating and hot-reloading of YAML
//! configuration files. Every field has a default, so an empty file is a
//! valid configuration.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::fs;

use crate::devices::normalize::{DEFAULT_ALIASES, DEFAULT_STRIP_SUFFIXES};
use crate::devices::Transport;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    #[serde(default)]
    pub mapper: MapperConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub input: InputMachineConfig,
    #[serde(default)]
    pub output: OutputMachineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_input: Option<InputPreference>,
}

/// Device mapper scoring and normalization
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MapperConfig {
    #[serde(default = "default_exact_name_score")]
    pub exact_name_score: u32,
    #[serde(default = "default_substring_score")]
    pub substring_score: u32,
    #[serde(default = "default_exact_channels_score")]
    pub exact_channels_score: u32,
    #[serde(default = "default_near_channels_score")]
    pub near_channels_score: u32,
    #[serde(default = "default_bluetooth_bonus")]
    pub bluetooth_bonus: u32,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u32,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u32,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: u32,
    /// Second-best at or above this fraction of the best downgrades confidence
    #[serde(default = "default_ambiguity_ratio")]
    pub ambiguity_ratio: f64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_strip_suffixes")]
    pub strip_suffixes: Vec<String>,
    /// Variant name → canonical name
    #[serde(default = "default_aliases")]
    pub aliases: HashMap<String, String>,
}

/// Debounce curve for one transport
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct DebounceCurve {
    pub initial_ms: u64,
    #[serde(default)]
    pub increment_ms: u64,
    pub max_ms: u64,
}

impl DebounceCurve {
    pub const fn new(initial_ms: u64, increment_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms,
            increment_ms,
            max_ms,
        }
    }
}

/// Per-transport debounce curves
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DebounceConfig {
    #[serde(default = "default_bluetooth_curve")]
    pub bluetooth: DebounceCurve,
    #[serde(default = "default_usb_curve")]
    pub usb: DebounceCurve,
    #[serde(default = "default_built_in_curve")]
    pub built_in: DebounceCurve,
    /// Unknown transports use the Bluetooth curve unless set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown: Option<DebounceCurve>,
}

impl DebounceConfig {
    pub fn curve_for(&self, transport: Transport) -> DebounceCurve {
        match transport {
            Transport::Bluetooth => self.bluetooth,
            Transport::Usb => self.usb,
            Transport::BuiltIn => self.built_in,
            Transport::Unknown => self.unknown.unwrap_or(self.bluetooth),
        }
    }
}

/// Input lifecycle budgets
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InputMachineConfig {
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_input_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_input_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
    #[serde(default = "default_max_restarts_in_window")]
    pub max_restarts_in_window: usize,
}

impl InputMachineConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

/// Output lifecycle budgets
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OutputMachineConfig {
    #[serde(default = "default_recreate_timeout_ms")]
    pub recreate_timeout_ms: u64,
    #[serde(default = "default_output_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_output_backoff_ms")]
    pub backoff_ms: Vec<u64>,
}

impl OutputMachineConfig {
    pub fn recreate_timeout(&self) -> Duration {
        Duration::from_millis(self.recreate_timeout_ms)
    }
}

/// Output buffering caps
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_queue_max_duration_ms")]
    pub max_duration_ms: u64,
    #[serde(default = "default_queue_max_bytes")]
    pub max_bytes: usize,
    /// Feeding pauses once the output has been recreating this long
    #[serde(default = "default_pause_after_recreating_ms")]
    pub pause_after_recreating_ms: u64,
}

/// Device polling
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MonitorConfig {
    /// Poll interval; 0 disables polling and relies on push notifications
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Heartbeat watchdog
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_tick_ms")]
    pub tick_ms: u64,
}

/// Explicit user input selection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InputPreference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

impl RouteConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map
        let config: RouteConfig = if contents.trim().is_empty() {
            RouteConfig::default()
        } else {
            serde_yaml::from_str(contents)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let m = &self.mapper;
        if !(m.high_threshold >= m.medium_threshold && m.medium_threshold >= m.low_threshold) {
            anyhow::bail!(
                "mapper thresholds must be non-increasing (high {} >= medium {} >= low {})",
                m.high_threshold,
                m.medium_threshold,
                m.low_threshold
            );
        }
        if m.low_threshold == 0 {
            anyhow::bail!("mapper low_threshold must be at least 1");
        }
        if !(m.ambiguity_ratio > 0.0 && m.ambiguity_ratio <= 1.0) {
            anyhow::bail!(
                "mapper ambiguity_ratio {} must be in (0, 1]",
                m.ambiguity_ratio
            );
        }

        for (name, curve) in [
            ("bluetooth", Some(self.debounce.bluetooth)),
            ("usb", Some(self.debounce.usb)),
            ("built_in", Some(self.debounce.built_in)),
            ("unknown", self.debounce.unknown),
        ] {
            if let Some(curve) = curve {
                if curve.max_ms < curve.initial_ms {
                    anyhow::bail!(
                        "debounce curve '{}' max_ms {} is below initial_ms {}",
                        name,
                        curve.max_ms,
                        curve.initial_ms
                    );
                }
            }
        }

        if self.input.backoff_ms.is_empty() {
            anyhow::bail!("input backoff_ms must list at least one delay");
        }
        if self.output.backoff_ms.is_empty() {
            anyhow::bail!("output backoff_ms must list at least one delay");
        }
        if self.input.start_timeout_ms == 0 || self.input.heartbeat_timeout_ms == 0 {
            anyhow::bail!("input timeouts must be non-zero");
        }
        if self.output.recreate_timeout_ms == 0 {
            anyhow::bail!("output recreate_timeout_ms must be non-zero");
        }
        if self.queue.max_bytes == 0 || self.queue.max_duration_ms == 0 {
            anyhow::bail!("queue caps must be non-zero");
        }
        if self.watchdog.tick_ms == 0 {
            anyhow::bail!("watchdog tick_ms must be non-zero");
        }

        if let Some(pref) = &self.preferred_input {
            if pref.name.trim().is_empty() {
                anyhow::bail!("preferred_input name cannot be empty");
            }
        }

        Ok(())
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            exact_name_score: default_exact_name_score(),
            substring_score: default_substring_score(),
            exact_channels_score: default_exact_channels_score(),
            near_channels_score: default_near_channels_score(),
            bluetooth_bonus: default_bluetooth_bonus(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            low_threshold: default_low_threshold(),
            ambiguity_ratio: default_ambiguity_ratio(),
            cache_ttl_secs: default_cache_ttl_secs(),
            strip_suffixes: default_strip_suffixes(),
            aliases: default_aliases(),
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            bluetooth: default_bluetooth_curve(),
            usb: default_usb_curve(),
            built_in: default_built_in_curve(),
            unknown: None,
        }
    }
}

impl Default for InputMachineConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: default_start_timeout_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_retries: default_input_max_retries(),
            backoff_ms: default_input_backoff_ms(),
            restart_window_secs: default_restart_window_secs(),
            max_restarts_in_window: default_max_restarts_in_window(),
        }
    }
}

impl Default for OutputMachineConfig {
    fn default() -> Self {
        Self {
            recreate_timeout_ms: default_recreate_timeout_ms(),
            max_retries: default_output_max_retries(),
            backoff_ms: default_output_backoff_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: default_queue_max_duration_ms(),
            max_bytes: default_queue_max_bytes(),
            pause_after_recreating_ms: default_pause_after_recreating_ms(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_watchdog_tick_ms(),
        }
    }
}

// Default value functions
fn default_exact_name_score() -> u32 { 10 }
fn default_substring_score() -> u32 { 5 }
fn default_exact_channels_score() -> u32 { 5 }
fn default_near_channels_score() -> u32 { 2 }
fn default_bluetooth_bonus() -> u32 { 3 }
fn default_high_threshold() -> u32 { 15 }
fn default_medium_threshold() -> u32 { 10 }
fn default_low_threshold() -> u32 { 5 }
fn default_ambiguity_ratio() -> f64 { 0.8 }
fn default_cache_ttl_secs() -> u64 { 24 * 60 * 60 }
fn default_strip_suffixes() -> Vec<String> {
    DEFAULT_STRIP_SUFFIXES.iter().map(|s| s.to_string()).collect()
}
fn default_aliases() -> HashMap<String, String> {
    DEFAULT_ALIASES
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
fn default_bluetooth_curve() -> DebounceCurve { DebounceCurve::new(200, 200, 1200) }
fn default_usb_curve() -> DebounceCurve { DebounceCurve::new(100, 100, 600) }
fn default_built_in_curve() -> DebounceCurve { DebounceCurve::new(100, 0, 200) }
fn default_start_timeout_ms() -> u64 { 2500 }
fn default_heartbeat_timeout_ms() -> u64 { 10_000 }
fn default_input_max_retries() -> u32 { 3 }
fn default_input_backoff_ms() -> Vec<u64> { vec![1000, 2000, 4000] }
fn default_restart_window_secs() -> u64 { 600 }
fn default_max_restarts_in_window() -> usize { 6 }
fn default_recreate_timeout_ms() -> u64 { 1500 }
fn default_output_max_retries() -> u32 { 2 }
fn default_output_backoff_ms() -> Vec<u64> { vec![250, 750] }
fn default_queue_max_duration_ms() -> u64 { 5000 }
fn default_queue_max_bytes() -> usize { 5 * 1024 * 1024 }
fn default_pause_after_recreating_ms() -> u64 { 2000 }
fn default_poll_interval_ms() -> u64 { 1500 }
fn default_watchdog_tick_ms() -> u64 { 1000 }
