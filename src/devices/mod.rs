//! Device contracts - value types shared by the mapper, decision engine and
//! reconcile engine
//!
//! Native descriptors ([`NativeDevice`]) are the only loosely-typed values in
//! the crate; they are converted into a closed [`DeviceSignature`] by the
//! [`DeviceMapper`] before any decision logic sees them.

mod inventory;
pub mod mapper;
pub mod normalize;

pub use inventory::{diff_inventories, DeviceInventory, DeviceNotification, NotificationKind};
pub use mapper::DeviceMapper;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Physical connection class of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Bluetooth,
    Usb,
    BuiltIn,
    Unknown,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Bluetooth => write!(f, "bluetooth"),
            Transport::Usb => write!(f, "usb"),
            Transport::BuiltIn => write!(f, "built_in"),
            Transport::Unknown => write!(f, "unknown"),
        }
    }
}

/// Opaque handle identifying a device for the I/O controllers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw device descriptor as reported by a native provider
///
/// `properties` carries whatever extra keys the platform adapter found; the
/// only key the core reads is `"transport"`, as a classification hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeDevice {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub channels: u16,
    #[serde(default)]
    pub is_input: bool,
    #[serde(default)]
    pub is_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, serde_json::Value>,
}

impl NativeDevice {
    /// Input-capable descriptor, mostly useful for tests and adapters
    pub fn input(id: impl Into<String>, name: impl Into<String>, channels: u16) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            channels,
            is_input: true,
            is_output: false,
            manufacturer: None,
            properties: HashMap::new(),
        }
    }

    /// Output-capable descriptor
    pub fn output(id: impl Into<String>, name: impl Into<String>, channels: u16) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            channels,
            is_input: false,
            is_output: true,
            manufacturer: None,
            properties: HashMap::new(),
        }
    }

    /// Transport hint supplied by the adapter, if any
    pub fn transport_hint(&self) -> Option<&str> {
        self.properties.get("transport").and_then(|v| v.as_str())
    }
}

/// Normalized, immutable identity of a device
///
/// Built only by [`DeviceMapper::signature`] and friends, so two signatures
/// compare equal exactly when their normalized fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSignature {
    name: String,
    transport: Transport,
    channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manufacturer: Option<String>,
}

impl DeviceSignature {
    pub(crate) fn from_normalized(
        name: String,
        transport: Transport,
        channels: u16,
        manufacturer: Option<String>,
    ) -> Self {
        Self {
            name,
            transport,
            channels,
            manufacturer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Channel count, 0 when unknown
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    /// Key used by the mapping cache
    pub fn cache_key(&self) -> String {
        format!("{}|{}|{}", self.name, self.transport, self.channels)
    }

    /// Key used by the debounce counters (name + transport)
    pub fn debounce_key(&self) -> String {
        format!("{}|{}", self.name, self.transport)
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}ch]", self.name, self.transport, self.channels)
    }
}

/// Quality rating of a device identity match
///
/// Ordered from worst to best so `max`/comparisons read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// One level worse, saturating at `None`
    pub fn downgrade(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium => Confidence::Low,
            Confidence::Low | Confidence::None => Confidence::None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::None => write!(f, "none"),
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Outcome of a single mapping attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub handle: Option<DeviceId>,
    pub confidence: Confidence,
    pub reason: String,
    /// Best candidate score (0 for cache hits and empty searches)
    #[serde(default)]
    pub score: u32,
    /// Whether this result was served from the mapping cache
    #[serde(default)]
    pub cached: bool,
}

impl MappingResult {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            handle: None,
            confidence: Confidence::None,
            reason: reason.into(),
            score: 0,
            cached: false,
        }
    }

    /// Usable iff confidence is HIGH or MEDIUM and a handle is present
    pub fn is_usable(&self) -> bool {
        self.handle.is_some() && matches!(self.confidence, Confidence::High | Confidence::Medium)
    }
}

/// Where the desired input of a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredSource {
    UserSelection,
    SystemDefault,
    None,
}

/// Immutable view of desired vs. active routing for one reconcile pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub system_default_input: Option<DeviceSignature>,
    pub desired_input: Option<DeviceSignature>,
    pub desired_source: DesiredSource,
    pub active_input: Option<DeviceSignature>,
    pub active_output: Option<DeviceSignature>,
}

impl RouteSnapshot {
    /// Desired differs from active, or desired is set while active is absent
    pub fn input_changed(&self) -> bool {
        match (&self.desired_input, &self.active_input) {
            (Some(_), None) => true,
            (desired, active) => desired != active,
        }
    }

    /// The active output is absent
    pub fn output_changed(&self) -> bool {
        self.active_output.is_none()
    }
}
