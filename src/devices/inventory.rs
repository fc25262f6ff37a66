//! Device inventory as reported by a monitor, and diffing between polls

use serde::{Deserialize, Serialize};

use super::{DeviceId, NativeDevice};

/// Full device topology at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInventory {
    #[serde(default)]
    pub default_input: Option<DeviceId>,
    #[serde(default)]
    pub default_output: Option<DeviceId>,
    #[serde(default)]
    pub inputs: Vec<NativeDevice>,
    #[serde(default)]
    pub outputs: Vec<NativeDevice>,
}

impl DeviceInventory {
    pub fn find_input(&self, id: &DeviceId) -> Option<&NativeDevice> {
        self.inputs.iter().find(|d| &d.id == id)
    }

    pub fn find_output(&self, id: &DeviceId) -> Option<&NativeDevice> {
        self.outputs.iter().find(|d| &d.id == id)
    }

    pub fn default_input_device(&self) -> Option<&NativeDevice> {
        self.default_input.as_ref().and_then(|id| self.find_input(id))
    }

    pub fn default_output_device(&self) -> Option<&NativeDevice> {
        self.default_output
            .as_ref()
            .and_then(|id| self.find_output(id))
    }
}

/// Kind of topology change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Connected,
    Disconnected,
    DefaultInputChanged,
    DefaultOutputChanged,
}

/// Push-style change notification from a device monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNotification {
    pub kind: NotificationKind,
    pub device: NativeDevice,
}

impl DeviceNotification {
    pub fn new(kind: NotificationKind, device: NativeDevice) -> Self {
        Self { kind, device }
    }
}

/// Compute notifications turning `prev` into `next`
///
/// Used by polling monitors that have no native change callbacks.
/// Disconnects are reported before connects, then default changes.
pub fn diff_inventories(prev: &DeviceInventory, next: &DeviceInventory) -> Vec<DeviceNotification> {
    let mut out = Vec::new();

    let all_prev = prev.inputs.iter().chain(prev.outputs.iter());
    let all_next = || next.inputs.iter().chain(next.outputs.iter());

    let mut seen = std::collections::HashSet::new();
    for device in all_prev {
        if seen.insert(&device.id) && !all_next().any(|d| d.id == device.id) {
            out.push(DeviceNotification::new(
                NotificationKind::Disconnected,
                device.clone(),
            ));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for device in all_next() {
        let known = prev
            .inputs
            .iter()
            .chain(prev.outputs.iter())
            .any(|d| d.id == device.id);
        if seen.insert(&device.id) && !known {
            out.push(DeviceNotification::new(
                NotificationKind::Connected,
                device.clone(),
            ));
        }
    }

    if prev.default_input != next.default_input {
        if let Some(device) = next.default_input_device() {
            out.push(DeviceNotification::new(
                NotificationKind::DefaultInputChanged,
                device.clone(),
            ));
        }
    }

    if prev.default_output != next.default_output {
        if let Some(device) = next.default_output_device() {
            out.push(DeviceNotification::new(
                NotificationKind::DefaultOutputChanged,
                device.clone(),
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(inputs: Vec<NativeDevice>, default_input: Option<&str>) -> DeviceInventory {
        DeviceInventory {
            default_input: default_input.map(DeviceId::new),
            default_output: Some(DeviceId::new("spk")),
            inputs,
            outputs: vec![NativeDevice::output("spk", "Speakers", 2)],
        }
    }

    #[test]
    fn test_diff_reports_connect_and_disconnect() {
        let prev = inventory(vec![NativeDevice::input("a", "Mic A", 1)], Some("a"));
        let next = inventory(vec![NativeDevice::input("b", "Mic B", 1)], Some("b"));

        let changes = diff_inventories(&prev, &next);
        let kinds: Vec<_> = changes.iter().map(|c| (c.kind, c.device.id.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (NotificationKind::Disconnected, "a"),
                (NotificationKind::Connected, "b"),
                (NotificationKind::DefaultInputChanged, "b"),
            ]
        );
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let inv = inventory(vec![NativeDevice::input("a", "Mic A", 1)], Some("a"));
        assert!(diff_inventories(&inv, &inv.clone()).is_empty());
    }

    #[test]
    fn test_default_lookup() {
        let inv = inventory(vec![NativeDevice::input("a", "Mic A", 1)], Some("a"));
        assert_eq!(inv.default_input_device().map(|d| d.name.as_str()), Some("Mic A"));
        assert_eq!(inv.default_output_device().map(|d| d.name.as_str()), Some("Speakers"));

        let dangling = inventory(vec![], Some("missing"));
        assert!(dangling.default_input_device().is_none());
    }
}
