//! audio-route - keeps microphone and speaker routing in sync with the OS
//! device topology
//!
//! Device notifications, context changes and heartbeats feed a
//! [`RouteManager`] actor. It debounces them per device and drives a
//! single-flight [`ReconcileEngine`], which compares the desired route with
//! the active one and applies the smallest correction through the platform's
//! [`InputController`] and [`OutputController`].

pub mod config;
pub mod debounce;
pub mod decision;
pub mod devices;
pub mod diagnostics;
pub mod dry_run;
pub mod error;
mod file_watch;
pub mod machines;
pub mod manager;
pub mod output_queue;
pub mod paths;
pub mod providers;
pub mod reconcile;
pub mod topology_file;

#[cfg(test)]
mod test_support;

pub use config::{InputPreference, RouteConfig};
pub use decision::{AppMode, Decision, DecisionEngine, SystemContext};
pub use devices::{
    Confidence, DeviceId, DeviceInventory, DeviceMapper, DeviceNotification, DeviceSignature, MappingResult,
    NativeDevice, NotificationKind, Transport,
};
pub use diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticSink, TracingSink};
pub use error::{RouteError, RouteResult};
pub use manager::{RouteHandle, RouteManager};
pub use output_queue::{OutputQueue, OutputUnit};
pub use providers::{ContextProvider, DeviceMonitor, InputController, OutputController, SharedContext};
pub use reconcile::{Providers, ReconcileEngine, RouteStatus};
