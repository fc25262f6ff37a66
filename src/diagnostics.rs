//! Diagnostic events and sinks

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::decision::{Decision, Rule};
use crate::devices::{DeviceId, DeviceSignature, MappingResult, RouteSnapshot};

/// Event published after reconcile passes and machine transitions
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticKind {
    RouteSnapshot {
        snapshot: RouteSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        mapping: Option<MappingResult>,
        decision: Decision,
        rule: Rule,
    },
    InputActive {
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<DeviceSignature>,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<DeviceId>,
    },
    InputFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<DeviceSignature>,
        error_kind: &'static str,
        reason: String,
    },
    OutputReady {
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<DeviceSignature>,
    },
    OutputError {
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<DeviceSignature>,
        error_kind: &'static str,
        reason: String,
    },
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::RouteSnapshot { .. } => "route_snapshot",
            DiagnosticKind::InputActive { .. } => "input_active",
            DiagnosticKind::InputFailed { .. } => "input_failed",
            DiagnosticKind::OutputReady { .. } => "output_ready",
            DiagnosticKind::OutputError { .. } => "output_error",
        }
    }
}

impl DiagnosticEvent {
    pub fn now(kind: DiagnosticKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }
}

/// Receiver of diagnostic events; must not block
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Writes every event as one JSON log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: DiagnosticEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "audio_route::diagnostics", kind = event.kind.name(), "{}", json),
            Err(e) => warn!("Failed to serialize diagnostic event {}: {}", event.kind.name(), e),
        }
    }
}

/// Forwards events into a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DiagnosticEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DiagnosticEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DiagnosticSink for ChannelSink {
    fn emit(&self, event: DiagnosticEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DesiredSource;

    #[test]
    fn test_event_serializes_with_tag_and_timestamp() {
        let event = DiagnosticEvent::now(DiagnosticKind::InputFailed {
            signature: None,
            error_kind: "no_input_available",
            reason: "no input device available".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "input_failed");
        assert_eq!(value["error_kind"], "no_input_available");
        assert!(value["at"].is_string());
        assert!(value.get("signature").is_none());
    }

    #[test]
    fn test_route_snapshot_event_carries_decision() {
        let event = DiagnosticEvent::now(DiagnosticKind::RouteSnapshot {
            snapshot: RouteSnapshot {
                system_default_input: None,
                desired_input: None,
                desired_source: DesiredSource::None,
                active_input: None,
                active_output: None,
            },
            mapping: None,
            decision: Decision::Noop,
            rule: Rule::NothingChanged,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["decision"]["action"], "noop");
        assert_eq!(value["rule"], "nothing_changed");
        assert_eq!(value["snapshot"]["desired_source"], "none");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(DiagnosticEvent::now(DiagnosticKind::OutputReady { signature: None }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind.name(), "output_ready");

        drop(rx);
        sink.emit(DiagnosticEvent::now(DiagnosticKind::OutputReady { signature: None }));
    }
}
