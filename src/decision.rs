//! Decision engine - maps (snapshot, mapping, context) to a single action
//!
//! The rule table is evaluated top to bottom and the first matching rule
//! wins. [`evaluate`] is pure; [`DecisionEngine::decide`] wraps it with the
//! canonical decision log line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

use crate::devices::{Confidence, MappingResult, RouteSnapshot};

/// Host application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMode::Idle => write!(f, "idle"),
            AppMode::Listening => write!(f, "listening"),
            AppMode::Processing => write!(f, "processing"),
            AppMode::Speaking => write!(f, "speaking"),
        }
    }
}

/// Host conditions read on every reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemContext {
    #[serde(default)]
    pub first_run_in_progress: bool,
    #[serde(default)]
    pub permission_restart_pending: bool,
    #[serde(default)]
    pub update_in_progress: bool,
    #[serde(default = "default_true")]
    pub mic_permission_granted: bool,
    #[serde(default)]
    pub device_busy: bool,
    #[serde(default)]
    pub network_offline: bool,
    #[serde(default)]
    pub app_mode: AppMode,
}

fn default_true() -> bool {
    true
}

impl Default for SystemContext {
    fn default() -> Self {
        Self {
            first_run_in_progress: false,
            permission_restart_pending: false,
            update_in_progress: false,
            mic_permission_granted: true,
            device_busy: false,
            network_offline: false,
            app_mode: AppMode::Idle,
        }
    }
}

impl SystemContext {
    /// Clean context in listening mode
    pub fn listening() -> Self {
        Self {
            app_mode: AppMode::Listening,
            ..Self::default()
        }
    }

    fn is_listening(&self) -> bool {
        self.app_mode == AppMode::Listening
    }
}

/// Action chosen for one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Decision {
    /// Apply the route; `use_system_default` routes input to the OS default
    Start { use_system_default: bool },
    Abort,
    Retry,
    Degrade,
    Noop,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Start { use_system_default: false } => "start",
            Decision::Start { use_system_default: true } => "start_system_default",
            Decision::Abort => "abort",
            Decision::Retry => "retry",
            Decision::Degrade => "degrade",
            Decision::Noop => "noop",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    FirstRunInProgress,
    PermissionRestartPending,
    UpdateInProgress,
    MicPermissionDenied,
    DeviceBusy,
    NetworkOffline,
    NothingChanged,
    NotListening,
    MappingNone,
    MappingLow,
    Apply,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::FirstRunInProgress => "first_run_in_progress",
            Rule::PermissionRestartPending => "permission_restart_pending",
            Rule::UpdateInProgress => "update_in_progress",
            Rule::MicPermissionDenied => "mic_permission_denied",
            Rule::DeviceBusy => "device_busy",
            Rule::NetworkOffline => "network_offline",
            Rule::NothingChanged => "nothing_changed",
            Rule::NotListening => "not_listening",
            Rule::MappingNone => "mapping_none",
            Rule::MappingLow => "mapping_low",
            Rule::Apply => "apply",
        }
    }

    /// Whether the rule is one of the hard-stop context guards
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Rule::FirstRunInProgress
                | Rule::PermissionRestartPending
                | Rule::UpdateInProgress
                | Rule::MicPermissionDenied
        )
    }
}

/// Evaluate the rule table
pub fn evaluate(
    snapshot: &RouteSnapshot,
    mapping: Option<&MappingResult>,
    ctx: &SystemContext,
) -> (Decision, Rule) {
    if ctx.first_run_in_progress {
        return (Decision::Abort, Rule::FirstRunInProgress);
    }
    if ctx.permission_restart_pending {
        return (Decision::Abort, Rule::PermissionRestartPending);
    }
    if ctx.update_in_progress {
        return (Decision::Abort, Rule::UpdateInProgress);
    }
    if !ctx.mic_permission_granted {
        return (Decision::Abort, Rule::MicPermissionDenied);
    }
    if ctx.device_busy && ctx.is_listening() {
        return (Decision::Retry, Rule::DeviceBusy);
    }
    if ctx.network_offline && ctx.is_listening() {
        return (Decision::Degrade, Rule::NetworkOffline);
    }

    let input_changed = snapshot.input_changed();
    if !input_changed && !snapshot.output_changed() {
        return (Decision::Noop, Rule::NothingChanged);
    }
    if !ctx.is_listening() && input_changed {
        return (Decision::Noop, Rule::NotListening);
    }

    if let Some(mapping) = mapping {
        if !mapping.is_usable() {
            match mapping.confidence {
                Confidence::None => return (Decision::Abort, Rule::MappingNone),
                Confidence::Low => {
                    return (
                        Decision::Start {
                            use_system_default: true,
                        },
                        Rule::MappingLow,
                    )
                }
                // High/Medium without a handle: apply anyway, routed to default
                Confidence::High | Confidence::Medium => {}
            }
        }
    }

    (
        Decision::Start {
            use_system_default: false,
        },
        Rule::Apply,
    )
}

/// Decision engine with canonical logging
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    source: &'static str,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new("reconcile")
    }
}

impl DecisionEngine {
    pub fn new(source: &'static str) -> Self {
        Self { source }
    }

    /// Decide and emit one canonical log line
    pub fn decide(
        &self,
        snapshot: &RouteSnapshot,
        mapping: Option<&MappingResult>,
        ctx: &SystemContext,
    ) -> Decision {
        self.decide_with_rule(snapshot, mapping, ctx).0
    }

    /// Same as [`DecisionEngine::decide`], also returning the rule that fired
    pub fn decide_with_rule(
        &self,
        snapshot: &RouteSnapshot,
        mapping: Option<&MappingResult>,
        ctx: &SystemContext,
    ) -> (Decision, Rule) {
        let started = Instant::now();
        let (decision, rule) = evaluate(snapshot, mapping, ctx);
        let elapsed_us = started.elapsed().as_micros() as u64;
        let confidence = mapping.map(|m| m.confidence.to_string());

        info!(
            source = self.source,
            decision = decision.as_str(),
            rule = rule.as_str(),
            first_run_in_progress = ctx.first_run_in_progress,
            permission_restart_pending = ctx.permission_restart_pending,
            update_in_progress = ctx.update_in_progress,
            mic_permission_granted = ctx.mic_permission_granted,
            device_busy = ctx.device_busy,
            network_offline = ctx.network_offline,
            app_mode = %ctx.app_mode,
            input_changed = snapshot.input_changed(),
            output_changed = snapshot.output_changed(),
            confidence = confidence.as_deref(),
            elapsed_us,
            "route decision"
        );

        (decision, rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DesiredSource, DeviceId, DeviceSignature, Transport};
    use proptest::prelude::*;

    fn sig(name: &str) -> DeviceSignature {
        DeviceSignature::from_normalized(name.to_string(), Transport::Usb, 2, None)
    }

    fn snapshot(desired: Option<&str>, active: Option<&str>, output: Option<&str>) -> RouteSnapshot {
        RouteSnapshot {
            system_default_input: Some(sig("default")),
            desired_input: desired.map(sig),
            desired_source: DesiredSource::UserSelection,
            active_input: active.map(sig),
            active_output: output.map(sig),
        }
    }

    fn mapping(confidence: Confidence, handle: bool) -> MappingResult {
        MappingResult {
            handle: handle.then(|| DeviceId::new("mic")),
            confidence,
            reason: "test".to_string(),
            score: 0,
            cached: false,
        }
    }

    #[test]
    fn test_first_run_aborts_regardless_of_snapshot() {
        let ctx = SystemContext {
            first_run_in_progress: true,
            device_busy: true,
            ..SystemContext::listening()
        };
        for snap in [
            snapshot(Some("a"), None, None),
            snapshot(Some("a"), Some("a"), Some("spk")),
            snapshot(None, None, None),
        ] {
            let result = evaluate(&snap, Some(&mapping(Confidence::High, true)), &ctx);
            assert_eq!(result, (Decision::Abort, Rule::FirstRunInProgress));
        }
    }

    #[test]
    fn test_guard_order() {
        let snap = snapshot(Some("a"), None, None);
        let mut ctx = SystemContext {
            permission_restart_pending: true,
            update_in_progress: true,
            mic_permission_granted: false,
            ..SystemContext::listening()
        };
        assert_eq!(evaluate(&snap, None, &ctx).1, Rule::PermissionRestartPending);
        ctx.permission_restart_pending = false;
        assert_eq!(evaluate(&snap, None, &ctx).1, Rule::UpdateInProgress);
        ctx.update_in_progress = false;
        assert_eq!(evaluate(&snap, None, &ctx).1, Rule::MicPermissionDenied);
        assert!(Rule::MicPermissionDenied.is_blocking());
    }

    #[test]
    fn test_busy_and_offline_only_matter_when_listening() {
        let snap = snapshot(Some("a"), None, Some("spk"));
        let busy = SystemContext {
            device_busy: true,
            ..SystemContext::listening()
        };
        assert_eq!(evaluate(&snap, None, &busy).0, Decision::Retry);

        let offline = SystemContext {
            network_offline: true,
            ..SystemContext::listening()
        };
        assert_eq!(evaluate(&snap, None, &offline).0, Decision::Degrade);

        let idle_busy = SystemContext {
            device_busy: true,
            app_mode: AppMode::Idle,
            ..SystemContext::default()
        };
        assert_eq!(evaluate(&snap, None, &idle_busy), (Decision::Noop, Rule::NotListening));
    }

    #[test]
    fn test_unchanged_route_is_noop() {
        let snap = snapshot(Some("a"), Some("a"), Some("spk"));
        let result = evaluate(&snap, Some(&mapping(Confidence::High, true)), &SystemContext::listening());
        assert_eq!(result, (Decision::Noop, Rule::NothingChanged));
    }

    #[test]
    fn test_output_change_outside_listening_starts() {
        let snap = snapshot(Some("a"), Some("a"), None);
        let result = evaluate(&snap, None, &SystemContext::default());
        assert_eq!(result.0, Decision::Start { use_system_default: false });
    }

    #[test]
    fn test_mapping_confidence_rules() {
        let snap = snapshot(Some("a"), None, Some("spk"));
        let ctx = SystemContext::listening();

        let none = evaluate(&snap, Some(&mapping(Confidence::None, false)), &ctx);
        assert_eq!(none, (Decision::Abort, Rule::MappingNone));

        let low = evaluate(&snap, Some(&mapping(Confidence::Low, true)), &ctx);
        assert_eq!(
            low,
            (Decision::Start { use_system_default: true }, Rule::MappingLow)
        );

        let medium = evaluate(&snap, Some(&mapping(Confidence::Medium, true)), &ctx);
        assert_eq!(medium, (Decision::Start { use_system_default: false }, Rule::Apply));

        let absent = evaluate(&snap, None, &ctx);
        assert_eq!(absent, (Decision::Start { use_system_default: false }, Rule::Apply));
    }

    #[test]
    fn test_decide_matches_evaluate() {
        let engine = DecisionEngine::default();
        let snap = snapshot(Some("a"), None, Some("spk"));
        let decision = engine.decide(&snap, Some(&mapping(Confidence::Low, true)), &SystemContext::listening());
        assert_eq!(decision, Decision::Start { use_system_default: true });
        assert_eq!(decision.to_string(), "start_system_default");
    }

    fn any_context() -> impl Strategy<Value = SystemContext> {
        (
            any::<[bool; 6]>(),
            prop::sample::select(vec![AppMode::Idle, AppMode::Listening, AppMode::Processing, AppMode::Speaking]),
        )
            .prop_map(|(flags, app_mode)| SystemContext {
                first_run_in_progress: flags[0],
                permission_restart_pending: flags[1],
                update_in_progress: flags[2],
                mic_permission_granted: flags[3],
                device_busy: flags[4],
                network_offline: flags[5],
                app_mode,
            })
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_pure(
            ctx in any_context(),
            desired in prop::option::of(prop::sample::select(vec!["a", "b"])),
            active in prop::option::of(prop::sample::select(vec!["a", "b"])),
            output in prop::option::of(Just("spk")),
            confidence in prop::sample::select(vec![Confidence::None, Confidence::Low, Confidence::Medium, Confidence::High]),
        ) {
            let snap = snapshot(desired, active, output);
            let m = mapping(confidence, confidence != Confidence::None);
            let first = evaluate(&snap, Some(&m), &ctx);
            let second = evaluate(&snap.clone(), Some(&m.clone()), &ctx);
            prop_assert_eq!(first, second);

            if ctx.first_run_in_progress {
                prop_assert_eq!(first.0, Decision::Abort);
            }
        }
    }
}
