//! Reconcile engine - compares desired and active routes and applies the
//! minimal corrective action
//!
//! One pass: pull the native inventory, drop stale active routes, build a
//! [`RouteSnapshot`], resolve the desired input through the mapper, decide,
//! then drive the machines and controllers.
//!
//! ## Single-flight
//! At most one pass runs at a time. A trigger arriving mid-pass stores its
//! context as pending (latest wins) and returns immediately; the running pass
//! then loops exactly once more with that context.
//!
//! ## Locking
//! `state` guards flags, counters, machines and active routes only. It is
//! never held across an `.await`; controller calls happen between short
//! critical sections and are bounded by `tokio::time::timeout`.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{InputMachineConfig, InputPreference, MapperConfig, RouteConfig};
use crate::decision::{Decision, DecisionEngine, Rule, SystemContext};
use crate::devices::{
    DesiredSource, DeviceId, DeviceInventory, DeviceMapper, DeviceSignature, MappingResult, RouteSnapshot,
};
use crate::diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticSink};
use crate::error::RouteError;
use crate::machines::{backoff_at, FailureOutcome, InputMachine, InputPhase, OutputMachine, OutputPhase};
use crate::output_queue::{OutputQueue, QueueStats};
use crate::providers::{DeviceMonitor, InputController, OutputController};


/// External collaborators driven by the engine
#[derive(Clone)]
pub struct Providers {
    pub monitor: Arc<dyn DeviceMonitor>,
    pub input: Arc<dyn InputController>,
    pub output: Arc<dyn OutputController>,
    pub sink: Arc<dyn DiagnosticSink>,
}

/// Input the engine routed capture to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveInput {
    pub signature: DeviceSignature,
    /// `None` means the system default input
    pub handle: Option<DeviceId>,
}

/// Output the engine recreated playback against
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveOutput {
    pub signature: DeviceSignature,
    pub id: DeviceId,
}

/// Delayed work the owner has to schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Restart capture once the backoff elapsed
    RetryInput { after: Duration, epoch: u64 },
    /// Recreate playback once the backoff elapsed
    RetryOutput { after: Duration },
    /// Run another reconcile (busy device)
    Reconcile { after: Duration },
}

/// Side effects of an engine operation
#[derive(Debug, Default)]
pub struct Effects {
    pub follow_ups: Vec<FollowUp>,
    pub error: Option<RouteError>,
}

impl Effects {
    fn fail(&mut self, error: RouteError) {
        warn!(kind = error.kind(), "{}", error);
        self.error = Some(error);
    }

    fn merge(&mut self, other: Effects) {
        self.follow_ups.extend(other.follow_ups);
        if other.error.is_some() {
            self.error = other.error;
        }
    }
}

/// Result of one reconcile pass
#[derive(Debug, Default)]
pub struct RunReport {
    pub decision: Option<Decision>,
    pub rule: Option<Rule>,
    pub snapshot: Option<RouteSnapshot>,
    pub mapping: Option<MappingResult>,
    pub effects: Effects,
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Another pass was in flight; this trigger was folded into it
    Coalesced,
    /// Passes ran to completion; `report` is the last one
    Completed { runs: u32, report: RunReport },
}

impl ReconcileOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            ReconcileOutcome::Coalesced => None,
            ReconcileOutcome::Completed { report, .. } => Some(report),
        }
    }

    pub fn into_report(self) -> Option<RunReport> {
        match self {
            ReconcileOutcome::Coalesced => None,
            ReconcileOutcome::Completed { report, .. } => Some(report),
        }
    }
}

/// Atomically captured view of the engine, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RouteStatus {
    pub input: InputPhase,
    pub output: OutputPhase,
    pub active_input: Option<ActiveInput>,
    pub active_output: Option<ActiveOutput>,
    pub selection: Option<InputPreference>,
    pub fallback_to_default: bool,
    pub input_consecutive_retries: u32,
    pub input_restarts_in_window: usize,
    pub output_retries_used: u32,
    pub busy_retries: u32,
    pub reconcile_in_flight: bool,
    pub reconcile_pending: bool,
    pub total_runs: u64,
    pub mapper_cache_len: usize,
    pub queue: QueueStats,
}

struct EngineState {
    in_flight: bool,
    pending: Option<SystemContext>,
    input: InputMachine,
    output: OutputMachine,
    active_input: Option<ActiveInput>,
    active_output: Option<ActiveOutput>,
    selection: Option<InputPreference>,
    /// Set once the input budget is exhausted; routes to the system default
    /// until the user selects again or a new input connects
    fallback_to_default: bool,
    busy_retries: u32,
    total_runs: u64,
}

/// Clears the in-flight flag if a pass is dropped mid-way
struct FlightGuard<'a> {
    state: &'a Mutex<EngineState>,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut st = self.state.lock();
            st.in_flight = false;
            st.pending = None;
        }
    }
}

pub struct ReconcileEngine {
    providers: Providers,
    mapper: DeviceMapper,
    decisions: DecisionEngine,
    input_config: InputMachineConfig,
    state: Mutex<EngineState>,
}

impl ReconcileEngine {
    pub fn new(config: &RouteConfig, providers: Providers) -> Self {
        Self {
            providers,
            mapper: DeviceMapper::new(&config.mapper),
            decisions: DecisionEngine::new("reconcile"),
            input_config: config.input.clone(),
            state: Mutex::new(EngineState {
                in_flight: false,
                pending: None,
                input: InputMachine::new(config.input.clone()),
                output: OutputMachine::new(config.output.clone()),
                active_input: None,
                active_output: None,
                selection: config.preferred_input.clone(),
                fallback_to_default: false,
                busy_retries: 0,
                total_runs: 0,
            }),
        }
    }

    pub fn mapper(&self) -> &DeviceMapper {
        &self.mapper
    }

    /// Run a reconcile pass, or fold this trigger into the running one
    pub async fn reconcile(&self, ctx: SystemContext) -> ReconcileOutcome {
        {
            let mut st = self.state.lock();
            if st.in_flight {
                st.pending = Some(ctx);
                debug!("reconcile in flight, trigger coalesced");
                return ReconcileOutcome::Coalesced;
            }
            st.in_flight = true;
        }

        let mut guard = FlightGuard {
            state: &self.state,
            armed: true,
        };
        let mut ctx = ctx;
        let mut runs = 0u32;
        let mut follow_ups = Vec::new();

        loop {
            let mut report = self.run_once(ctx).await;
            runs += 1;
            follow_ups.append(&mut report.effects.follow_ups);

            let next = {
                let mut st = self.state.lock();
                st.total_runs += 1;
                let next = st.pending.take();
                if next.is_none() {
                    st.in_flight = false;
                }
                next
            };

            match next {
                Some(pending) => {
                    debug!(runs, "running coalesced reconcile");
                    ctx = pending;
                }
                None => {
                    guard.armed = false;
                    report.effects.follow_ups = follow_ups;
                    return ReconcileOutcome::Completed { runs, report };
                }
            }
        }
    }

    async fn run_once(&self, ctx: SystemContext) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::default();

        let inventory = match self.providers.monitor.current_devices().await {
            Ok(inventory) => inventory,
            Err(e) => {
                report.effects.fail(RouteError::Monitor(format!("{:#}", e)));
                return report;
            }
        };
        let now = Instant::now();

        let (active_input, active_output, selection, fallback) = {
            let mut st = self.state.lock();
            clear_stale_routes(&mut st, &inventory);
            (
                st.active_input.as_ref().map(|a| a.signature.clone()),
                st.active_output.as_ref().map(|a| a.signature.clone()),
                st.selection.clone(),
                st.fallback_to_default,
            )
        };

        let system_default = inventory
            .default_input_device()
            .map(|d| self.mapper.signature(d));

        let (desired, source, mapping) = match selection.filter(|_| !fallback) {
            Some(pref) => {
                let wanted = self.mapper.signature_from_name(&pref.name, pref.channels);
                let mapping = self.mapper.resolve_signature(&wanted, &inventory.inputs, now);
                // Compare against the concrete device once it is identified
                let desired = if mapping.is_usable() {
                    mapping
                        .handle
                        .as_ref()
                        .and_then(|id| inventory.find_input(id))
                        .map(|d| self.mapper.signature(d))
                        .unwrap_or(wanted)
                } else {
                    wanted
                };
                (Some(desired), DesiredSource::UserSelection, Some(mapping))
            }
            None => match inventory.default_input_device() {
                Some(device) => (
                    system_default.clone(),
                    DesiredSource::SystemDefault,
                    Some(self.mapper.resolve(device, &inventory.inputs, now)),
                ),
                None => (None, DesiredSource::None, None),
            },
        };

        let snapshot = RouteSnapshot {
            system_default_input: system_default.clone(),
            desired_input: desired,
            desired_source: source,
            active_input,
            active_output,
        };

        let (decision, rule) = self.decisions.decide_with_rule(&snapshot, mapping.as_ref(), &ctx);
        self.emit(DiagnosticKind::RouteSnapshot {
            snapshot: snapshot.clone(),
            mapping: mapping.clone(),
            decision,
            rule,
        });

        {
            let mut st = self.state.lock();
            if decision == Decision::Retry {
                if st.busy_retries < self.input_config.max_retries {
                    let after = backoff_at(&self.input_config.backoff_ms, st.busy_retries);
                    st.busy_retries += 1;
                    report.effects.follow_ups.push(FollowUp::Reconcile { after });
                }
            } else {
                st.busy_retries = 0;
            }
        }

        match decision {
            Decision::Abort => {
                let error = if rule.is_blocking() {
                    RouteError::ReconcileBlocked(rule.as_str())
                } else {
                    let (confidence, reason) = mapping
                        .as_ref()
                        .map(|m| (m.confidence, m.reason.clone()))
                        .unwrap_or((crate::devices::Confidence::None, String::new()));
                    RouteError::MappingUnusable { confidence, reason }
                };
                report.effects.fail(error);
            }
            Decision::Retry => {
                if report.effects.follow_ups.is_empty() {
                    report.effects.fail(RouteError::DeviceBusy);
                } else {
                    info!("input device busy, reconcile rescheduled");
                }
            }
            Decision::Degrade => {
                warn!("network offline, route left in degraded mode");
            }
            Decision::Noop => {}
            Decision::Start { use_system_default } => {
                if snapshot.input_changed() {
                    let target = if use_system_default {
                        system_default.clone().map(|signature| ActiveInput {
                            signature,
                            handle: None,
                        })
                    } else {
                        let handle = match source {
                            DesiredSource::UserSelection => mapping.as_ref().and_then(|m| m.handle.clone()),
                            DesiredSource::SystemDefault | DesiredSource::None => None,
                        };
                        snapshot
                            .desired_input
                            .clone()
                            .map(|signature| ActiveInput { signature, handle })
                    };

                    match target {
                        Some(target) if !inventory.inputs.is_empty() => {
                            let effects = self.apply_input(target).await;
                            report.effects.merge(effects);
                        }
                        _ => {
                            self.emit(DiagnosticKind::InputFailed {
                                signature: snapshot.desired_input.clone(),
                                error_kind: RouteError::NoInputAvailable.kind(),
                                reason: RouteError::NoInputAvailable.to_string(),
                            });
                            report.effects.fail(RouteError::NoInputAvailable);
                        }
                    }
                }

                if snapshot.output_changed() {
                    let effects = self.apply_output(&inventory).await;
                    report.effects.merge(effects);
                }
            }
        }

        debug!(
            decision = %decision,
            elapsed_us = started.elapsed().as_micros() as u64,
            "reconcile pass finished"
        );

        report.decision = Some(decision);
        report.rule = Some(rule);
        report.snapshot = Some(snapshot);
        report.mapping = mapping;
        report
    }

    /// Stop-then-start capture against `target`
    ///
    /// Skipped when capture is healthy and already bound to the same device:
    /// the same explicit handle, or the system default still naming the same
    /// device.
    async fn apply_input(&self, target: ActiveInput) -> Effects {
        let need_stop = {
            let mut st = self.state.lock();
            let already_routed = st.active_input.as_ref().is_some_and(|active| is_same_route(active, &target));
            if already_routed && st.input.is_healthy() {
                debug!(handle = ?target.handle, "input already routed, restart skipped");
                st.active_input = Some(target);
                return Effects::default();
            }
            match st.input.phase() {
                InputPhase::Starting | InputPhase::Active => st.input.begin_stop(),
                // Failed keeps its state so the start below resets the
                // budget, but the controller may still hold the device
                InputPhase::Failed => true,
                InputPhase::Stopping | InputPhase::Stopped => false,
            }
        };

        if need_stop {
            self.stop_input_controller().await;
        }

        let attempt = {
            let mut st = self.state.lock();
            st.input.stop_completed();
            st.active_input = None;
            if let Err(e) = st.input.begin_start(Instant::now()) {
                let mut effects = Effects::default();
                effects.fail(e);
                return effects;
            }
            info!(device = %target.signature, handle = ?target.handle, "routing input");
            st.active_input = Some(target.clone());
            st.input.retry_epoch()
        };

        self.start_input_controller(target.handle, attempt).await
    }

    /// Start the controller for the attempt tagged `attempt`
    async fn start_input_controller(&self, handle: Option<DeviceId>, attempt: u64) -> Effects {
        let start_timeout = self.state.lock().input.start_timeout();
        let result = match timeout(start_timeout, self.providers.input.start(handle.clone())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RouteError::Controller(format!("{:#}", e))),
            Err(_) => Err(RouteError::StartTimeout(start_timeout)),
        };

        match result {
            Ok(()) => {
                debug!(handle = ?handle, "input controller started");
                Effects::default()
            }
            Err(error) => self.record_input_failure(error, attempt, Instant::now()),
        }
    }

    async fn stop_input_controller(&self) {
        let stop_timeout = self.state.lock().input.start_timeout();
        match timeout(stop_timeout, self.providers.input.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Input controller stop failed: {:#}", e),
            Err(_) => warn!("Input controller stop timed out after {:?}", stop_timeout),
        }
    }

    /// Count a failure of the start attempt tagged `attempt`
    ///
    /// The watchdog deadline and the controller call timeout can both report
    /// the same attempt; whichever lands second sees a newer epoch and is
    /// dropped.
    fn record_input_failure(&self, error: RouteError, attempt: u64, now: Instant) -> Effects {
        let mut effects = Effects::default();
        let event = {
            let mut st = self.state.lock();
            if st.input.retry_epoch() != attempt {
                debug!(attempt, kind = error.kind(), "failure of a superseded input attempt ignored");
                return effects;
            }
            match st.input.fail(now, &error) {
                Ok(FailureOutcome::Retry { after, attempt }) => {
                    warn!(
                        kind = error.kind(),
                        attempt,
                        backoff_ms = after.as_millis() as u64,
                        "input failed, restart scheduled"
                    );
                    effects.follow_ups.push(FollowUp::RetryInput {
                        after,
                        epoch: st.input.retry_epoch(),
                    });
                    None
                }
                Ok(FailureOutcome::Exhausted) => {
                    st.fallback_to_default = true;
                    let signature = st.active_input.take().map(|a| a.signature);
                    Some(DiagnosticKind::InputFailed {
                        signature,
                        error_kind: error.kind(),
                        reason: error.to_string(),
                    })
                }
                Err(invalid) => {
                    // Stopped or restarted while the call was in flight
                    debug!("input failure ignored: {}", invalid);
                    None
                }
            }
        };

        if let Some(kind) = event {
            self.emit(kind);
            effects.fail(error);
        }
        effects
    }

    /// A scheduled input restart is due
    pub async fn retry_input(&self, epoch: u64) -> Effects {
        if !self.state.lock().input.retry_due(epoch, Instant::now()) {
            debug!(epoch, "stale input retry ignored");
            return Effects::default();
        }

        // The controller may be half-started or wedged
        self.stop_input_controller().await;

        // Re-arm the start deadline now that the stop is done, unless an
        // explicit stop or a new route superseded this retry meanwhile
        let handle = {
            let mut st = self.state.lock();
            if !st.input.retry_due(epoch, Instant::now()) {
                debug!(epoch, "input retry superseded during stop");
                return Effects::default();
            }
            st.active_input.as_ref().and_then(|a| a.handle.clone())
        };
        self.start_input_controller(handle, epoch).await
    }

    /// Heartbeat from the capture controller
    pub fn record_heartbeat(&self, at: Instant) {
        let event = {
            let mut st = self.state.lock();
            if st.input.heartbeat(at) {
                let active = st.active_input.clone();
                Some(DiagnosticKind::InputActive {
                    signature: active.as_ref().map(|a| a.signature.clone()),
                    handle: active.and_then(|a| a.handle),
                })
            } else {
                None
            }
        };
        if let Some(kind) = event {
            info!("input active");
            self.emit(kind);
        }
    }

    /// Poll the controller heartbeat and enforce start/heartbeat timeouts
    pub fn watchdog(&self, now: Instant) -> Effects {
        if let Some(at) = self.providers.input.last_heartbeat() {
            self.record_heartbeat(at);
        }

        let expired = {
            let st = self.state.lock();
            st.input.check_timeouts(now).map(|error| (error, st.input.retry_epoch()))
        };
        match expired {
            Some((error, attempt)) => self.record_input_failure(error, attempt, now),
            None => Effects::default(),
        }
    }

    async fn apply_output(&self, inventory: &DeviceInventory) -> Effects {
        {
            let mut st = self.state.lock();
            if st.output.begin_recreate(Instant::now()).is_err() {
                debug!("output recreate already in progress");
                return Effects::default();
            }
        }
        self.recreate_output(inventory).await
    }

    async fn recreate_output(&self, inventory: &DeviceInventory) -> Effects {
        let recreate_timeout = self.state.lock().output.recreate_timeout();
        let result = match timeout(recreate_timeout, self.providers.output.recreate()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RouteError::Controller(format!("{:#}", e))),
            Err(_) => Err(RouteError::RecreateTimeout(recreate_timeout)),
        };

        let target = inventory.default_output_device().map(|d| ActiveOutput {
            signature: self.mapper.signature(d),
            id: d.id.clone(),
        });

        let mut effects = Effects::default();
        let event = {
            let mut st = self.state.lock();
            match result {
                Ok(()) => match st.output.recreate_succeeded() {
                    Ok(()) => {
                        st.active_output = target.clone();
                        Some(DiagnosticKind::OutputReady {
                            signature: target.map(|t| t.signature),
                        })
                    }
                    Err(invalid) => {
                        debug!("output recreate result ignored: {}", invalid);
                        None
                    }
                },
                Err(error) => match st.output.recreate_failed(&error) {
                    Ok(FailureOutcome::Retry { after, attempt }) => {
                        warn!(
                            kind = error.kind(),
                            attempt,
                            backoff_ms = after.as_millis() as u64,
                            "output recreate failed, retry scheduled"
                        );
                        effects.follow_ups.push(FollowUp::RetryOutput { after });
                        None
                    }
                    Ok(FailureOutcome::Exhausted) => {
                        st.active_output = None;
                        let kind = DiagnosticKind::OutputError {
                            signature: target.map(|t| t.signature),
                            error_kind: error.kind(),
                            reason: error.to_string(),
                        };
                        effects.error = Some(error);
                        Some(kind)
                    }
                    Err(invalid) => {
                        debug!("output failure ignored: {}", invalid);
                        None
                    }
                },
            }
        };

        if let Some(kind) = event {
            self.emit(kind);
        }
        if let Some(error) = &effects.error {
            warn!(kind = error.kind(), "{}", error);
        }
        effects
    }

    /// A scheduled output recreate is due
    pub async fn retry_output(&self) -> Effects {
        {
            let mut st = self.state.lock();
            if st.output.retry(Instant::now()).is_err() {
                debug!("stale output retry ignored");
                return Effects::default();
            }
        }

        let inventory = match self.providers.monitor.current_devices().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!("Device monitor failed during output retry: {:#}", e);
                DeviceInventory::default()
            }
        };
        self.recreate_output(&inventory).await
    }

    /// Pause or resume `queue` from how long playback has been recreating
    pub fn refresh_queue_pause(&self, queue: &mut OutputQueue) {
        let recreating_for = self.state.lock().output.recreating_for(Instant::now());
        queue.update_pause(recreating_for);
    }

    /// Hand queued units to the output controller while it is ready
    pub async fn feed_output(&self, queue: &mut OutputQueue) -> usize {
        self.refresh_queue_pause(queue);

        let mut fed = 0;
        loop {
            let ready = self.state.lock().output.phase() == OutputPhase::Ready;
            if !ready || !self.providers.output.is_ready() {
                break;
            }
            let Some(unit) = queue.pop() else {
                break;
            };
            if let Err(e) = self.providers.output.schedule_unit(unit.clone()).await {
                warn!("Failed to schedule output unit {}: {:#}", unit.id, e);
                queue.push_front(unit);
                break;
            }
            fed += 1;
        }
        fed
    }

    /// Explicit stop; cancels any pending restart
    pub async fn stop_input(&self) {
        let need_stop = {
            let mut st = self.state.lock();
            let failed = st.input.phase() == InputPhase::Failed;
            st.input.begin_stop() || failed
        };
        if need_stop {
            self.stop_input_controller().await;
        }
        let mut st = self.state.lock();
        st.input.stop_completed();
        st.active_input = None;
    }

    /// Stop capture and playback
    pub async fn shutdown(&self) {
        self.stop_input().await;
        if let Err(e) = self.providers.output.stop().await {
            warn!("Output controller stop failed: {:#}", e);
        }
    }

    /// Replace the user's input selection (`None` follows the system default)
    pub fn select_input(&self, selection: Option<InputPreference>) {
        let mut st = self.state.lock();
        st.selection = selection;
        st.fallback_to_default = false;
    }

    /// Leave system-default fallback so the next pass retries the selection
    pub fn clear_fallback(&self) {
        self.state.lock().fallback_to_default = false;
    }

    pub fn evict_device(&self, id: &DeviceId) {
        self.mapper.evict_device(id);
    }

    pub fn update_mapper(&self, config: &MapperConfig) {
        self.mapper.update_config(config);
    }

    pub fn status(&self, queue: QueueStats) -> RouteStatus {
        let now = Instant::now();
        let st = self.state.lock();
        RouteStatus {
            input: st.input.phase(),
            output: st.output.phase(),
            active_input: st.active_input.clone(),
            active_output: st.active_output.clone(),
            selection: st.selection.clone(),
            fallback_to_default: st.fallback_to_default,
            input_consecutive_retries: st.input.consecutive_retries(),
            input_restarts_in_window: st.input.restarts_in_window(now),
            output_retries_used: st.output.retries_used(),
            busy_retries: st.busy_retries,
            reconcile_in_flight: st.in_flight,
            reconcile_pending: st.pending.is_some(),
            total_runs: st.total_runs,
            mapper_cache_len: self.mapper.cache_len(),
            queue,
        }
    }

    fn emit(&self, kind: DiagnosticKind) {
        self.providers.sink.emit(DiagnosticEvent::now(kind));
    }
}

/// Whether capture bound for `active` already serves `target`
///
/// A system-default route (`handle: None`) follows the OS default, so it
/// only matches while the default still names the same device.
fn is_same_route(active: &ActiveInput, target: &ActiveInput) -> bool {
    match (&active.handle, &target.handle) {
        (Some(a), Some(b)) => a == b,
        (None, None) => active.signature == target.signature,
        _ => false,
    }
}

/// Forget active routes whose devices are gone
fn clear_stale_routes(st: &mut EngineState, inventory: &DeviceInventory) {
    let input_gone = st.active_input.as_ref().is_some_and(|active| match &active.handle {
        Some(id) => inventory.find_input(id).is_none(),
        None => inventory.default_input.is_none(),
    });
    if input_gone {
        if let Some(active) = st.active_input.take() {
            info!(device = %active.signature, "active input left the inventory");
        }
    }

    let output_moved = st
        .active_output
        .as_ref()
        .is_some_and(|active| inventory.default_output.as_ref() != Some(&active.id));
    if output_moved {
        if let Some(active) = st.active_output.take() {
            info!(device = %active.signature, "default output changed");
        }
    }
}
