//! Route manager - actor that owns the reconcile engine's triggers
//!
//! Device notifications, context changes, heartbeats and playback units all
//! arrive as [`RouteCommand`]s on one channel. The actor debounces device
//! changes, schedules the engine's follow-ups as timers, runs the heartbeat
//! watchdog and polls the monitor when it has no push notifications.
//!
//! Engine passes and retries can take seconds (controller timeouts), so they
//! run in spawned tasks and report back with an internal command. The actor
//! loop itself never waits on a controller except for explicit stops and
//! queue feeding.
//!
//! ```text
//! RouteHandle ──┐
//! monitor push ─┼─► command_rx ─► RouteManager ─► ReconcileEngine
//! timers ───────┘        ▲                │
//!                        └── spawned ◄────┘
//! ```

mod commands;
mod handle;


pub use commands::RouteCommand;
pub use handle::RouteHandle;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::RouteConfig;
use crate::debounce::DebounceManager;
use crate::devices::{diff_inventories, DeviceInventory, DeviceNotification, DeviceSignature, NotificationKind};
use crate::output_queue::OutputQueue;
use crate::providers::ContextProvider;
use crate::reconcile::{Effects, FollowUp, Providers, ReconcileEngine, ReconcileOutcome};

pub struct RouteManager {
    engine: Arc<ReconcileEngine>,
    providers: Providers,
    debounce: DebounceManager,
    queue: OutputQueue,
    context: Arc<dyn ContextProvider>,
    config: RouteConfig,

    command_rx: mpsc::UnboundedReceiver<RouteCommand>,
    /// Weak so the loop ends once every handle is dropped
    self_tx: mpsc::WeakUnboundedSender<RouteCommand>,

    last_inventory: Option<DeviceInventory>,
    /// Devices whose debounce counters reset after the next successful pass
    awaiting_reset: Vec<DeviceSignature>,
    poll_in_flight: bool,
}

impl RouteManager {
    /// Build the engine, spawn the actor and return a handle to it
    ///
    /// The actor subscribes to monitor push notifications and runs an
    /// initial reconcile as soon as it starts.
    pub fn spawn(
        config: RouteConfig,
        providers: Providers,
        context: Arc<dyn ContextProvider>,
    ) -> RouteHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let manager = RouteManager {
            engine: Arc::new(ReconcileEngine::new(&config, providers.clone())),
            providers,
            debounce: DebounceManager::new(config.debounce.clone()),
            queue: OutputQueue::new(config.queue.clone()),
            context,
            config,
            command_rx: cmd_rx,
            self_tx: cmd_tx.downgrade(),
            last_inventory: None,
            awaiting_reset: Vec::new(),
            poll_in_flight: false,
        };

        tokio::spawn(manager.run());
        info!("🎧 Route manager spawned");

        RouteHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        let mut push_open = match self.providers.monitor.subscribe(push_tx).await {
            Ok(subscribed) => subscribed,
            Err(e) => {
                warn!("Device monitor subscription failed, polling instead: {:#}", e);
                false
            }
        };
        info!(push = push_open, "device monitor attached");

        let mut watchdog = self.watchdog_interval();
        let mut poll = self.poll_interval(push_open);

        self.spawn_reconcile(None);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All route handles dropped");
                        break;
                    };
                    trace!(?cmd, "Processing route command");
                    match cmd {
                        RouteCommand::Shutdown(response) => {
                            self.shutdown().await;
                            let _ = response.send(());
                            return;
                        }
                        RouteCommand::UpdateConfig(config) => {
                            let timers_changed = config.monitor != self.config.monitor
                                || config.watchdog != self.config.watchdog;
                            self.apply_config(*config);
                            if timers_changed {
                                watchdog = self.watchdog_interval();
                                poll = self.poll_interval(push_open);
                            }
                        }
                        cmd => self.handle_command(cmd).await,
                    }
                }
                notification = push_rx.recv(), if push_open => {
                    match notification {
                        Some(notification) => self.on_device_changed(notification),
                        None => {
                            warn!("Device monitor push channel closed, polling instead");
                            push_open = false;
                            poll = self.poll_interval(push_open);
                        }
                    }
                }
                _ = watchdog.tick() => {
                    let effects = self.engine.watchdog(Instant::now());
                    self.schedule(effects);
                    self.pump().await;
                }
                _ = tick(&mut poll) => {
                    self.spawn_poll();
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, cmd: RouteCommand) {
        match cmd {
            RouteCommand::DeviceChanged(notification) => self.on_device_changed(notification),
            RouteCommand::ContextChanged | RouteCommand::Reconcile => self.spawn_reconcile(None),
            RouteCommand::SelectInput(selection) => {
                info!(selection = ?selection.as_ref().map(|s| s.name.as_str()), "input selection changed");
                self.engine.select_input(selection);
                self.spawn_reconcile(None);
            }
            RouteCommand::Heartbeat(at) => self.engine.record_heartbeat(at),
            RouteCommand::StopInput => self.engine.stop_input().await,
            RouteCommand::EnqueueOutput { unit, response } => {
                trace!(id = %unit.id, "enqueue output unit");
                self.engine.refresh_queue_pause(&mut self.queue);
                let result = self.queue.enqueue(unit);
                if let Ok(evicted) = &result {
                    if !evicted.is_empty() {
                        warn!(evicted = ?evicted, "output queue full, oldest units dropped");
                    }
                }
                let _ = response.send(result);
                self.pump().await;
            }
            RouteCommand::Status(response) => {
                let _ = response.send(self.engine.status(self.queue.stats()));
            }
            RouteCommand::DebounceFired { signature, epoch } => {
                if self.debounce.is_current(&signature, epoch) {
                    debug!(device = %signature, epoch, "debounce elapsed");
                    self.spawn_reconcile(Some(signature));
                } else {
                    trace!(device = %signature, epoch, "superseded debounce timer dropped");
                }
            }
            RouteCommand::FollowUpDue(follow_up) => self.run_follow_up(follow_up),
            RouteCommand::Polled(inventory) => self.on_polled(inventory),
            RouteCommand::ReconcileFinished { trigger, outcome } => {
                self.on_reconcile_finished(trigger, outcome);
                self.pump().await;
            }
            RouteCommand::RetryFinished(effects) => {
                self.schedule(effects);
                self.pump().await;
            }
            // Handled in the loop
            RouteCommand::Shutdown(_) | RouteCommand::UpdateConfig(_) => {}
        }
    }

    fn on_device_changed(&mut self, notification: DeviceNotification) {
        let device = &notification.device;
        let signature = self.engine.mapper().signature(device);

        match notification.kind {
            NotificationKind::Disconnected => self.engine.evict_device(&device.id),
            NotificationKind::Connected if device.is_input => self.engine.clear_fallback(),
            _ => {}
        }

        let (delay, epoch) = self.debounce.schedule(&signature);
        info!(
            kind = ?notification.kind,
            device = %signature,
            delay_ms = delay.as_millis() as u64,
            "🔌 device change, reconcile debounced"
        );

        self.send_after(delay, RouteCommand::DebounceFired { signature, epoch });
    }

    fn on_polled(&mut self, inventory: Option<DeviceInventory>) {
        self.poll_in_flight = false;
        // A failed poll keeps the previous baseline
        let Some(inventory) = inventory else {
            return;
        };
        let Some(previous) = self.last_inventory.replace(inventory.clone()) else {
            return;
        };
        for notification in diff_inventories(&previous, &inventory) {
            self.on_device_changed(notification);
        }
    }

    fn on_reconcile_finished(&mut self, trigger: Option<DeviceSignature>, outcome: ReconcileOutcome) {
        if let Some(signature) = trigger {
            self.awaiting_reset.push(signature);
        }

        let ReconcileOutcome::Completed { runs, report } = outcome else {
            return;
        };

        if report.effects.error.is_none() {
            for signature in self.awaiting_reset.drain(..) {
                self.debounce.reset(&signature);
            }
        } else {
            self.awaiting_reset.clear();
        }

        debug!(
            runs,
            decision = ?report.decision,
            follow_ups = report.effects.follow_ups.len(),
            "reconcile finished"
        );
        self.schedule(report.effects);
    }

    fn schedule(&self, effects: Effects) {
        for follow_up in effects.follow_ups {
            let after = match follow_up {
                FollowUp::RetryInput { after, .. }
                | FollowUp::RetryOutput { after }
                | FollowUp::Reconcile { after } => after,
            };
            self.send_after(after, RouteCommand::FollowUpDue(follow_up));
        }
    }

    fn run_follow_up(&self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Reconcile { .. } => self.spawn_reconcile(None),
            FollowUp::RetryInput { epoch, .. } => {
                let engine = self.engine.clone();
                self.spawn_reporting(async move { RouteCommand::RetryFinished(engine.retry_input(epoch).await) });
            }
            FollowUp::RetryOutput { .. } => {
                let engine = self.engine.clone();
                self.spawn_reporting(async move { RouteCommand::RetryFinished(engine.retry_output().await) });
            }
        }
    }

    /// Reconcile against the context as of now
    fn spawn_reconcile(&self, trigger: Option<DeviceSignature>) {
        let engine = self.engine.clone();
        let ctx = self.context.context();
        self.spawn_reporting(async move {
            let outcome = engine.reconcile(ctx).await;
            RouteCommand::ReconcileFinished { trigger, outcome }
        });
    }

    fn spawn_poll(&mut self) {
        if self.poll_in_flight {
            return;
        }
        self.poll_in_flight = true;
        let monitor = self.providers.monitor.clone();
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let inventory = match monitor.current_devices().await {
                Ok(inventory) => Some(inventory),
                Err(e) => {
                    warn!("Device poll failed: {:#}", e);
                    None
                }
            };
            let _ = tx.send(RouteCommand::Polled(inventory));
        });
    }

    fn spawn_reporting<F>(&self, task: F)
    where
        F: std::future::Future<Output = RouteCommand> + Send + 'static,
    {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let cmd = task.await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(cmd);
            }
        });
    }

    fn send_after(&self, delay: Duration, cmd: RouteCommand) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(cmd);
            }
        });
    }

    async fn pump(&mut self) {
        let fed = self.engine.feed_output(&mut self.queue).await;
        if fed > 0 {
            trace!(fed, remaining = self.queue.len(), "output units fed");
        }
    }

    fn apply_config(&mut self, config: RouteConfig) {
        info!("🔄 Applying route configuration");
        self.engine.update_mapper(&config.mapper);
        self.debounce.update_config(config.debounce.clone());

        if config.preferred_input != self.config.preferred_input {
            self.engine.select_input(config.preferred_input.clone());
            self.config = config;
            self.spawn_reconcile(None);
        } else {
            self.config = config;
        }
    }

    async fn shutdown(&mut self) {
        info!("Route manager shutting down");
        self.queue.clear();
        self.engine.shutdown().await;
    }

    fn watchdog_interval(&self) -> Interval {
        let period = Duration::from_millis(self.config.watchdog.tick_ms.max(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// `None` when push notifications cover topology changes or polling is off
    fn poll_interval(&self, push_open: bool) -> Option<Interval> {
        let ms = self.config.monitor.poll_interval_ms;
        if push_open || ms == 0 {
            return None;
        }
        let period = Duration::from_millis(ms);
        // First tick right away to record the baseline inventory
        let mut interval = interval_at(Instant::now(), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
