//! Mock providers shared by engine and manager tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::RouteConfig;
use crate::devices::{DeviceId, DeviceInventory, DeviceNotification, NativeDevice};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::output_queue::OutputUnit;
use crate::providers::{DeviceMonitor, InputController, OutputController};
use crate::reconcile::{Providers, ReconcileEngine};

/// Inventory with the given inputs and a single "spk" output as default
pub fn inventory(inputs: Vec<NativeDevice>, default_input: Option<&str>) -> DeviceInventory {
    DeviceInventory {
        default_input: default_input.map(DeviceId::new),
        default_output: Some(DeviceId::new("spk")),
        inputs,
        outputs: vec![NativeDevice::output("spk", "Speakers", 2)],
    }
}

/// Built-in mic plus a USB Yeti, built-in as default
pub fn desk_inventory() -> DeviceInventory {
    inventory(
        vec![
            NativeDevice::input("builtin", "Built-in Microphone", 1),
            NativeDevice::input("yeti", "Blue Yeti USB", 2),
        ],
        Some("builtin"),
    )
}

#[derive(Default)]
pub struct MockMonitor {
    inventory: Mutex<DeviceInventory>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    push_capable: AtomicBool,
    push: Mutex<Option<mpsc::UnboundedSender<DeviceNotification>>>,
}

impl MockMonitor {
    pub fn new(inventory: DeviceInventory) -> Arc<Self> {
        Arc::new(Self {
            inventory: Mutex::new(inventory),
            push_capable: AtomicBool::new(true),
            ..Self::default()
        })
    }

    /// Monitor without push notifications
    pub fn polling(inventory: DeviceInventory) -> Arc<Self> {
        Arc::new(Self {
            inventory: Mutex::new(inventory),
            ..Self::default()
        })
    }

    pub fn set_inventory(&self, inventory: DeviceInventory) {
        *self.inventory.lock() = inventory;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every `current_devices` call sleep first
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Deliver a push notification to the subscriber, if any
    pub fn push(&self, notification: DeviceNotification) -> bool {
        match self.push.lock().as_ref() {
            Some(tx) => tx.send(notification).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DeviceMonitor for MockMonitor {
    async fn current_devices(&self) -> Result<DeviceInventory> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("device enumeration failed");
        }
        Ok(self.inventory.lock().clone())
    }

    async fn subscribe(&self, tx: mpsc::UnboundedSender<DeviceNotification>) -> Result<bool> {
        if !self.push_capable.load(Ordering::SeqCst) {
            return Ok(false);
        }
        *self.push.lock() = Some(tx);
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCall {
    Start(Option<DeviceId>),
    Stop,
}

pub struct MockInput {
    calls: Mutex<Vec<InputCall>>,
    fail_starts: AtomicU32,
    hang: AtomicBool,
    auto_heartbeat: AtomicBool,
    running: AtomicBool,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl MockInput {
    /// Controller that beats once as soon as it starts
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_starts: AtomicU32::new(0),
            hang: AtomicBool::new(false),
            auto_heartbeat: AtomicBool::new(true),
            running: AtomicBool::new(false),
            last_heartbeat: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<InputCall> {
        self.calls.lock().clone()
    }

    pub fn starts(&self) -> Vec<Option<DeviceId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                InputCall::Start(handle) => Some(handle.clone()),
                InputCall::Stop => None,
            })
            .collect()
    }

    /// Fail the next `n` start calls
    pub fn fail_next_starts(&self, n: u32) {
        self.fail_starts.store(n, Ordering::SeqCst);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_auto_heartbeat(&self, enabled: bool) {
        self.auto_heartbeat.store(enabled, Ordering::SeqCst);
    }

    pub fn beat(&self) {
        *self.last_heartbeat.lock() = Some(Instant::now());
    }
}

#[async_trait]
impl InputController for MockInput {
    async fn start(&self, device: Option<DeviceId>) -> Result<()> {
        self.calls.lock().push(InputCall::Start(device));
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let remaining = self.fail_starts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_starts.store(remaining - 1, Ordering::SeqCst);
            bail!("device busy");
        }
        self.running.store(true, Ordering::SeqCst);
        if self.auto_heartbeat.load(Ordering::SeqCst) {
            self.beat();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.calls.lock().push(InputCall::Stop);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn last_heartbeat(&self) -> Option<Instant> {
        *self.last_heartbeat.lock()
    }
}

pub struct MockOutput {
    recreates: AtomicUsize,
    fail_recreates: AtomicU32,
    hang: AtomicBool,
    ready: AtomicBool,
    stopped: AtomicBool,
    scheduled: Mutex<Vec<String>>,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            recreates: AtomicUsize::new(0),
            fail_recreates: AtomicU32::new(0),
            hang: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            scheduled: Mutex::new(Vec::new()),
        })
    }

    pub fn recreates(&self) -> usize {
        self.recreates.load(Ordering::SeqCst)
    }

    pub fn fail_next_recreates(&self, n: u32) {
        self.fail_recreates.store(n, Ordering::SeqCst);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn scheduled(&self) -> Vec<String> {
        self.scheduled.lock().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputController for MockOutput {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn recreate(&self) -> Result<()> {
        self.recreates.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let remaining = self.fail_recreates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_recreates.store(remaining - 1, Ordering::SeqCst);
            bail!("audio unit rebuild failed");
        }
        Ok(())
    }

    async fn schedule_unit(&self, unit: OutputUnit) -> Result<()> {
        self.scheduled.lock().push(unit.id);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind.name()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind.name() == kind)
            .count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, event: DiagnosticEvent) {
        self.events.lock().push(event);
    }
}

/// Engine wired to fresh mocks
pub struct Harness {
    pub engine: Arc<ReconcileEngine>,
    pub monitor: Arc<MockMonitor>,
    pub input: Arc<MockInput>,
    pub output: Arc<MockOutput>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(config: RouteConfig, inventory: DeviceInventory) -> Self {
        Self::with_monitor(config, MockMonitor::new(inventory))
    }

    pub fn with_monitor(config: RouteConfig, monitor: Arc<MockMonitor>) -> Self {
        let input = MockInput::new();
        let output = MockOutput::new();
        let sink = RecordingSink::new();
        let engine = Arc::new(ReconcileEngine::new(&config, Self::providers_for(&monitor, &input, &output, &sink)));
        Self {
            engine,
            monitor,
            input,
            output,
            sink,
        }
    }

    pub fn providers(&self) -> Providers {
        Self::providers_for(&self.monitor, &self.input, &self.output, &self.sink)
    }

    fn providers_for(
        monitor: &Arc<MockMonitor>,
        input: &Arc<MockInput>,
        output: &Arc<MockOutput>,
        sink: &Arc<RecordingSink>,
    ) -> Providers {
        Providers {
            monitor: monitor.clone(),
            input: input.clone(),
            output: output.clone(),
            sink: sink.clone(),
        }
    }
}
