//! Dry-run controllers for the harness binary
//!
//! They log every call instead of touching audio hardware. The input side
//! emits heartbeats on a ticker while "capturing" so the watchdog sees a
//! healthy stream.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::devices::DeviceId;
use crate::output_queue::OutputUnit;
use crate::providers::{InputController, OutputController};

pub struct DryRunInput {
    heartbeat_every: Duration,
    last_heartbeat: Arc<Mutex<Option<Instant>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl DryRunInput {
    pub fn new(heartbeat_every: Duration) -> Self {
        Self {
            heartbeat_every,
            last_heartbeat: Arc::new(Mutex::new(None)),
            ticker: Mutex::new(None),
        }
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
    }
}

#[async_trait]
impl InputController for DryRunInput {
    async fn start(&self, device: Option<DeviceId>) -> Result<()> {
        match &device {
            Some(id) => info!("🎙️ [dry-run] capture started on {}", id),
            None => info!("🎙️ [dry-run] capture started on system default"),
        }

        self.stop_ticker();
        let last_heartbeat = self.last_heartbeat.clone();
        let every = self.heartbeat_every;
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                *last_heartbeat.lock() = Some(Instant::now());
            }
        });
        *self.ticker.lock() = Some(ticker);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_ticker();
        info!("[dry-run] capture stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.ticker.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    fn last_heartbeat(&self) -> Option<Instant> {
        *self.last_heartbeat.lock()
    }
}

impl Drop for DryRunInput {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[derive(Default)]
pub struct DryRunOutput {
    stopped: AtomicBool,
    recreates: AtomicU64,
    units: AtomicU64,
}

impl DryRunOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn units_played(&self) -> u64 {
        self.units.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutputController for DryRunOutput {
    fn is_ready(&self) -> bool {
        !self.stopped.load(Ordering::Relaxed)
    }

    async fn recreate(&self) -> Result<()> {
        let n = self.recreates.fetch_add(1, Ordering::Relaxed) + 1;
        self.stopped.store(false, Ordering::Relaxed);
        info!("🔊 [dry-run] playback recreated (#{})", n);
        Ok(())
    }

    async fn schedule_unit(&self, unit: OutputUnit) -> Result<()> {
        self.units.fetch_add(1, Ordering::Relaxed);
        debug!(
            id = %unit.id,
            bytes = unit.payload.len(),
            duration_ms = unit.duration.as_millis() as u64,
            "[dry-run] unit played"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::Relaxed);
        info!("[dry-run] playback stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test(start_paused = true)]
    async fn test_input_beats_while_running() {
        let input = DryRunInput::new(Duration::from_millis(500));
        assert!(input.last_heartbeat().is_none());

        input.start(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = input.last_heartbeat().unwrap();
        assert!(input.is_running());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(input.last_heartbeat().unwrap() > first);

        input.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopped_at = input.last_heartbeat().unwrap();
        assert!(!input.is_running());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(input.last_heartbeat(), Some(stopped_at));
    }

    #[tokio::test]
    async fn test_output_counts_units_and_stops() {
        let output = DryRunOutput::new();
        assert!(output.is_ready());
        output
            .schedule_unit(OutputUnit::new("u1", Duration::from_millis(20), Bytes::from_static(b"pcm")))
            .await
            .unwrap();
        assert_eq!(output.units_played(), 1);

        output.stop().await.unwrap();
        assert!(!output.is_ready());
        output.recreate().await.unwrap();
        assert!(output.is_ready());
    }
}
