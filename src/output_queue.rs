//! Bounded output buffer with priority-aware eviction
//!
//! Units are opaque payloads (synthesized audio chunks, prompts) with a
//! playback duration. The queue keeps total duration and total size under
//! their caps by dropping the oldest non-priority unit first; priority units
//! go only once nothing else is left to drop.

use bytes::Bytes;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{RouteError, RouteResult};

/// One schedulable output unit
#[derive(Debug, Clone, PartialEq)]
pub struct OutputUnit {
    pub id: String,
    pub enqueued_at: Instant,
    pub priority: bool,
    pub duration: Duration,
    pub payload: Bytes,
}

impl OutputUnit {
    pub fn new(id: impl Into<String>, duration: Duration, payload: Bytes) -> Self {
        Self {
            id: id.into(),
            enqueued_at: Instant::now(),
            priority: false,
            duration,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }
}

/// Queue counters for status reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub priority_len: usize,
    pub total_duration_ms: u64,
    pub total_bytes: usize,
    pub evicted: u64,
    pub paused: bool,
}

pub struct OutputQueue {
    config: QueueConfig,
    units: VecDeque<OutputUnit>,
    total_duration: Duration,
    total_bytes: usize,
    evicted: u64,
    paused: bool,
}

impl OutputQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            units: VecDeque::new(),
            total_duration: Duration::ZERO,
            total_bytes: 0,
            evicted: 0,
            paused: false,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause feeding once the output has been recreating past the threshold
    ///
    /// Called on every watchdog tick with the machine's recreating time;
    /// `None` means the output is not recreating.
    pub fn update_pause(&mut self, recreating_for: Option<Duration>) {
        let threshold = Duration::from_millis(self.config.pause_after_recreating_ms);
        let paused = recreating_for.is_some_and(|elapsed| elapsed > threshold);
        if paused != self.paused {
            debug!(paused, "output queue feeding state changed");
        }
        self.paused = paused;
    }

    /// Append a unit and return the ids evicted to make room
    pub fn enqueue(&mut self, unit: OutputUnit) -> RouteResult<Vec<String>> {
        if self.paused {
            return Err(RouteError::QueuePaused);
        }

        self.total_duration += unit.duration;
        self.total_bytes += unit.payload.len();
        self.units.push_back(unit);

        let mut evicted = Vec::new();
        while self.over_cap() {
            match self.evict_one() {
                Some(unit) => evicted.push(unit.id),
                None => break,
            }
        }

        if !evicted.is_empty() {
            self.evicted += evicted.len() as u64;
            warn!(
                evicted = ?evicted,
                total_duration_ms = self.total_duration.as_millis() as u64,
                total_bytes = self.total_bytes,
                "output queue overflow"
            );
        }

        Ok(evicted)
    }

    /// Take the next unit for playback, unless feeding is paused
    pub fn pop(&mut self) -> Option<OutputUnit> {
        if self.paused {
            return None;
        }
        let unit = self.units.pop_front()?;
        self.total_duration = self.total_duration.saturating_sub(unit.duration);
        self.total_bytes = self.total_bytes.saturating_sub(unit.payload.len());
        Some(unit)
    }

    /// Put a unit back at the head after a failed hand-off
    pub fn push_front(&mut self, unit: OutputUnit) {
        self.total_duration += unit.duration;
        self.total_bytes += unit.payload.len();
        self.units.push_front(unit);
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.total_duration = Duration::ZERO;
        self.total_bytes = 0;
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.units.len(),
            priority_len: self.units.iter().filter(|u| u.priority).count(),
            total_duration_ms: self.total_duration.as_millis() as u64,
            total_bytes: self.total_bytes,
            evicted: self.evicted,
            paused: self.paused,
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.id.as_str()).collect()
    }

    fn over_cap(&self) -> bool {
        self.total_duration > Duration::from_millis(self.config.max_duration_ms)
            || self.total_bytes > self.config.max_bytes
    }

    fn evict_one(&mut self) -> Option<OutputUnit> {
        // Never evict the last remaining unit; an oversized unit still plays
        if self.units.len() <= 1 {
            return None;
        }
        let index = self
            .units
            .iter()
            .position(|u| !u.priority)
            .unwrap_or(0);
        let unit = self.units.remove(index)?;
        self.total_duration = self.total_duration.saturating_sub(unit.duration);
        self.total_bytes = self.total_bytes.saturating_sub(unit.payload.len());
        Some(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit(id: &str, ms: u64, priority: bool) -> OutputUnit {
        OutputUnit::new(id, Duration::from_millis(ms), Bytes::from(vec![0u8; 16])).with_priority(priority)
    }

    #[test]
    fn test_drop_oldest_non_priority_first() {
        let mut queue = OutputQueue::new(QueueConfig::default());
        queue.enqueue(unit("p1", 2000, true)).unwrap();
        queue.enqueue(unit("a", 2000, false)).unwrap();
        queue.enqueue(unit("b", 1000, false)).unwrap();

        let evicted = queue.enqueue(unit("c", 1000, false)).unwrap();
        assert_eq!(evicted, vec!["a".to_string()]);
        assert_eq!(queue.ids(), vec!["p1", "b", "c"]);
        assert_eq!(queue.stats().total_duration_ms, 4000);
    }

    #[test]
    fn test_priority_evicted_only_when_alone() {
        let mut queue = OutputQueue::new(QueueConfig::default());
        queue.enqueue(unit("p1", 3000, true)).unwrap();
        let evicted = queue.enqueue(unit("p2", 3000, true)).unwrap();
        assert_eq!(evicted, vec!["p1".to_string()]);
        assert_eq!(queue.ids(), vec!["p2"]);
    }

    #[test]
    fn test_byte_cap() {
        let config = QueueConfig {
            max_bytes: 32,
            ..QueueConfig::default()
        };
        let mut queue = OutputQueue::new(config);
        queue.enqueue(unit("a", 10, false)).unwrap();
        queue.enqueue(unit("b", 10, false)).unwrap();
        let evicted = queue.enqueue(unit("c", 10, false)).unwrap();
        assert_eq!(evicted, vec!["a".to_string()]);
        assert_eq!(queue.stats().total_bytes, 32);
    }

    #[test]
    fn test_pause_after_recreating_threshold() {
        let mut queue = OutputQueue::new(QueueConfig::default());
        queue.enqueue(unit("a", 100, false)).unwrap();

        queue.update_pause(Some(Duration::from_millis(2000)));
        assert!(!queue.is_paused());
        queue.update_pause(Some(Duration::from_millis(2001)));
        assert!(queue.is_paused());
        assert!(queue.pop().is_none());
        assert!(matches!(queue.enqueue(unit("b", 100, false)), Err(RouteError::QueuePaused)));

        queue.update_pause(None);
        assert_eq!(queue.pop().map(|u| u.id), Some("a".to_string()));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_front_restores_order_and_totals() {
        let mut queue = OutputQueue::new(QueueConfig::default());
        queue.enqueue(unit("a", 100, false)).unwrap();
        queue.enqueue(unit("b", 100, false)).unwrap();
        let head = queue.pop().unwrap();
        queue.push_front(head);
        assert_eq!(queue.ids(), vec!["a", "b"]);
        assert_eq!(queue.stats().total_duration_ms, 200);
    }

    proptest! {
        #[test]
        fn prop_priority_never_evicted_while_non_priority_remains(
            units in prop::collection::vec((1u64..3000, any::<bool>()), 1..30),
        ) {
            let mut queue = OutputQueue::new(QueueConfig::default());
            for (i, (ms, priority)) in units.iter().enumerate() {
                let before: Vec<(String, bool)> = queue
                    .units
                    .iter()
                    .map(|u| (u.id.clone(), u.priority))
                    .collect();
                let evicted = queue.enqueue(unit(&format!("u{}", i), *ms, *priority)).unwrap();

                for id in &evicted {
                    let was_priority = before.iter().any(|(b, p)| b == id && *p);
                    if was_priority {
                        // No non-priority unit may survive a priority eviction
                        prop_assert!(queue.units.iter().all(|u| u.priority));
                    }
                }
                prop_assert!(queue.len() == 1 || queue.stats().total_duration_ms <= 5000);
            }
        }

        #[test]
        fn prop_evicts_oldest_non_priority(
            durations in prop::collection::vec(500u64..2500, 2..20),
        ) {
            let mut queue = OutputQueue::new(QueueConfig::default());
            let mut expected_next = 0usize;
            for (i, ms) in durations.iter().enumerate() {
                let evicted = queue.enqueue(unit(&format!("u{}", i), *ms, false)).unwrap();
                for id in evicted {
                    prop_assert_eq!(id, format!("u{}", expected_next));
                    expected_next += 1;
                }
            }
        }
    }
}
