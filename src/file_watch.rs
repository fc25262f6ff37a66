//! Shared `notify` plumbing for the config and topology watchers
//!
//! Editors save in bursts (truncate, write, rename), each producing its own
//! event. Every event arms a settle timer tagged with a fresh epoch; only the
//! timer still holding the latest epoch when it fires runs the reload.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, trace};

/// Quiet period after the last event before the file is re-read
pub const SETTLE: Duration = Duration::from_millis(100);

/// Epoch gate collapsing an event burst into one reload
#[derive(Debug, Default)]
pub struct SettleGate {
    epoch: AtomicU64,
}

impl SettleGate {
    /// Record an event; returns the epoch its timer must still hold
    pub fn arm(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }
}

/// Watch `path` and run `reload` once each burst of changes settles
///
/// `what` names the file in logs. The returned watcher stops on drop.
pub fn watch_file<F, Fut>(path: &Path, what: &'static str, reload: F) -> Result<RecommendedWatcher>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // notify callbacks run on their own OS thread, not in Tokio context
    let runtime_handle = tokio::runtime::Handle::current();
    let gate = Arc::new(SettleGate::default());
    let reload = Arc::new(reload);

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
        Ok(event) if is_content_change(&event.kind) => {
            trace!(what, paths = ?event.paths, "watched file changed");
            let epoch = gate.arm();
            let gate = gate.clone();
            let reload = reload.clone();
            runtime_handle.spawn(async move {
                tokio::time::sleep(SETTLE).await;
                if gate.is_latest(epoch) {
                    reload().await;
                }
            });
        }
        Ok(_) => {}
        Err(e) => error!(what, "Watch error: {}", e),
    })?;

    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {} file: {}", what, path.display()))?;

    info!("{} file watcher started for: {}", what, path.display());
    Ok(watcher)
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}
