//! Hot-reload of the route configuration
//!
//! A reload is forwarded only when the parsed config differs from the last
//! one seen. Mapper, debounce, preferred input and timer settings apply
//! live; machine budgets and queue caps are fixed for the manager's
//! lifetime, so changes to them are logged and otherwise wait for a restart.

use anyhow::{Context, Result};
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::RouteConfig;
use crate::file_watch;

/// Sections the running manager cannot swap
const RESTART_ONLY: [&str; 3] = ["input", "output", "queue"];

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<RouteConfig>,
}

impl ConfigWatcher {
    /// Load `path` and start watching it
    pub async fn new(path: impl Into<PathBuf>) -> Result<(Self, Arc<RouteConfig>)> {
        let path = path.into();
        let initial = load(&path).await.context("Failed to load initial config")?;
        let last_seen = Arc::new(Mutex::new(initial.clone()));
        let (tx, rx) = mpsc::channel(4);

        let watched = path.clone();
        let watcher = file_watch::watch_file(&path, "config", move || {
            reload(watched.clone(), last_seen.clone(), tx.clone())
        })?;

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            Arc::new(initial),
        ))
    }

    /// Next changed config; `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<RouteConfig> {
        self.rx.recv().await
    }
}

async fn load(path: &Path) -> Result<RouteConfig> {
    RouteConfig::load(&path.to_string_lossy()).await
}

async fn reload(path: PathBuf, last_seen: Arc<Mutex<RouteConfig>>, tx: mpsc::Sender<RouteConfig>) {
    let next = match load(&path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to reload config (keeping old config): {:#}", e);
            return;
        }
    };

    let changed = {
        let mut last_seen = last_seen.lock();
        let changed = changed_sections(&last_seen, &next);
        *last_seen = next.clone();
        changed
    };
    if changed.is_empty() {
        debug!("Config file rewritten without changes");
        return;
    }

    let deferred: Vec<&str> = changed.iter().copied().filter(|s| RESTART_ONLY.contains(s)).collect();
    if !deferred.is_empty() {
        warn!(sections = ?deferred, "Config sections changed that apply only after a restart");
    }
    info!(sections = ?changed, "Configuration reloaded");

    if tx.send(next).await.is_err() {
        debug!("Config receiver dropped");
    }
}

/// Top-level sections that differ between `old` and `new`
pub fn changed_sections(old: &RouteConfig, new: &RouteConfig) -> Vec<&'static str> {
    let checks = [
        ("mapper", old.mapper != new.mapper),
        ("debounce", old.debounce != new.debounce),
        ("input", old.input != new.input),
        ("output", old.output != new.output),
        ("queue", old.queue != new.queue),
        ("monitor", old.monitor != new.monitor),
        ("watchdog", old.watchdog != new.watchdog),
        ("preferred_input", old.preferred_input != new.preferred_input),
    ];
    checks
        .into_iter()
        .filter_map(|(name, differs)| differs.then_some(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputPreference;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_changed_sections_names_each_difference() {
        let old = RouteConfig::default();
        assert!(changed_sections(&old, &old.clone()).is_empty());

        let mut new = old.clone();
        new.mapper.ambiguity_ratio = 0.75;
        new.queue.max_bytes = 1024;
        new.preferred_input = Some(InputPreference {
            name: "AirPods Pro".to_string(),
            channels: None,
        });
        assert_eq!(changed_sections(&old, &new), vec!["mapper", "queue", "preferred_input"]);
    }

    #[tokio::test]
    async fn test_unchanged_rewrite_is_not_forwarded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("route.yaml");

        let initial_config = r#"
preferred_input:
  name: "Blue Yeti"
"#;
        fs::write(&config_path, initial_config)?;

        let (mut watcher, config) = ConfigWatcher::new(&config_path).await?;
        assert_eq!(
            config.preferred_input.as_ref().map(|p| p.name.as_str()),
            Some("Blue Yeti")
        );

        // Same document saved again, then a real edit
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, initial_config)?;
        tokio::time::sleep(Duration::from_millis(400)).await;

        let modified_config = r#"
preferred_input:
  name: "AirPods Pro"
mapper:
  ambiguity_ratio: 0.75
"#;
        fs::write(&config_path, modified_config)?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config())
            .await?
            .expect("watcher alive");
        assert_eq!(
            new_config.preferred_input.map(|p| p.name),
            Some("AirPods Pro".to_string())
        );
        assert_eq!(new_config.mapper.ambiguity_ratio, 0.75);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_edit_keeps_old_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("route.yaml");
        fs::write(&config_path, "")?;

        let (mut watcher, _) = ConfigWatcher::new(&config_path).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "mapper: { low_threshold: 0 }")?;

        let forwarded = tokio::time::timeout(Duration::from_millis(600), watcher.next_config()).await;
        assert!(forwarded.is_err());
        Ok(())
    }
}
