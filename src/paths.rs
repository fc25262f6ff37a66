//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): `route.yaml` in the current directory.
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   config, topology and logs in the executable's directory.
//! - **Installed mode** (default): everything lives under the platform data
//!   directory, in `Audio Route/`.

use anyhow::Context;
use std::path::PathBuf;
use tracing::{debug, info};

/// Directory name used in installed mode
const APP_NAME: &str = "Audio Route";

const CONFIG_FILE: &str = "route.yaml";
const TOPOLOGY_FILE: &str = "topology.yaml";

/// Resolved locations of the harness files
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    /// Simulated device topology watched by the file monitor
    pub topology: PathBuf,
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Runs before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE).exists() {
                eprintln!("[paths] Running in DEV mode ({} found in {})", CONFIG_FILE, cwd.display());
                return Self::rooted_at(cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::rooted_at(exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode (data dir: {})", app_data.display());

        Self::rooted_at(app_data, false)
    }

    /// All files under one base directory
    pub fn rooted_at(base: PathBuf, is_portable: bool) -> Self {
        Self {
            config: base.join(CONFIG_FILE),
            topology: base.join(TOPOLOGY_FILE),
            logs_dir: base.join("logs"),
            is_portable,
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Create the base and log directories, and an empty config and topology
    /// when missing so the watchers have files to watch
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir)?;
        }

        let base = self.base_dir();
        if !base.exists() {
            debug!("Creating data directory: {}", base.display());
            std::fs::create_dir_all(&base)?;
        }

        for (path, what) in [(&self.config, "config"), (&self.topology, "topology")] {
            if !path.exists() {
                info!("Creating empty {} file at {}", what, path.display());
                std::fs::write(path, "")
                    .with_context(|| format!("Failed to create {} file: {}", what, path.display()))?;
            }
        }

        Ok(())
    }
}
