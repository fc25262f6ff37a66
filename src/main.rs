//! audio-route harness
//!
//! Runs the route manager against a YAML device topology file with dry-run
//! controllers. Edit the topology file to simulate hot-plug and default
//! device switches; edit the config file to hot-reload mapper, debounce and
//! preferred input settings.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_route::config::ConfigWatcher;
use audio_route::dry_run::{DryRunInput, DryRunOutput};
use audio_route::paths::AppPaths;
use audio_route::topology_file::FileDeviceMonitor;
use audio_route::{AppMode, Providers, RouteHandle, RouteManager, SharedContext, SystemContext, TracingSink};

/// Audio Route - reconcile microphone and speaker routing against a device topology
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the route configuration file
    #[arg(short, long, env = "AUDIO_ROUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the YAML device topology file
    #[arg(short, long, env = "AUDIO_ROUTE_TOPOLOGY")]
    topology: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Host application mode reported to the decision engine
    #[arg(long, value_enum, default_value_t = ModeArg::Listening)]
    mode: ModeArg,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Also write daily-rolled log files to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Dry-run capture heartbeat period in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,

    /// Log the route status every N seconds (0 disables)
    #[arg(long, default_value = "0")]
    status_secs: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl From<ModeArg> for AppMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Idle => AppMode::Idle,
            ModeArg::Listening => AppMode::Listening,
            ModeArg::Processing => AppMode::Processing,
            ModeArg::Speaking => AppMode::Speaking,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let paths = AppPaths::detect();
    if args.config.is_none() || args.topology.is_none() {
        paths.ensure_directories()?;
    }
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let topology_path = args.topology.clone().unwrap_or_else(|| paths.topology.clone());

    let _log_guard = init_logging(&args.log_level, args.json_logs, args.log_dir.as_deref())?;

    info!("Starting audio-route v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());
    info!("Topology file: {}", topology_path.display());

    let (config_watcher, initial_config) = ConfigWatcher::new(&config_path).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let providers = Providers {
        monitor: Arc::new(FileDeviceMonitor::new(topology_path)),
        input: Arc::new(DryRunInput::new(Duration::from_millis(args.heartbeat_ms.max(1)))),
        output: Arc::new(DryRunOutput::new()),
        sink: Arc::new(TracingSink),
    };
    let context = SharedContext::new(SystemContext {
        app_mode: args.mode.into(),
        ..SystemContext::default()
    });

    let handle = RouteManager::spawn((*initial_config).clone(), providers, Arc::new(context));

    run_app(&handle, config_watcher, args.status_secs, shutdown_signal()).await;

    handle.shutdown().await;
    info!("audio-route shutdown complete");
    Ok(())
}

async fn run_app(
    handle: &RouteHandle,
    mut config_watcher: ConfigWatcher,
    status_secs: u64,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut status_tick = tokio::time::interval(Duration::from_secs(status_secs.max(1)));

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("🔄 Configuration changed, applying to route manager");
                handle.update_config(new_config);
            }
            _ = status_tick.tick(), if status_secs > 0 => {
                match handle.status().await {
                    Some(status) => match serde_json::to_string(&status) {
                        Ok(json) => info!(target: "audio_route::status", "{}", json),
                        Err(e) => warn!("Failed to serialize route status: {}", e),
                    },
                    None => {
                        warn!("Route manager stopped unexpectedly");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down...");
                break;
            }
        }
    }
}

fn init_logging(level: &str, json: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console_text = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });
    let console_json = json.then(|| tracing_subscriber::fmt::layer().json());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "audio-route.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_text)
        .with(console_json)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to install Ctrl-C handler, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
