mod cli;
mod config;
mod engine;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Command};
use config::EngineConfig;
use engine::Engine;
use tokio::signal::unix::SignalKind;
use tokio::time;

const CONFIG_ERROR: u8 = 1;
const RUNTIME_ERROR: u8 = 2;
const SHUTDOWN_TIMEOUT: u8 = 3;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let cli = Cli::parse();

    let config = match EngineConfig::load(&cli.config) {
        Ok(mut config) => {
            config.apply_env_overrides();
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return std::process::ExitCode::from(CONFIG_ERROR);
        }
    };

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.engine.data_dir.clone());

    let result = match cli.command {
        Command::Start => cmd_start(config, &data_dir).await,
        Command::Stop => cmd_stop(&data_dir),
        Command::Status => cmd_status(&data_dir),
        Command::ExportMemory { out } => cmd_export_memory(&data_dir, &out),
        Command::ImportMemory { from } => cmd_import_memory(&data_dir, &from),
    };

    match result {
        Ok(code) => std::process::ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            std::process::ExitCode::from(RUNTIME_ERROR)
        }
    }
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

fn pid_file(data_dir: &Path) -> PathBuf {
    data_dir.join("status").join("ict-engine.pid")
}

/// Run the engine loop until SIGINT/SIGTERM, mirroring `trading-agent`'s
/// select-on-interval-vs-shutdown-signal shape.
async fn cmd_start(config: EngineConfig, data_dir: &Path) -> anyhow::Result<u8> {
    let watchlist = config.engine.watchlist.clone();
    let account = ict_core::AccountSnapshot {
        balance: 10_000.0,
        equity: 10_000.0,
        margin: 0.0,
        profit: 0.0,
    };
    let broker: broker_trait::SharedBroker = Arc::new(broker_trait::mock::MockBroker::new(account));

    let shutdown_timeout_sec = config.engine.shutdown_timeout_sec;
    let interval_sec = config.baseline.monitoring_interval_sec.max(1);

    let engine = Arc::new(Engine::build(config, data_dir, broker)?);

    std::fs::create_dir_all(data_dir.join("status"))?;
    std::fs::write(pid_file(data_dir), std::process::id().to_string())?;

    tracing::info!(symbols = ?watchlist, "ict-engine started");

    let mut interval = time::interval(Duration::from_secs(interval_sec));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = engine.run_cycle().await {
                    tracing::warn!(error = %e, "cycle failed");
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    let _ = std::fs::remove_file(pid_file(data_dir));

    match time::timeout(Duration::from_secs(shutdown_timeout_sec), async { engine.shutdown() }).await {
        Ok(Ok(())) => {
            tracing::info!("shutdown complete");
            Ok(0)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "shutdown flush failed");
            Ok(RUNTIME_ERROR)
        }
        Err(_) => {
            tracing::error!("shutdown flush timed out");
            Ok(SHUTDOWN_TIMEOUT)
        }
    }
}

/// No signal-send mechanism is available in this crate's dependency stack
/// (no `nix`/`libc` precedent anywhere in the corpus): request a stop by
/// removing the PID file a running instance polls for would require a
/// poll loop that doesn't exist yet, so this instead reports whether a
/// live instance can be observed and leaves the actual signal to the
/// operator's process supervisor (`kill`, systemd, docker stop).
fn cmd_stop(data_dir: &Path) -> anyhow::Result<u8> {
    let path = pid_file(data_dir);
    match std::fs::read_to_string(&path) {
        Ok(pid) => {
            println!("ict-engine appears to be running (pid {}). Send it SIGTERM to stop it.", pid.trim());
            Ok(0)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("no pid file found at {}; ict-engine does not appear to be running", path.display());
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_status(data_dir: &Path) -> anyhow::Result<u8> {
    let running = pid_file(data_dir).exists();
    println!("running: {running}");

    let positions_path = data_dir.join("status").join("active_positions.json");
    match ict_core::snapshot::read_json::<Vec<ict_core::OpenPosition>>(&positions_path)? {
        Some(positions) => {
            println!("open positions: {}", positions.len());
            for p in &positions {
                println!("  {} {:?} {} @ {}", p.symbol, p.direction, p.volume, p.entry_price);
            }
        }
        None => println!("open positions: none recorded"),
    }

    let baseline_path = data_dir.join("metrics").join("baseline_metrics.json");
    match ict_core::snapshot::read_json::<std::collections::HashMap<String, serde_json::Value>>(&baseline_path)? {
        Some(baselines) => println!("tracked metrics: {}", baselines.len()),
        None => println!("tracked metrics: no baseline snapshot yet"),
    }

    Ok(0)
}

fn cmd_export_memory(data_dir: &Path, out: &Path) -> anyhow::Result<u8> {
    let source = data_dir.join("memory").join("historical_analysis_cache.json");
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&source, out)?;
    tracing::info!(from = %source.display(), to = %out.display(), "exported historical memory snapshot");
    Ok(0)
}

fn cmd_import_memory(data_dir: &Path, from: &Path) -> anyhow::Result<u8> {
    let raw = std::fs::read(from)?;
    serde_json::from_slice::<serde_json::Value>(&raw)?;

    let dest = data_dir.join("memory").join("historical_analysis_cache.json");
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, raw)?;
    tracing::info!(from = %from.display(), to = %dest.display(), "imported historical memory snapshot");
    Ok(0)
}
