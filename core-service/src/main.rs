//! Scamwatch - Command Line Entry Point
//!
//! `start` (default) runs the supervisor, which owns the analysis server and
//! the monitor loop. `monitor` is the loop itself, launched by the
//! supervisor as a unit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use scamwatch_core::constants;
use scamwatch_core::logic::alert::{AlertDispatcher, CommandNotifier, Notifier};
use scamwatch_core::logic::config::{AlertConfig, MonitorConfig, SupervisorConfig};
use scamwatch_core::logic::monitor::{sources_from_config, HttpAnalysisClient, MonitorLoop};
use scamwatch_core::logic::supervisor::{
    is_running, load_units, read_status, remove_status, send_terminate, standard_units,
    state_path, ProcessLauncher, Supervisor, SupervisorSettings,
};
use scamwatch_core::logic::telemetry;

#[derive(Parser)]
#[command(name = "scamwatch", version, about = "Real-time scam and deepfake early warning")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the supervisor with all units (default)
    Start,
    /// Show supervisor and unit status
    Status {
        /// Print the raw JSON snapshot
        #[arg(long)]
        json: bool,
    },
    /// Stop a running supervisor
    Stop,
    /// Run the monitor loop (normally launched by the supervisor)
    Monitor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Start) {
        Command::Start => run_supervisor().await,
        Command::Status { json } => show_status(json),
        Command::Stop => stop_supervisor().await,
        Command::Monitor => run_monitor().await,
    }
}

// ============================================================================
// SUPERVISOR
// ============================================================================

async fn run_supervisor() -> anyhow::Result<()> {
    let config = SupervisorConfig::from_env();
    let state_file = state_path(&config.state_dir);

    if let Ok(existing) = read_status(&state_file) {
        if existing.pid != std::process::id() && is_running(existing.pid) {
            bail!("supervisor already running (pid {})", existing.pid);
        }
    }

    let units = match &config.units_file {
        Some(path) => load_units(path)?,
        None => {
            let exe = std::env::current_exe().context("cannot locate own executable")?;
            standard_units(&exe, &config.server_url)
        }
    };

    log::info!(
        "{} v{} supervisor starting: {}",
        constants::APP_NAME,
        constants::APP_VERSION,
        units.iter().map(|u| u.name.as_str()).collect::<Vec<_>>().join(", ")
    );

    match telemetry::init(&config.state_dir, "supervisor") {
        Ok(()) => {
            if let Some(path) = telemetry::current_log_file() {
                log::info!("Audit log: {}", path.display());
            }
        }
        Err(e) => log::warn!("Audit log unavailable: {} - events will not be recorded", e),
    }

    let settings = SupervisorSettings {
        health_poll: config.health_poll,
        grace: config.grace,
        state_file: Some(state_file.clone()),
    };
    let mut supervisor = Supervisor::new(units, Arc::new(ProcessLauncher::new()), settings);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    if let Err(e) = supervisor.start_all().await {
        telemetry::shutdown();
        remove_status(&state_file);
        return Err(e.into());
    }
    log::info!("All units healthy, polling every {:?}", config.health_poll);

    supervisor.run(cancel).await;

    remove_status(&state_file);
    telemetry::shutdown();
    log::info!("Supervisor stopped");
    Ok(())
}

fn show_status(json: bool) -> anyhow::Result<()> {
    let path = state_path(&constants::get_state_dir());
    let status = match read_status(&path) {
        Ok(status) if is_running(status.pid) => status,
        _ => {
            println!("{} is not running", constants::APP_NAME);
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "{} supervisor pid {} (since {}, updated {})",
        constants::APP_NAME,
        status.pid,
        status.started_at.format("%Y-%m-%d %H:%M:%S"),
        status.updated_at.format("%H:%M:%S")
    );
    println!("{:<18} {:<10} {:>8} {:>9}  {}", "UNIT", "STATE", "PID", "RESTARTS", "LAST RESTART");
    for unit in &status.units {
        println!(
            "{:<18} {:<10} {:>8} {:>9}  {}",
            unit.name,
            unit.state.as_str(),
            unit.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            unit.restart_count,
            unit.last_restart
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}

async fn stop_supervisor() -> anyhow::Result<()> {
    let config = SupervisorConfig::from_env();
    let path = state_path(&config.state_dir);

    let status = match read_status(&path) {
        Ok(status) if is_running(status.pid) => status,
        _ => {
            println!("{} is not running", constants::APP_NAME);
            remove_status(&path);
            return Ok(());
        }
    };

    if !send_terminate(status.pid) {
        bail!("cannot signal supervisor (pid {})", status.pid);
    }
    println!("Stopping {} (pid {})...", constants::APP_NAME, status.pid);

    // Units get one grace period each, plus slack
    let units = status.units.len().max(1) as u32;
    let deadline = tokio::time::Instant::now() + config.grace * (units + 1);
    while is_running(status.pid) {
        if tokio::time::Instant::now() >= deadline {
            bail!("supervisor (pid {}) did not exit in time", status.pid);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    println!("Stopped");
    Ok(())
}

// ============================================================================
// MONITOR
// ============================================================================

async fn run_monitor() -> anyhow::Result<()> {
    let config = MonitorConfig::from_env()?;
    let alerts = AlertConfig::from_env()?;

    match telemetry::init(&constants::get_state_dir(), "monitor") {
        Ok(()) => {
            if let Some(path) = telemetry::current_log_file() {
                log::info!("Audit log: {}", path.display());
            }
        }
        Err(e) => log::warn!("Audit log unavailable: {} - events will not be recorded", e),
    }

    let sources = sources_from_config(&config.capture);
    if sources.is_empty() {
        log::warn!("No capture source configured; the monitor will idle");
    }

    let client = HttpAnalysisClient::new(&config.server_url, config.request_timeout)?;
    let notifier: Arc<dyn Notifier> = Arc::new(CommandNotifier::new(
        alerts.notify_command.clone(),
        alerts.confirm_command.clone(),
    ));
    log::info!(
        "Monitor: {} -> {}, cool-down {:?}",
        config.source_identifier,
        client.base_url(),
        alerts.cooldown
    );
    match client.health().await {
        Ok(health) if health.status == "ready" => log::info!("Analysis service ready"),
        Ok(health) if health.ready => log::warn!("Analysis service degraded; some detectors are off"),
        Ok(health) => log::warn!("Analysis service reports '{}'", health.status),
        Err(e) => log::warn!("Analysis service not reachable yet: {}", e),
    }
    let dispatcher = AlertDispatcher::new(alerts, notifier);

    let monitor = MonitorLoop::new(
        sources,
        Arc::new(client),
        dispatcher,
        &config.source_identifier,
        config.poll_interval,
        config.request_timeout,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));
    monitor.run(cancel).await;

    telemetry::shutdown();
    Ok(())
}

// ============================================================================
// SIGNALS
// ============================================================================

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown requested");
    cancel.cancel();
}

