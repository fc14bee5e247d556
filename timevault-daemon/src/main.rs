//! Timevault daemon - Main entry point
//!
//! Incremental, journaled backup daemon for external storage devices.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timevault_daemon::daemon::pidfile::PidFile;
use timevault_daemon::daemon::{resume, shutdown};
use timevault_daemon::ipc::control::ControlListener;
use timevault_daemon::ipc::sender::EventSender;
use timevault_daemon::utils::{logger, paths};
use timevault_daemon::{Config, Engine, Scheduler};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds to sleep between cycles (overrides the default 300)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single backup cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init(args.log_level.as_deref().unwrap_or("info"))?;

    let config_path = args.config.clone().unwrap_or_else(paths::default_config_path);
    let mut config = Config::from_file(&config_path)?;
    if let Some(secs) = args.interval {
        config.interval = Duration::from_secs(secs);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.device_path.display(),
        device_name = config.device_name.as_deref().unwrap_or("unknown"),
        folders = config.folders.len(),
        automatic = config.automatic,
        "starting timevault daemon"
    );

    let _pid_file = PidFile::create(paths::pid_file_path()).context("could not write pid file")?;

    let events = EventSender::new(paths::event_socket_path());
    let engine = Arc::new(Engine::new(config, events));

    // Reconcile whatever a previous crash or hard stop left behind before
    // planning any new work
    engine.replay_and_flush().await;

    let shutdown_token = CancellationToken::new();

    let control = ControlListener::new(
        paths::control_socket_path(),
        engine.cancel.clone(),
        shutdown_token.clone(),
    );
    let control_handle = tokio::spawn(control.run());

    let resume_handle = resume::spawn(Arc::clone(&engine), shutdown_token.clone());

    if args.once {
        let scheduler = Scheduler::new(Arc::clone(&engine), shutdown_token.clone());
        let report = scheduler.run_once().await;
        tracing::info!(
            copied = report.copied_files,
            linked = report.linked_files,
            failed = report.failed_files,
            "single cycle complete"
        );
    } else {
        let scheduler = Scheduler::new(Arc::clone(&engine), shutdown_token.clone());
        let scheduler_handle = tokio::spawn(scheduler.run());

        // Signals cancel the running cycle and stop the loop
        shutdown::wait_for_signal(&engine.cancel).await;
        shutdown_token.cancel();

        match tokio::time::timeout(Duration::from_secs(30), scheduler_handle).await {
            Ok(Ok(())) => tracing::info!("scheduler stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "scheduler task failed"),
            Err(_) => tracing::warn!("scheduler shutdown timed out, exiting anyway"),
        }
    }

    shutdown_token.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(3), control_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(3), resume_handle).await;

    tracing::info!("daemon stopped");
    Ok(())
}
