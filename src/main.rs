#![forbid(unsafe_code)]

//! `devrun`: development-loop supervisor binary.
//!
//! Loads the session configuration, launches the application server,
//! watches class output for changes, and keeps the server running until the
//! session ends or a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use devrun::supervisor::{Collaborators, RestartServer};
use devrun::watch::{WatchAction, WatchScheduler};
use devrun::{run_session, AppError, ProcessSupervisor, Result, SessionConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "devrun", about = "Development-loop supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML session configuration.
    #[arg(long, default_value = "devrun.toml")]
    config: PathBuf,

    /// Stop the server as soon as it reports ready.
    #[arg(long)]
    stop_after_start: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = SessionConfig::load_from_path(&args.config)?;
    info!(project = %config.project_name, "configuration loaded");

    let scheduler = WatchScheduler::current()?;
    let supervisor = Arc::new(ProcessSupervisor::new(
        config,
        Collaborators::default(),
        scheduler,
    )?);

    let restart: Arc<dyn WatchAction> = Arc::new(RestartServer::new(supervisor.slot()));
    let watched = supervisor.watch_class_dirs(restart)?;
    info!(watched, "class directory watches installed");

    let result = tokio::select! {
        result = run_session(&supervisor, args.stop_after_start) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    supervisor.shutdown().await;
    if let Err(ref err) = result {
        error!(%err, "development session failed");
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
