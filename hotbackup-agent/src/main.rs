//! Hot Backup Agent - Main entry point
//!
//! `serve` runs the upload API next to a cluster member; `restore` runs once
//! before the member starts and restores its hot-restart folder from a bucket.

use anyhow::Result;
use clap::{Parser, Subcommand};
use hotbackup_agent::{
    api,
    config::Config,
    daemon::shutdown::ShutdownCoordinator,
    executor::restore::{self, RestoreOutcome},
    storage::secrets::MountedSecrets,
    utils,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the backup upload API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Restore this member's hot-restart folder from a bucket
    Restore {
        #[arg(long)]
        bucket_url: Option<String>,

        #[arg(long)]
        secret_name: Option<String>,

        #[arg(long, value_name = "DIR")]
        dest_dir: Option<PathBuf>,

        #[arg(long)]
        restore_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level, config.log.ansi)?;

    match args.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.agent.port = port;
            }
            serve(config).await
        }
        Command::Restore {
            bucket_url,
            secret_name,
            dest_dir,
            restore_id,
        } => {
            if bucket_url.is_some() {
                config.restore.bucket_url = bucket_url;
            }
            if secret_name.is_some() {
                config.restore.secret_name = secret_name;
            }
            if let Some(dest_dir) = dest_dir {
                config.restore.dest_dir = dest_dir;
            }
            if restore_id.is_some() {
                config.restore.restore_id = restore_id;
            }
            run_restore(config).await
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    api::health::init_start_time();

    tracing::info!(
        "Starting hotbackup-agent v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.agent.hostname
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.agent.port));
    let secrets = Arc::new(MountedSecrets::new(config.secrets.dir.clone()));
    let app_state = api::create_app_state(secrets);
    let app = api::create_router(app_state.clone());

    let shutdown_coordinator = ShutdownCoordinator::new();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_coordinator.signalled());
    let server_handle = tokio::spawn(async move { server.await });

    shutdown_coordinator.wait_for_signal().await;

    let running = app_state.tasks.running_count().await;
    if running > 0 {
        tracing::info!("Cancelling {} running upload(s)", running);
    }
    app_state.tasks.cancel_all().await;

    match tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Server task panicked: {}", e),
        Err(_) => tracing::warn!("Server shutdown timeout, forcing exit"),
    }

    Ok(())
}

async fn run_restore(config: Config) -> Result<()> {
    let request = config.restore_request()?;
    let secrets = MountedSecrets::new(config.secrets.dir.clone());

    tracing::info!(
        "Restoring {} into {} (restore id {})",
        request.bucket_url,
        request.dest_dir.display(),
        request.restore_id
    );

    match restore::run(&request, &secrets).await? {
        RestoreOutcome::AlreadyRestored => tracing::info!("Nothing to do"),
        RestoreOutcome::Restored { key } => tracing::info!("Restore from {} complete", key),
    }

    Ok(())
}
