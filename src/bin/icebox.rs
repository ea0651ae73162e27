//! icebox - Service container daemon
//!
//! Loads the services named by `IceBox.Service.*` properties, starts them,
//! and serves the administrative endpoint configured by
//! `IceBox.ServiceManager.Endpoints` until shutdown is requested, remotely
//! or by signal.
//!
//! Configuration comes from property files (`--Ice.Config=<file>`) and from
//! `--Prefix.key=value` options on the command line.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use icebox::communicator::Communicator;
use icebox::manager::ServiceManager;

#[derive(Parser)]
#[command(name = "icebox")]
#[command(about = "Service container: hosts dynamically loaded services")]
struct Args {
    /// Property options (--Ice.*, --IceBox.*, --<service>.*) and anything
    /// else to pass through to the services
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    options: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let program_name = std::env::args()
        .next()
        .unwrap_or_else(|| "icebox".to_string());

    let (communicator, residual) = match Communicator::init(&args.options) {
        Ok(initialized) => initialized,
        Err(e) => {
            log::error!("{}: {}", program_name, e);
            return ExitCode::FAILURE;
        }
    };

    // SIGTERM/SIGINT take the same orderly path as the remote shutdown.
    spawn_signal_handler(Arc::clone(&communicator));

    let mut manager = ServiceManager::new(communicator, program_name, residual);
    ExitCode::from(manager.run().await as u8)
}

fn spawn_signal_handler(communicator: Arc<Communicator>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        communicator.shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => log::info!("received SIGTERM, shutting down"),
                _ = tokio::signal::ctrl_c() => log::info!("received interrupt, shutting down"),
            }
        }
        Err(e) => {
            log::warn!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            log::info!("received interrupt, shutting down");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("received interrupt, shutting down");
}
