//! Local account-abstraction development environment.

use std::sync::Arc;

use clap::Parser;
use devbox::{Orchestrator, cli::DevboxCli, containers::DockerEngine, wallet::HttpConnector};
use eyre::{Result, WrapErr};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DevboxCli::parse();
    cli.log_args().init_tracing()?;

    let engine = DockerEngine::connect().wrap_err("Failed to connect to the Docker daemon")?;
    let orchestrator = Orchestrator::new(cli.config(), Arc::new(engine), HttpConnector);

    println!("Starting devbox...");
    let report = orchestrator.run(shutdown_signal()).await.wrap_err("devbox session failed")?;

    info!(removed = report.containers_removed, "devbox stopped");
    if !report.teardown_failures.is_empty() {
        eyre::bail!("teardown incomplete: {}", report.teardown_failures.join("; "));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    println!("\nShutting down devbox...");
}
