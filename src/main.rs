//! sentinelmc/src/main.rs
//! CLI entry point: parse configuration, select a controller, install
//! signal handling, and run the dispatcher.

use clap::Parser;
use sentinelmc::config::Config;
use sentinelmc::logging;
use sentinelmc::server::{DummyServer, ProcessServer, Server};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();
    logging::init_logging(config.debug);

    let server: Arc<dyn Server> = if config.autostart_enabled() {
        Arc::new(ProcessServer::new(
            config.server_argv(),
            config.server_directory.clone(),
            config.done_markers(),
        ))
    } else {
        info!("no server-start command configured, using the dummy always-running controller");
        Arc::new(DummyServer::new())
    };

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("received shutdown signal, stopping server");
        if let Err(e) = shutdown_server.stop().await {
            info!("stop on shutdown rejected (server already stopped or stopping): {e}");
        }
        std::process::exit(0);
    });

    if let Err(e) = sentinelmc::proxy::run(config, server).await {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

/// Waits for either SIGINT or (on Unix) SIGTERM. Windows has no SIGTERM
/// equivalent reachable through `tokio::signal`, so `ctrl_c` alone
/// covers it there.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
