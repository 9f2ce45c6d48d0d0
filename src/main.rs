use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vmswitch::config::{Cli, ResolvedConfig};
use vmswitch_core::{Runtime, RuntimeConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug || cli.debug_input || cli.debug_evdev { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let config = ResolvedConfig::resolve(cli).unwrap_or_else(|e| {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    });

    info!(version = env!("CARGO_PKG_VERSION"), qmp_dir = ?config.qmp_dir, "vmswitch starting");

    let adapters = vmswitch::build_adapters(config.console_backend, config.console_frontend, config.input_backend);
    let runtime_config = RuntimeConfig { qmp_dir: config.qmp_dir.clone(), response_timeout: config.response_timeout };

    let runtime = Runtime::start(runtime_config, adapters).await.unwrap_or_else(|e| {
        eprintln!("FATAL: failed to start: {e}");
        std::process::exit(1);
    });

    shutdown_signal().await;
    runtime.shutdown().await;
    info!("vmswitch shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger teardown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
