//! Binary entry point: parses CLI args, loads config, and runs the server.

mod cli;

use clap::Parser;
use mcp_guardian_rs::app;
use mcp_guardian_rs::core::config::Config;
use mcp_guardian_rs::core::error::GuardianResult;
use mcp_guardian_rs::core::logging::init_tracing;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> GuardianResult<()> {
    let cli = Cli::parse();

    let Commands::Serve {
        config,
        host,
        port,
        log_level,
    } = cli.command;

    init_tracing(&log_level);

    let config = Config::load(&config, host, port, log_level)?;
    tracing::info!(host = %config.host, port = config.port, "starting mcp-guardian");

    let (router, shutdown) = app::build(&config).await?;

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    result?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
