use anyhow::{Context, Result};
use clap::Parser;
use css_chat::{
    config::{Cli, ServerConfig},
    routes,
    state::ChatState,
    telemetry::{self, Telemetry},
};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    let telemetry = Telemetry::init(&config.telemetry)?;
    info!(
        listen_addr = %config.listen_addr,
        message_limit = config.chat.message_limit,
        stale_policy = ?config.chat.stale_policy,
        "starting css-chat server"
    );

    run(config, telemetry).await
}

async fn run(config: ServerConfig, telemetry: Telemetry) -> Result<()> {
    let (state, broadcaster) = ChatState::start(config.chat.clone());

    let metrics_server = match config.metrics_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .context("failed to bind metrics listener")?;
            info!("metrics listening on {}", addr);
            let app = telemetry::metrics_router(telemetry.metrics_handle());
            Some(tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app).await {
                    warn!(error = %err, "metrics listener stopped");
                }
            }))
        }
        None => None,
    };

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("css-chat listening on {}", config.listen_addr);

    let graceful = axum::serve(listener, routes::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal(state.clone()));
    let drain_deadline = async {
        state.shutdown_requested().await;
        tokio::time::sleep(config.shutdown_grace).await;
    };
    tokio::select! {
        served = async { graceful.await } => served.context("server shutdown with error")?,
        () = drain_deadline => warn!(
            grace_seconds = config.shutdown_grace.as_secs(),
            "connections still open after grace period"
        ),
    }

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; sleeping for graceful period"
    );
    if let Some(handle) = metrics_server {
        handle.abort();
    }
    broadcaster.abort();
    tokio::time::sleep(config.shutdown_grace).await;
    info!("graceful shutdown complete");

    Ok(())
}

async fn shutdown_signal(state: ChatState) {
    let _ = signal::ctrl_c().await;
    state.shutdown();
}
