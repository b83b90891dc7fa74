use anyhow::Context;
use clap::Parser;
use relay::{config::Config, AppState};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "relay=info,comms=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_tracing(config.json_logs);

    let state = AppState::new(config.settings());
    let server = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("could not bind to {}", config.bind_address()))?;

    tracing::info!(
        addr = %server.local_addr()?,
        version = env!("CARGO_PKG_VERSION"),
        "relay listening"
    );

    relay::serve(
        server,
        state.clone(),
        shutdown_signal(state),
        config.shutdown_timeout(),
    )
    .await?;

    tracing::info!("server shut down");

    Ok(())
}

fn init_tracing(json_logs: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal(state: AppState) {
    let (mut interrupt, mut terminate) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "could not listen for shutdown signals");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }

    tracing::info!(
        rooms = state.registry.room_count(),
        connections = state.registry.connection_count(),
        "server interrupted, gracefully shutting down"
    );
}
