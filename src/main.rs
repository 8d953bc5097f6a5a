//! Dino Duel Server - two-player endless runner matchmaking and relay
//!
//! Clients connect over plain TCP, claim a nickname, and queue for an
//! opponent. Matched pairs share one server-generated obstacle map and
//! mirror position/death events through their room until the match ends.

mod admin;
mod app;
mod config;
mod game;
mod matchmaking;
mod net;
mod store;
mod util;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Dino Duel Server");
    info!("Server address: {}", config.server_addr);

    // Create application state (loads the store snapshot if configured)
    let state = AppState::new(config)?;

    // Spawn the matching loop
    let matchmaking = state.matchmaking.clone();
    tokio::spawn(async move {
        matchmaking.run().await;
    });

    // Start listening before the console comes up
    let listener = TcpListener::bind(state.config.server_addr).await?;
    info!("Server listening on {}", listener.local_addr()?);

    // Admin console; `quit` shuts the server down
    let console = tokio::spawn(admin::run_console(state.clone()));

    tokio::select! {
        _ = net::server::run(listener, state) => {}
        _ = shutdown_signal() => {}
        result = console => {
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "Admin console failed");
            }
            info!("Console quit, shutting down");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
