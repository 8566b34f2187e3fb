//! # Passkey Relying-Party Server
//!
//! Entry point: configuration, logging, the database, the expired-ceremony
//! sweeper and the HTTP server.

use passkey_rp_server::config::Config;
use passkey_rp_server::db::{ceremonies, now_millis};
use passkey_rp_server::state::AppState;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main application entry point
///
/// This function:
/// 1. Sets up logging for debugging and monitoring
/// 2. Loads configuration from environment variables
/// 3. Opens the database and validates the relying party settings
/// 4. Starts a background task to sweep expired ceremonies
/// 5. Starts the HTTP server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: info level for most crates, debug level for our app
    // Can be overridden with RUST_LOG environment variable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_rp_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!(
        rp_id = %app_state.rp.id,
        origin = %app_state.rp.origin,
        "Application state initialized"
    );

    // Challenges that were never answered stay in the table until swept;
    // expired ones are already ignored by verification.
    let cleanup_pool = app_state.db.clone();
    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            match ceremonies::cleanup_expired_ceremonies(&cleanup_pool, now_millis()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Swept expired ceremonies"),
                Err(e) => tracing::error!("Ceremony cleanup failed: {:?}", e),
            }
        }
    });

    let app = passkey_rp_server::router(app_state);

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
