use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tessera::api::ApiClient;
use tessera::config;
use tessera::events::SessionEvents;
use tessera::session::{SessionLifecycle, SessionStorage, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(_) => None,
    };

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level if RUST_LOG is not set
            if cfg!(debug_assertions) {
                // More verbose in debug mode
                "tessera=debug,warn".into()
            } else {
                // Less verbose in release mode
                "tessera=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!(version = tessera::VERSION, "Tessera session manager starting");

    // Log environment loading after logger is initialized
    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    // Load configuration
    let config = config::load_config().await?;

    // Wire the store, API client, and lifecycle onto one event channel
    let events = SessionEvents::default();
    let store = Arc::new(SessionStore::new(
        SessionStorage::new(&config.storage.data_dir),
        events.clone(),
    ));
    let api = Arc::new(ApiClient::from_config(&config.api, store.clone())?);
    let lifecycle = Arc::new(SessionLifecycle::new(
        store.clone(),
        api,
        &config.refresh,
        events,
    ));

    // Restore any persisted session before anything can query the store
    lifecycle.hydrate().await;

    // Non-interactive login driven by the environment, if configured
    if let (Ok(email), Ok(password)) = (
        std::env::var("TESSERA_EMAIL"),
        std::env::var("TESSERA_PASSWORD"),
    ) {
        match lifecycle
            .login(&email, &password, &CancellationToken::new())
            .await
        {
            Ok(()) => info!("Signed in with environment credentials"),
            Err(e) => error!(%e, "Environment login failed"),
        }
    }

    // Keep the token fresh until shutdown
    let shutdown = CancellationToken::new();
    let poller = {
        let lifecycle = lifecycle.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { lifecycle.run_refresh_poller(shutdown).await })
    };

    info!("Session manager running");
    info!("Press Ctrl+C to stop");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    shutdown.cancel();
    poller.await?;

    info!("Shutdown complete");
    Ok(())
}
