mod config;
mod routes;
mod scheduler;
mod service;
mod store;

use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rivalroll_core::ImageCatalog;

use crate::config::ServerConfig;
use crate::routes::{router, AppState};
use crate::service::SessionService;
use crate::store::KvStore;

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let store = KvStore::connect(&config.database_url).await?;
    let roster = config.load_roster()?;

    let catalog = ImageCatalog::new(&config.characters_dir);
    let startup_catalog = catalog.clone();
    match tokio::task::spawn_blocking(move || startup_catalog.sync()).await? {
        Ok(synced) => info!(
            characters = synced.characters.len(),
            default = ?synced.default_character,
            "character catalog synced"
        ),
        Err(err) => warn!(error = %err, "character catalog sync failed"),
    }

    let session = SessionService::start(store, roster, config.rng(), config.timing).await;

    let state = Arc::new(AppState {
        session,
        catalog,
        api_key: config.api_key.clone(),
    });

    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on {}", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
