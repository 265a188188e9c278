//! # ImageHub API Server
//!
//! Multi-tenant image catalog backend: accounts and roles, a searchable
//! image catalog with per-user collections, and deployment lookups.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p imagehub-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use std::sync::Arc;

use anyhow::Context;
use imagehub_api::{
    app::{build_router, AppState},
    config::Config,
};
use imagehub_shared::cache::client::RedisClient;
use imagehub_shared::db::{migrations, pool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "imagehub_api=debug,imagehub_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    tracing::info!("ImageHub API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = migrations::ensure_database_exists(&config.database.url).await {
        tracing::warn!(error = %e, "Could not verify that the database exists");
    }

    let db = pool::create_pool(config.pool_config())
        .await
        .context("failed to connect to PostgreSQL")?;
    migrations::run_migrations(&db)
        .await
        .context("failed to run database migrations")?;

    let redis = RedisClient::new(config.redis_config())
        .await
        .context("failed to connect to Redis")?;
    tracing::info!(url = %redis.display_url(), "Connected to Redis");

    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("failed to create upload directory {}", config.uploads.dir))?;

    let bind_address = config.bind_address();
    let state = AppState::new(db.clone(), Arc::new(redis), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool::close_pool(db).await;
    tracing::info!("Server stopped");

    Ok(())
}
