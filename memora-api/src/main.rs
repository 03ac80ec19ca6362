//! # Memora Hub API Server
//!
//! Serves the Memora Hub HTTP API: accounts, cookie sessions, two-factor
//! login, and group-scoped access to projects and tasks.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/memora \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p memora-api
//! ```
//!
//! See [`memora_api::config`] for every environment variable.

use std::time::Duration;

use memora_api::app::{build_router, AppState};
use memora_api::config::{Config, LogFormat};
use memora_shared::db::{migrations, pool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "memora_api=debug,memora_shared=info,tower_http=debug";

/// How often expired session rows are swept
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Memora Hub API v{} starting", env!("CARGO_PKG_VERSION"));

    let db = pool::create_pool(pool::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    migrations::run_migrations(&db).await?;

    let bind_address = config.bind_address();
    let state = AppState::with_database(db.clone(), config);

    let sessions = state.sessions.clone();
    let purge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                tracing::warn!(error = %e, "Session purge failed");
            }
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    pool::close_pool(db).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
