/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected"
/// }
/// ```
///
/// `database` is `"memory"` when the server runs without PostgreSQL; `pool`
/// is then omitted.

use axum::{extract::State, Json};
use memora_shared::db::pool::{self, PoolStats};
use serde::Serialize;

use crate::{app::AppState, error::ApiResult};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    pub version: String,

    /// `connected`, `disconnected` or `memory`
    pub database: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match &state.db {
        Some(db) => match pool::health_check(db).await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                "disconnected"
            }
        },
        None => "memory",
    };

    let status = if database == "disconnected" {
        "degraded"
    } else {
        "healthy"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        pool: state.db.as_ref().map(pool::get_pool_stats),
    }))
}
