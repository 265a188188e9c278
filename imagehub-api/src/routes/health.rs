/// Health check endpoint
///
/// Verifies database and cache connectivity.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "cache": "connected",
///   "schema_version": 20250101000000,
///   "pool": { "active_connections": 1, "idle_connections": 4, "total_connections": 5 }
/// }
/// ```
///
/// `status` is `degraded` when either dependency is unreachable; the
/// endpoint still answers 200 so load balancers can read the body.

use axum::{extract::State, Json};
use imagehub_shared::cache::CacheStore;
use imagehub_shared::db::migrations::get_migration_status;
use imagehub_shared::db::pool::{get_pool_stats, health_check as database_health, PoolStats};
use serde::Serialize;

use crate::{app::AppState, error::ApiResult};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
    pub pool: PoolStats,
}

fn connectivity(ok: bool) -> &'static str {
    if ok {
        "connected"
    } else {
        "disconnected"
    }
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database_ok = database_health(&state.db).await.is_ok();
    let cache_ok = matches!(state.cache.ping().await, Ok(true));

    let schema_version = if database_ok {
        get_migration_status(&state.db)
            .await
            .ok()
            .and_then(|status| status.latest_version)
    } else {
        None
    };

    if !database_ok || !cache_ok {
        tracing::warn!(database_ok, cache_ok, "Health check degraded");
    }

    Ok(Json(HealthResponse {
        status: if database_ok && cache_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: connectivity(database_ok),
        cache: connectivity(cache_ok),
        schema_version,
        pool: get_pool_stats(&state.db),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_omits_unknown_schema_version() {
        let response = HealthResponse {
            status: "degraded",
            version: "0.1.0",
            database: connectivity(false),
            cache: connectivity(true),
            schema_version: None,
            pool: PoolStats {
                active_connections: 0,
                idle_connections: 0,
                total_connections: 0,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["database"], "disconnected");
        assert_eq!(json["cache"], "connected");
        assert!(json.get("schema_version").is_none());
        assert_eq!(json["pool"]["total_connections"], 0);
    }
}
