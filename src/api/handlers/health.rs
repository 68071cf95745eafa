//! Health endpoints: liveness plus per-dependency probes.

use crate::AppState;
use crate::errors::Error;
use crate::llm::ProviderHealth;
use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct DbHealth {
    pub available: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn probe_db(state: &AppState) -> DbHealth {
    let started = Instant::now();
    let result: Result<i64, sqlx::Error> =
        sqlx::query_scalar("SELECT 1").fetch_one(&state.pool).await;
    DbHealth {
        available: result.is_ok(),
        latency_ms: started.elapsed().as_millis() as u64,
        error: result.err().map(|e| e.to_string()),
    }
}

#[utoipa::path(get, path = "/api/health", tag = "health",
    responses((status = 200, description = "Service is up")))]
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/api/health/full", tag = "health",
    responses((status = 200, description = "Aggregate health of db, llm, and search")))]
pub async fn health_full(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let db = probe_db(&state).await;
    let llm = state.provider.check_health().await;
    let search = state.indexer.get_stats().await.ok();

    let healthy = db.available;
    Ok(Json(json!({
        "status": if healthy { "ok" } else { "degraded" },
        "db": db,
        "llm": llm,
        "search": search,
    })))
}

#[utoipa::path(get, path = "/api/health/llm", tag = "health",
    responses((status = 200, description = "Model provider health", body = ProviderHealth)))]
pub async fn health_llm(State(state): State<AppState>) -> Json<ProviderHealth> {
    Json(state.provider.check_health().await)
}

#[utoipa::path(get, path = "/api/health/db", tag = "health",
    responses((status = 200, description = "Embedded store health", body = DbHealth)))]
pub async fn health_db(State(state): State<AppState>) -> Json<DbHealth> {
    Json(probe_db(&state).await)
}

#[utoipa::path(get, path = "/api/health/search", tag = "health",
    responses((status = 200, description = "Index stats and parity")))]
pub async fn health_search(State(state): State<AppState>) -> Result<Json<crate::indexer::IndexStats>, Error> {
    Ok(Json(state.indexer.get_stats().await?))
}
