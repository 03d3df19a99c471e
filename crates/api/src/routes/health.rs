//! Liveness, readiness, and the full service probe.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(full))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

/// Full probe of every service, model loads included.
async fn full(State(state): State<Arc<AppState>>) -> Response {
    let health = state.orchestrator.health_check().await;
    let snapshot = state.orchestrator.health_snapshot();

    let status = if health.healthy { "healthy" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "cache": health.cache,
            "embeddings": health.embeddings,
            "vectors": health.vectors,
            "repository": health.repository,
            "sentiment": health.sentiment,
        },
        "last_periodic_check": snapshot.checked_at,
    }))
    .into_response()
}

async fn live() -> Response {
    Json(serde_json::json!({ "status": "alive" })).into_response()
}

/// Storage backends only; never forces a model load.
async fn ready(State(state): State<Arc<AppState>>) -> Response {
    if state.orchestrator.backend_health().await {
        Json(serde_json::json!({ "status": "ready" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not ready" })),
        )
            .into_response()
    }
}
