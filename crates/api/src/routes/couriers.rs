//! Courier ranking endpoints. The pipeline is pure, so the handler is a
//! thin translation layer.

use std::sync::Arc;

use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use locarank_courier::{RankingRequest, rank_couriers};

use crate::error::ApiResult;
use crate::schemas::CourierRankQuery;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rank", post(rank))
        .route("/health", get(health))
}

async fn rank(
    Query(query): Query<CourierRankQuery>,
    Json(request): Json<RankingRequest>,
) -> ApiResult<Response> {
    info!(
        announcement_id = %request.announcement.announcement_id,
        candidates = request.candidates.len(),
        "courier ranking request"
    );

    let response = rank_couriers(&request, query.include_details)?;
    Ok(Json(response).into_response())
}

async fn health() -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "courier_ranking",
        "components": {
            "spatial_filter": true,
            "ahp": true,
            "topsis": true,
        },
    }))
    .into_response()
}
