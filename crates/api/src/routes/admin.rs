//! Administration endpoints: vectorization, cache invalidation, collection
//! introspection, and token issuance. Everything except `/token` sits
//! behind the bearer-token guard.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use locarank_core::TaskStatus;
use locarank_orchestration::TaskKind;

use crate::auth;
use crate::error::{ApiResult, ErrorBody};
use crate::schemas::{
    AsyncTaskResponse, InvalidateBody, TokenBody, TokenResponse, VectorizeBody, parse_product_id,
    parse_product_type,
};
use crate::state::AppState;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let guarded = Router::new()
        .route("/vectorize", post(vectorize))
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/collections/{product_type}", get(collection_info))
        .route_layer(axum::middleware::from_fn_with_state(state, auth::require_admin));

    guarded.route("/token", post(issue_token))
}

async fn vectorize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VectorizeBody>,
) -> ApiResult<Response> {
    let product_type = parse_product_type(&body.product_type)?;
    let task_id = state
        .orchestrator
        .submit(TaskKind::Vectorize {
            product_type,
            batch_size: body.batch_size,
            recreate: body.recreate,
        })
        .await;
    info!(%task_id, %product_type, "vectorization task submitted");

    let response = AsyncTaskResponse {
        task_id,
        status: TaskStatus::Pending,
        message: format!("vectorization started for {product_type}"),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InvalidateBody>,
) -> ApiResult<Response> {
    let product_id = parse_product_id(&body.product_id)?;
    let product_type = parse_product_type(&body.product_type)?;

    let count = state.orchestrator.invalidate(product_id, product_type).await;
    Ok(Json(serde_json::json!({
        "message": format!("invalidated {count} cache entries"),
        "product_id": product_id,
        "product_type": product_type,
    }))
    .into_response())
}

async fn collection_info(
    State(state): State<Arc<AppState>>,
    Path(product_type): Path<String>,
) -> ApiResult<Response> {
    let product_type = parse_product_type(&product_type)?;
    let stats = state.index.collection_stats(product_type).await?;
    Ok(Json(stats).into_response())
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenBody>,
) -> ApiResult<Response> {
    if body.secret != state.config.auth.secret_key {
        let status = StatusCode::UNAUTHORIZED;
        let body = ErrorBody {
            error: "invalid secret".to_string(),
            detail: None,
            status_code: status.as_u16(),
        };
        return Ok((status, Json(body)).into_response());
    }

    let expires_minutes = state.config.auth.token_expire_minutes;
    let token = auth::create_access_token(
        &body.client_id,
        &state.config.auth.secret_key,
        expires_minutes,
    )?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        expires_in: expires_minutes * 60,
    })
    .into_response())
}
