//! Recommendation endpoints: full workflow (sync or async), direct scoring,
//! and the vehicle query-string shortcut.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use locarank_core::{Error, TaskStatus};
use locarank_orchestration::TaskKind;
use locarank_recommend::RecommendationRequest;

use crate::error::ApiResult;
use crate::schemas::{
    AsyncTaskResponse, DirectRecommendationBody, RecommendationBody, VehicleQuery,
    parse_product_id, parse_product_type,
};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(full_workflow))
        .route("/direct", post(direct))
        .route("/vehicles", get(vehicles))
}

fn validate_top_k(top_k: usize) -> Result<(), Error> {
    if (1..=100).contains(&top_k) {
        Ok(())
    } else {
        Err(Error::validation(format!("top_k out of [1, 100]: {top_k}")))
    }
}

async fn full_workflow(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecommendationBody>,
) -> ApiResult<Response> {
    let product_id = parse_product_id(&body.product_id)?;
    let product_type = parse_product_type(&body.product_type)?;
    validate_top_k(body.top_k)?;

    if body.async_processing {
        let task_id = state
            .orchestrator
            .submit(TaskKind::FullWorkflow {
                product_id,
                client_id: body.client_id,
                comment: body.commentaire,
                product_type,
                top_k: body.top_k,
            })
            .await;
        info!(%task_id, "workflow dispatched to worker pool");
        let response = AsyncTaskResponse {
            task_id,
            status: TaskStatus::Pending,
            message: "task submitted for async processing".to_string(),
        };
        return Ok((StatusCode::ACCEPTED, Json(response)).into_response());
    }

    let outcome = state
        .orchestrator
        .process_workflow(product_id, &body.client_id, &body.commentaire, product_type, body.top_k)
        .await?;
    Ok(Json(outcome).into_response())
}

async fn direct(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DirectRecommendationBody>,
) -> ApiResult<Response> {
    let request = RecommendationRequest {
        client_id: body.client_id,
        product_id: parse_product_id(&body.product_id)?,
        sentiment_score: body.sentiment_score,
        product_type: parse_product_type(&body.product_type)?,
        top_k: body.top_k,
    };

    let result = state.orchestrator.process_direct(&request).await?;
    Ok(Json(result).into_response())
}

async fn vehicles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VehicleQuery>,
) -> ApiResult<Response> {
    let product_id = parse_product_id(&query.product_id)?;
    validate_top_k(query.top_k)?;

    let outcome = state
        .orchestrator
        .process_workflow(
            product_id,
            &query.client_id,
            &query.commentaire,
            locarank_core::ProductType::Vehicle,
            query.top_k,
        )
        .await?;
    Ok(Json(outcome).into_response())
}
