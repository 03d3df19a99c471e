//! Standalone sentiment endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use locarank_core::TaskStatus;
use locarank_orchestration::TaskKind;
use locarank_sentiment::SentimentInput;

use crate::error::ApiResult;
use crate::schemas::{AsyncTaskResponse, SentimentBatchBody, SentimentBody, parse_product_type};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/analyze/async", post(analyze_async))
        .route("/batch", post(batch))
}

fn to_input(body: SentimentBody) -> ApiResult<SentimentInput> {
    let product_type = body.product_type.as_deref().map(parse_product_type).transpose()?;
    Ok(SentimentInput {
        product_id: body.product_id,
        client_id: body.client_id,
        comment: body.commentaire,
        product_type,
    })
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SentimentBody>,
) -> ApiResult<Response> {
    let input = to_input(body)?;
    let result = state.orchestrator.sentiment().analyze(input).await;
    Ok(Json(result).into_response())
}

async fn analyze_async(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SentimentBody>,
) -> ApiResult<Response> {
    let product_type = body.product_type.as_deref().map(parse_product_type).transpose()?;
    let task_id = state
        .orchestrator
        .submit(TaskKind::Sentiment {
            product_id: body.product_id,
            client_id: body.client_id,
            comment: body.commentaire,
            product_type,
        })
        .await;

    let response = AsyncTaskResponse {
        task_id,
        status: TaskStatus::Pending,
        message: "sentiment analysis submitted".to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

async fn batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SentimentBatchBody>,
) -> ApiResult<Response> {
    let inputs = body
        .comments
        .into_iter()
        .map(to_input)
        .collect::<ApiResult<Vec<_>>>()?;

    let results = state.orchestrator.sentiment().analyze_batch(inputs).await;
    Ok(Json(serde_json::json!({
        "total": results.len(),
        "results": results,
    }))
    .into_response())
}
