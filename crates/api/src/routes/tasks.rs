//! Async task management: status, revocation, and result retrieval.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use locarank_core::{Error, TaskStatus};
use locarank_orchestration::RevokeOutcome;

use crate::error::ApiResult;
use crate::schemas::TaskStatusResponse;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{id}", get(status).delete(revoke))
        .route("/{id}/result", get(result))
}

fn parse_task_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::validation(format!("invalid task id: {raw}")))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let task_id = parse_task_id(&id)?;
    let view = state
        .orchestrator
        .task_status(task_id)
        .await
        .ok_or_else(|| Error::not_found(format!("task {task_id}")))?;

    Ok(Json(TaskStatusResponse {
        task_id,
        status: view.status,
        ready: view.ready,
        result: view.result,
        error: view.error,
    })
    .into_response())
}

async fn revoke(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let task_id = parse_task_id(&id)?;
    let (revoked, message) = match state.orchestrator.cancel(task_id).await {
        RevokeOutcome::Revoked => (true, "task revoke signal sent"),
        RevokeOutcome::AlreadyFinished => (false, "task already completed"),
        RevokeOutcome::NotFound => return Err(Error::not_found(format!("task {task_id}")).into()),
    };

    Ok(Json(serde_json::json!({
        "task_id": task_id,
        "revoked": revoked,
        "message": message,
    }))
    .into_response())
}

async fn result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let task_id = parse_task_id(&id)?;
    let view = state
        .orchestrator
        .task_status(task_id)
        .await
        .ok_or_else(|| Error::not_found(format!("task {task_id}")))?;

    if !view.ready {
        return Err(Error::not_found("task not yet completed").into());
    }
    if view.status == TaskStatus::Failure {
        return Err(Error::internal(format!(
            "task failed: {}",
            view.error.unwrap_or_else(|| "unknown error".to_string())
        ))
        .into());
    }

    Ok(Json(serde_json::json!({
        "task_id": task_id,
        "status": view.status,
        "result": view.result,
    }))
    .into_response())
}
