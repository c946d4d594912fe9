//! Upload task endpoints.

use super::error::ApiError;
use super::tasks::{TaskStatus, UploadRequest};
use super::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUploadResponse {
    pub id: Uuid,
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Upload task {} not found", raw)))
}

/// POST /upload - Start uploading the latest local snapshot
pub async fn create_upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<CreateUploadResponse>, ApiError> {
    let Json(request) = payload?;
    let id = state.tasks.create(request).await;
    Ok(Json(CreateUploadResponse { id }))
}

/// GET /upload/{id} - Report task status
pub async fn upload_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatus>, ApiError> {
    let id = parse_task_id(&id)?;
    Ok(Json(state.tasks.status(id).await?))
}

/// POST /upload/{id}/cancel - Ask a running task to stop
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_task_id(&id)?;
    state.tasks.cancel(id).await?;
    Ok(StatusCode::OK)
}

/// DELETE /upload/{id} - Cancel and forget a task
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_task_id(&id)?;
    state.tasks.delete(id).await?;
    Ok(StatusCode::OK)
}
