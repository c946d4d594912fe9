//! Local backup listing endpoint.

use super::error::ApiError;
use crate::executor::backup::list_member_snapshots;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct ListBackupsRequest {
    pub backup_base_dir: PathBuf,
    pub member_id: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListBackupsResponse {
    pub backups: Vec<String>,
}

/// GET /backup - Snapshots this member would upload, oldest first
pub async fn list_backups(
    payload: Result<Json<ListBackupsRequest>, JsonRejection>,
) -> Result<Json<ListBackupsResponse>, ApiError> {
    let Json(req) = payload?;

    let snapshots = tokio::task::spawn_blocking(move || {
        list_member_snapshots(&req.backup_base_dir, req.member_id)
    })
    .await
    .map_err(crate::AgentError::from)??;

    Ok(Json(ListBackupsResponse {
        backups: snapshots
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
    }))
}
