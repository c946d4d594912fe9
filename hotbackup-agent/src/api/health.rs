//! Health check endpoint.

use super::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

static START_TIME: std::sync::OnceLock<u64> = std::sync::OnceLock::new();

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub fn init_start_time() {
    START_TIME.get_or_init(now_secs);
}

/// GET /health - Liveness probe
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = START_TIME
        .get()
        .map(|start| now_secs().saturating_sub(*start))
        .unwrap_or(0);

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
        "active_tasks": state.tasks.running_count().await,
    }))
}
