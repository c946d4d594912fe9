//! HTTP API module for the hot backup agent.

pub mod backup;
pub mod error;
pub mod health;
pub mod tasks;
pub mod upload;

use crate::storage::secrets::SecretProvider;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub tasks: tasks::TaskTracker,
}

/// Create shared application state
pub fn create_app_state(secrets: Arc<dyn SecretProvider>) -> AppState {
    AppState {
        tasks: tasks::TaskTracker::new(secrets),
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/backup", get(backup::list_backups))
        .route("/upload", post(upload::create_upload))
        .route(
            "/upload/{id}",
            get(upload::upload_status).delete(upload::delete_upload),
        )
        .route("/upload/{id}/cancel", post(upload::cancel_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::tasks::tests::{fixture, tracker, wait_terminal, MEMBER_1};
    use super::tasks::{TaskState, TaskStatus};
    use super::upload::CreateUploadResponse;
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde::de::DeserializeOwned;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> (Router, AppState) {
        let state = AppState {
            tasks: tracker(dir),
        };
        (create_router(state.clone()), state)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (router, _) = app(dir.path());

        let response = router.oneshot(empty_request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_tasks"], 0);
    }

    #[tokio::test]
    async fn test_upload_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (router, state) = app(dir.path());
        let request = fixture(dir.path());

        let response = router
            .clone()
            .oneshot(json_request("POST", "/upload", serde_json::to_value(&request).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created: CreateUploadResponse = read_json(response).await;

        wait_terminal(&state.tasks, created.id).await;
        let response = router
            .clone()
            .oneshot(empty_request("GET", &format!("/upload/{}", created.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: TaskStatus = read_json(response).await;
        assert_eq!(status.status, TaskState::Success);
        assert_eq!(
            status.backup_key,
            Some(format!("prefix/2022-07-28-19-00-55/{MEMBER_1}.tar.gz"))
        );

        let response = router
            .clone()
            .oneshot(empty_request("POST", &format!("/upload/{}/cancel", created.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(empty_request("DELETE", &format!("/upload/{}", created.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(empty_request("GET", &format!("/upload/{}", created.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_upload_body() {
        let dir = TempDir::new().unwrap();
        let (router, _) = app(dir.path());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(json_request("POST", "/upload", serde_json::json!({ "member_id": 0 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_task_ids() {
        let dir = TempDir::new().unwrap();
        let (router, _) = app(dir.path());
        let unknown = uuid::Uuid::new_v4();

        for (method, uri) in [
            ("GET", format!("/upload/{unknown}")),
            ("DELETE", format!("/upload/{unknown}")),
            ("POST", format!("/upload/{unknown}/cancel")),
            ("GET", "/upload/not-a-task".to_string()),
        ] {
            let response = router
                .clone()
                .oneshot(empty_request(method, &uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_list_backups() {
        let dir = TempDir::new().unwrap();
        let (router, _) = app(dir.path());
        let request = fixture(dir.path());

        let response = router
            .clone()
            .oneshot(json_request(
                "GET",
                "/backup",
                serde_json::json!({ "backup_base_dir": request.backup_base_dir, "member_id": 3 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: backup::ListBackupsResponse = read_json(response).await;
        assert_eq!(
            body.backups,
            vec![request
                .backup_base_dir
                .join("backup-1659034855438")
                .join(MEMBER_1)
                .to_string_lossy()
                .to_string()]
        );

        // nothing was uploaded or removed
        assert!(request.backup_base_dir.join("backup-1659034855438").join(MEMBER_1).is_dir());

        let response = router
            .oneshot(json_request(
                "GET",
                "/backup",
                serde_json::json!({ "backup_base_dir": dir.path().join("bucket"), "member_id": 0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
