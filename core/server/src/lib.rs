//! HTTP service for campusdrive.
//!
//! Every client signs in through `POST /auth/login`, which opens a session
//! with its own navigator and returns a session id. Later requests carry the
//! id in the `X-Session-Id` header. The drive client is shared by all
//! sessions; each navigator is locked for the duration of a request.

pub mod error;
pub mod models;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use campusdrive_common::Result;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, Session, SESSION_HEADER};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/auth/login", post(routes::login))
        .route("/auth/status", get(routes::auth_status))
        .route("/auth/logout", post(routes::logout))
        .route(
            "/folders",
            get(routes::list_folder).post(routes::create_folder),
        )
        .route("/navigate", get(routes::navigation))
        .route("/navigate/enter", post(routes::navigate_enter))
        .route("/navigate/back", post(routes::navigate_back))
        .route(
            "/items/{id}",
            get(routes::get_item).delete(routes::delete_item),
        )
        .route("/search/{name}", get(routes::search))
        .route("/files/excel", post(routes::create_excel))
        .route("/files/upload", post(routes::upload))
        .route(
            "/files/{id}/content",
            get(routes::file_content).put(routes::update_content),
        )
        .route("/files/{id}/download", get(routes::download))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `addr` until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{self, Body};
    use axum::http::{Request, StatusCode};
    use campusdrive_drive::{DriveClient, MemoryDrive, StaticTokenProvider};
    use campusdrive_tabular::{TabularCodec, Table, XlsxCodec};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn app() -> (Arc<MemoryDrive>, String, Router) {
        let drive = Arc::new(MemoryDrive::new());
        let root = drive.share_folder("datacampus");
        let client = Arc::new(DriveClient::new(
            MemoryDrive::BASE_URL,
            drive.clone(),
            Arc::new(StaticTokenProvider::new("tok")),
        ));
        (drive, root, router(AppState::new(client, "datacampus")))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn login(app: &Router) -> String {
        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        body["session_id"].as_str().unwrap().to_string()
    }

    fn get(uri: &str, session: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(SESSION_HEADER, session)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, session: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(SESSION_HEADER, session)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index_need_no_session() {
        let (_drive, _root, app) = app();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["authenticated"], false);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthorized() {
        let (_drive, _root, app) = app();
        let request = Request::builder().uri("/folders").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["detail"].as_str().unwrap().contains("/auth/login"));

        let (status, _) = send(&app, get("/folders", "not-a-uuid")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_idle_session_is_rejected_and_swept() {
        let drive = Arc::new(MemoryDrive::new());
        drive.share_folder("datacampus");
        let client = Arc::new(DriveClient::new(
            MemoryDrive::BASE_URL,
            drive,
            Arc::new(StaticTokenProvider::new("tok")),
        ));
        let state = AppState::new(client, "datacampus").with_idle_timeout(chrono::Duration::zero());
        let app = router(state.clone());

        let first = login(&app).await;
        login(&app).await;
        assert_eq!(state.session_count().await, 1);

        let second = login(&app).await;
        let (status, body) = send(&app, get("/auth/status", &second)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["detail"].as_str().unwrap().contains("expired"));
        assert_eq!(state.session_count().await, 0);

        let (status, _) = send(&app, get("/auth/status", &first)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_status_logout() {
        let (_drive, _root, app) = app();
        let session = login(&app).await;

        let (status, body) = send(&app, get("/auth/status", &session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "authenticated");

        let (status, _) = send(&app, post_json("/auth/logout", &session, json!({}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, get("/auth/status", &session)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_without_shared_folder_is_not_found() {
        let drive = Arc::new(MemoryDrive::new());
        let client = Arc::new(DriveClient::new(
            MemoryDrive::BASE_URL,
            drive,
            Arc::new(StaticTokenProvider::new("tok")),
        ));
        let app = router(AppState::new(client, "datacampus"));
        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .body(Body::empty())
            .unwrap();

        assert_eq!(send(&app, request).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_folder_listing_counts() {
        let (drive, root, app) = app();
        drive.add_folder(&root, "2024");
        drive.add_file(&root, "a.xlsx", XlsxCodec::new().encode(&Table::placeholder()).unwrap());
        let session = login(&app).await;

        let (status, body) = send(&app, get("/folders", &session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_folder_id"], root.as_str());
        assert_eq!(body["current_path"], json!(["datacampus"]));
        assert_eq!(body["total_items"], 2);
        assert_eq!(body["folders_count"], 1);
        assert_eq!(body["files_count"], 1);
        assert_eq!(body["items"][0]["type"], "folder");
    }

    #[tokio::test]
    async fn test_navigation_endpoints() {
        let (drive, root, app) = app();
        let year = drive.add_folder(&root, "2024");
        let session = login(&app).await;

        let (status, body) = send(
            &app,
            post_json("/navigate/enter", &session, json!({ "name": "2024" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_folder_id"], year.as_str());
        assert_eq!(body["current_path"], json!(["datacampus", "2024"]));
        assert_eq!(body["can_go_back"], true);

        let (_, body) = send(&app, post_json("/navigate/back", &session, json!({}))).await;
        assert_eq!(body["moved"], true);
        assert_eq!(body["current_folder_id"], root.as_str());

        let (_, body) = send(&app, post_json("/navigate/back", &session, json!({}))).await;
        assert_eq!(body["moved"], false);

        let (status, _) = send(&app, post_json("/navigate/enter", &session, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_entering_file_is_bad_request() {
        let (drive, root, app) = app();
        let file = drive.add_file(&root, "a.xlsx", b"x".to_vec());
        let session = login(&app).await;

        let (status, body) = send(
            &app,
            post_json("/navigate/enter", &session, json!({ "folder_id": file })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("not a folder"));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (drive, root, app) = app();
        drive.add_folder(&root, "2024");
        let first = login(&app).await;
        let second = login(&app).await;

        send(&app, post_json("/navigate/enter", &first, json!({ "name": "2024" }))).await;

        let (_, body) = send(&app, get("/navigate", &second)).await;
        assert_eq!(body["current_folder_id"], root.as_str());
        assert_eq!(body["depth"], 0);
    }

    #[tokio::test]
    async fn test_file_lifecycle() {
        let (_drive, _root, app) = app();
        let session = login(&app).await;

        let (status, body) = send(
            &app,
            post_json(
                "/files/excel",
                &session,
                json!({ "filename": "grades", "data": { "name": ["ana", "luis"], "score": [9, 7] } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "grades.xlsx");
        let id = body["file_id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, get(&format!("/files/{}/content", id), &session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["columns"], json!(["name", "score"]));
        assert_eq!(body["shape"], json!([2, 2]));
        assert_eq!(body["data"][1], json!(["luis", 7]));

        let request = Request::builder()
            .method("PUT")
            .uri(format!("/files/{}/content", id))
            .header(SESSION_HEADER, &session)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "data": { "name": ["eva"], "score": [10] } }).to_string(),
            ))
            .unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get(&format!("/files/{}/download", id), &session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
        assert!(disposition.contains("grades.csv"));
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "name,score\neva,10\n");

        let (status, body) = send(&app, get("/search/GRADES.xlsx", &session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/items/{}", id))
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);

        let (status, _) = send(&app, get(&format!("/items/{}", id), &session)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get("/search/grades.xlsx", &session)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_folder() {
        let (_drive, _root, app) = app();
        let session = login(&app).await;

        let (status, body) = send(
            &app,
            post_json("/folders", &session, json!({ "folder_name": "2025" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "2025");
        assert!(body["folder_id"].is_string());
    }

    fn multipart(session: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let boundary = "campusdrive-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/files/upload")
            .header(SESSION_HEADER, session)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_accepts_only_xlsx() {
        let (drive, _root, app) = app();
        let session = login(&app).await;
        let content = XlsxCodec::new().encode(&Table::placeholder()).unwrap();

        let (status, _) = send(&app, multipart(&session, "data.csv", b"a,b\n1,2\n")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, multipart(&session, "data.xlsx", &content)).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["file_id"].as_str().unwrap();
        assert!(drive.content(id).is_some());
    }
}
