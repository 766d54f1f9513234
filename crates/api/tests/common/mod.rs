#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use planforge_api::config::ServerConfig;
use planforge_api::router::build_app_router;
use planforge_api::state::AppState;
use planforge_builder::Builder;
use planforge_core::commands::CommandRegistry;
use planforge_model::{ArtifactStore, ModelAuthority, TemplateSpec};
use planforge_worker::{
    AuthorityLoop, AuthorityThread, JobEventBus, JobRegistry, Scheduler, SchedulerConfig,
    SchedulerHandle,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const BOUNDARY: &str = "planforge-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        api_key: None,
        bridge_port: None,
        max_upload_bytes: 1024 * 1024,
    }
}

/// A router wired to a real scheduler writing into a temporary directory.
pub struct TestApp {
    pub router: Router,
    pub scheduler: SchedulerHandle,
    pub dir: tempfile::TempDir,
    thread: Option<AuthorityThread>,
}

impl TestApp {
    /// Router, scheduler and a running authority thread.
    pub fn spawn() -> Self {
        Self::spawn_with(test_config())
    }

    pub fn spawn_with(config: ServerConfig) -> Self {
        let (mut app, authority) = Self::idle(config, 16);
        app.thread = Some(authority.spawn().unwrap());
        app
    }

    /// Router and scheduler whose authority loop has not been started, so
    /// submitted jobs stay queued.
    pub fn idle(config: ServerConfig, queue_capacity: usize) -> (Self, AuthorityLoop) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let builder = Builder::new(
            ModelAuthority::new(TemplateSpec::builtin()),
            CommandRegistry::default(),
            store.clone(),
        );
        let scheduler_config = SchedulerConfig {
            queue_capacity,
            ..SchedulerConfig::default()
        };
        let (scheduler, authority) = Scheduler::new(
            Arc::new(JobRegistry::new()),
            Arc::new(JobEventBus::default()),
            builder,
            &scheduler_config,
        );

        let state = AppState {
            scheduler: scheduler.clone(),
            store,
            config: Arc::new(config.clone()),
        };
        let router = build_app_router(state, &config);

        let app = Self {
            router,
            scheduler,
            dir,
            thread: None,
        };
        (app, authority)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// A `multipart/form-data` body. Each part is `(name, file_name, bytes)`.
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

// ---------------------------------------------------------------------------
// Recipes and polling
// ---------------------------------------------------------------------------

/// One level plus a 3D view: builds and renders.
pub fn level_recipe() -> Value {
    json!({
        "projectInfo": {"name": "Test house"},
        "steps": [
            {"commandType": "CreateLevel", "parameters": {"name": "Level 1", "elevation": 0}},
            {"commandType": "CreateWall", "parameters": {
                "curve": {"start": {"x": 0, "y": 0}, "end": {"x": 5000, "y": 0}},
                "wall_type": "Generic - 200mm", "level": "Level 1", "height": 3000
            }},
            {"commandType": "CreateView", "parameters": {"view_type": "3D", "name": "{3D}"}}
        ]
    })
}

/// Builds, but has no 3D view to render.
pub fn plan_only_recipe() -> Value {
    json!({
        "steps": [
            {"commandType": "CreateLevel", "parameters": {"name": "Level 1", "elevation": 0}}
        ]
    })
}

/// Poll `GET /api/v1/jobs/{id}` until the job is terminal; returns `data`.
pub async fn wait_terminal(app: &Router, job_id: &str) -> Value {
    let uri = format!("/api/v1/jobs/{job_id}");
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let response = get(app.clone(), &uri).await;
            assert_eq!(response.status(), StatusCode::OK);
            let data = body_json(response).await["data"].take();
            if data["status"] == "succeeded" || data["status"] == "failed" {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job should reach a terminal state")
}
