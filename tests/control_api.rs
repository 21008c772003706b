#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use picoclaw_manager::daemon::{
    CommandExecutor, ProcessSupervisor, SupervisorConfig, UpdateOrchestrator,
};
use picoclaw_manager::http_server::{build_router, AppState};
use serde_json::Value;
use serial_test::serial;
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "integration-token";

fn write_gateway(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("picoclaw");
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 'picoclaw v0.9.0'; exit 0; fi\n{}\n",
        body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct Harness {
    _dir: TempDir,
    supervisor: Arc<ProcessSupervisor>,
    router: Router,
}

impl Harness {
    fn new(gateway: &str, install: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let binary = write_gateway(dir.path(), gateway);
        let supervisor = Arc::new(
            ProcessSupervisor::new(SupervisorConfig {
                binary_path: binary,
                config_path: dir.path().join("config.json"),
                repository: "owner/repo".to_string(),
            })
            .with_stop_timeout(Duration::from_secs(2))
            .with_settle_delay(Duration::from_millis(50)),
        );
        let updater = UpdateOrchestrator::new(
            Arc::clone(&supervisor),
            "http://127.0.0.1:1",
            CommandExecutor::new(install),
        )
        .unwrap();
        let router = build_router(AppState::new(
            Arc::clone(&supervisor),
            Arc::new(updater),
            Some(TOKEN.to_string()),
        ));

        Self {
            _dir: dir,
            supervisor,
            router,
        }
    }

    async fn call(&self, method: Method, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

const SERVING_GATEWAY: &str = "echo \"gateway up: $1\"\ntrap 'exit 0' TERM\nwhile true; do sleep 1; done";

#[tokio::test]
#[serial]
async fn start_start_stop_status_round() {
    let harness = Harness::new(SERVING_GATEWAY, "true");

    let (status, first) = harness.call(Method::POST, "/api/picoclaw/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    let pid = first["pid"].as_u64().unwrap();

    let (status, second) = harness.call(Method::POST, "/api/picoclaw/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], false);
    assert_eq!(second["pid"].as_u64(), Some(pid));

    let (status, stopped) = harness.call(Method::POST, "/api/picoclaw/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["success"], true);
    assert_eq!(
        stopped["message"],
        format!("PicoClaw gateway stopped (PID: {})", pid)
    );

    let (status, snapshot) = harness.call(Method::GET, "/api/picoclaw/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["running"], false);
    assert_eq!(snapshot["pid"], Value::Null);
    assert_eq!(snapshot["started_at"], Value::Null);
    assert_eq!(snapshot["uptime_seconds"], Value::Null);
}

#[tokio::test]
#[serial]
async fn status_reports_running_gateway_and_output() {
    let harness = Harness::new(SERVING_GATEWAY, "true");
    harness.call(Method::POST, "/api/picoclaw/start").await;

    let mut snapshot = Value::Null;
    for _ in 0..100 {
        let (_, body) = harness.call(Method::GET, "/api/picoclaw/status").await;
        snapshot = body;
        if snapshot["recent_logs"]
            .as_array()
            .is_some_and(|lines| !lines.is_empty())
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(snapshot["running"], true);
    assert!(snapshot["started_at"].as_str().unwrap().ends_with('Z'));
    assert!(snapshot["uptime_seconds"].as_u64().is_some());
    assert_eq!(snapshot["recent_logs"][0], "gateway up: gateway");

    harness.supervisor.stop().await;
}

#[tokio::test]
#[serial]
async fn restart_replaces_running_process() {
    let harness = Harness::new(SERVING_GATEWAY, "true");
    let (_, first) = harness.call(Method::POST, "/api/picoclaw/start").await;

    let (status, restarted) = harness.call(Method::POST, "/api/picoclaw/restart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restarted["success"], true);
    assert_ne!(restarted["pid"], first["pid"]);

    harness.supervisor.stop().await;
}

#[tokio::test]
#[serial]
async fn failed_update_is_server_error_but_gateway_returns() {
    let harness = Harness::new(SERVING_GATEWAY, "echo 'download failed'; exit 1");
    harness.call(Method::POST, "/api/picoclaw/start").await;

    let (status, result) = harness.call(Method::POST, "/api/picoclaw/update").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(result["success"], false);
    assert_eq!(result["updated"], false);
    assert_eq!(result["was_running"], true);
    assert_eq!(result["restarted"], true);
    assert!(result["message"]
        .as_str()
        .unwrap()
        .contains("download failed"));

    assert!(harness.supervisor.is_running().await);
    harness.supervisor.stop().await;
}

#[tokio::test]
#[serial]
async fn update_requires_post() {
    let harness = Harness::new(SERVING_GATEWAY, "true");

    let (status, body) = harness.call(Method::GET, "/api/picoclaw/update").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "Method not allowed");
    assert!(!harness.supervisor.is_running().await);
}
