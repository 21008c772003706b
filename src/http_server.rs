//! HTTP control API in front of the gateway supervisor and updater.
//!
//! `/api/health` is open; everything under `/api/picoclaw` requires the
//! configured bearer token. Result structs are returned verbatim as JSON.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::daemon::protocol::{ActionResult, HealthReport, Outcome};
use crate::daemon::{ProcessSupervisor, UpdateOrchestrator};

pub const SERVICE_NAME: &str = "picoclaw-manager";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<ProcessSupervisor>,
    pub updater: Arc<UpdateOrchestrator>,
    /// Expected bearer token; `None` disables authentication.
    pub token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        updater: Arc<UpdateOrchestrator>,
        token: Option<String>,
    ) -> Self {
        Self {
            supervisor,
            updater,
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Methods are checked inside the handlers so auth always runs first.
    let control = Router::new()
        .route("/status", any(status_handler))
        .route("/check-update", any(check_update_handler))
        .route("/start", any(start_handler))
        .route("/stop", any(stop_handler))
        .route("/restart", any(restart_handler))
        .route("/update", any(update_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/api/health", any(health_handler))
        .nest("/api/picoclaw", control)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(token) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let expected = format!("Bearer {}", token);
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(HeaderValue::as_bytes)
        .unwrap_or_default();

    if bool::from(presented.ct_eq(expected.as_bytes())) {
        return next.run(request).await;
    }

    warn!(
        target: "audit",
        event_type = "auth_failure",
        method = %request.method(),
        path = %request.uri().path(),
        header_present = !presented.is_empty(),
        "Rejected control request"
    );
    json_response(StatusCode::UNAUTHORIZED, &json!({ "error": "Unauthorized" }))
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        &HealthReport {
            status: "ok".to_string(),
            service: SERVICE_NAME.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        },
    )
}

async fn status_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, &state.supervisor.status().await)
}

async fn check_update_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, &state.updater.check_update().await)
}

async fn start_handler(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    let supervisor = Arc::clone(&state.supervisor);
    match detached(async move { supervisor.start().await }).await {
        Ok(result) => action_response(&result),
        Err(response) => response,
    }
}

async fn stop_handler(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    let supervisor = Arc::clone(&state.supervisor);
    match detached(async move { supervisor.stop().await }).await {
        Ok(result) => action_response(&result),
        Err(response) => response,
    }
}

async fn restart_handler(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    let supervisor = Arc::clone(&state.supervisor);
    match detached(async move { supervisor.restart().await }).await {
        Ok(result) => action_response(&result),
        Err(response) => response,
    }
}

async fn update_handler(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    let updater = Arc::clone(&state.updater);
    match detached(async move { updater.update().await }).await {
        Ok(result) => {
            let status = if result.success {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            json_response(status, &result)
        }
        Err(response) => response,
    }
}

/// Run an operation on its own task so a dropped connection cannot cancel it
/// halfway through.
async fn detached<T, F>(operation: F) -> Result<T, Response>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation).await.map_err(|e| {
        error!("Control operation aborted: {}", e);
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "error": "Internal server error" }),
        )
    })
}

fn action_status(result: &ActionResult) -> StatusCode {
    match result.outcome {
        Outcome::Done | Outcome::AlreadyRunning => StatusCode::OK,
        Outcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn action_response(result: &ActionResult) -> Response {
    json_response(action_status(result), result)
}

fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({ "error": "Method not allowed" }),
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
