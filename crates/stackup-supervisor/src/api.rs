//! HTTP control API using axum.
//!
//! | Method | Path                                  | Answer                  |
//! |--------|---------------------------------------|-------------------------|
//! | GET    | `/api/v1/processes`                   | status of every process |
//! | GET    | `/api/v1/processes/:name`             | status of one process   |
//! | GET    | `/api/v1/processes/:name/logs?lines=` | captured output tail    |
//! | POST   | `/api/v1/processes/:name/:command`    | status after `command`  |
//! | GET    | `/api/v1/health`                      | `OK`                    |

use crate::control::{ControlCommand, ControlInterface};
use crate::supervisor::ProcessStatus;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stackup_common::ProcessError;
use stackup_log_collection::LogEntry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_LOG_LINES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

pub fn create_router(control: ControlInterface) -> Router {
    Router::new()
        .route("/api/v1/processes", get(list_handler))
        .route("/api/v1/processes/:name", get(status_handler))
        .route("/api/v1/processes/:name/logs", get(logs_handler))
        .route("/api/v1/processes/:name/:command", post(command_handler))
        .route("/api/v1/health", get(health_handler))
        .with_state(control)
}

/// Serve the control API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    control: ControlInterface,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Control API listening on http://{}", addr);
    }

    axum::serve(listener, create_router(control))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn list_handler(State(control): State<ControlInterface>) -> Json<Vec<ProcessStatus>> {
    Json(control.status_all())
}

async fn status_handler(
    State(control): State<ControlInterface>,
    Path(name): Path<String>,
) -> Result<Json<ProcessStatus>, ApiError> {
    Ok(Json(control.execute(ControlCommand::Status, &name).await?))
}

async fn logs_handler(
    State(control): State<ControlInterface>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    Ok(Json(control.supervisor().tail_logs(&name, lines)?))
}

async fn command_handler(
    State(control): State<ControlInterface>,
    Path((name, command)): Path<(String, String)>,
) -> Result<Json<ProcessStatus>, ApiError> {
    let command: ControlCommand = command.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(control.execute(command, &name).await?))
}

async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            ProcessError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            ProcessError::ShuttingDown { .. } => ApiError::Unavailable(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("API error: {} - {}", status, message);
        } else {
            warn!("API error: {} - {}", status, message);
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagedProcessConfig;
    use crate::supervisor::ProcessSupervisor;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use stackup_process_state::ProcessState;
    use tower::util::ServiceExt; // for `oneshot`

    fn test_control() -> ControlInterface {
        let supervisor = ProcessSupervisor::with_processes(vec![
            ManagedProcessConfig::new("worker", "sleep").with_args(["30"]),
        ])
        .unwrap();
        ControlInterface::new(supervisor)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_endpoint() {
        let app = create_router(test_control());

        let response = app.oneshot(get_request("/api/v1/processes")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let statuses: Vec<ProcessStatus> = body_json(response).await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "worker");
        assert_eq!(statuses[0].state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_unknown_process_is_404() {
        let app = create_router(test_control());

        let response = app
            .oneshot(get_request("/api/v1/processes/ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: ErrorResponse = body_json(response).await;
        assert!(body.error.contains("ghost"));
    }

    #[tokio::test]
    async fn test_unknown_command_is_400() {
        let app = create_router(test_control());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/processes/worker/reload")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_and_stop_commands() {
        let control = test_control();
        let app = create_router(control.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/processes/worker/start")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: ProcessStatus = body_json(response).await;
        assert_eq!(status.state, ProcessState::Running);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/processes/worker/stop")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status: ProcessStatus = body_json(response).await;
        assert_eq!(status.state, ProcessState::Stopped);

        control.supervisor().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_control());

        let response = app.oneshot(get_request("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
