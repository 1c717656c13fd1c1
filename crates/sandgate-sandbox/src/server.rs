//! HTTP front for the executor.
//!
//! - `POST /execute` takes an [`ExecutionRequest`] and answers 200 with an
//!   [`ExecutionOutcome`] for every script, including scripts that failed or
//!   timed out.
//! - `GET /health` answers `{"status": "ok"}`.
//!
//! Non-2xx answers mean the executor itself could not run the script: 503
//! when the concurrency limit is reached, 500 for internal failures, and
//! axum's own 4xx rejections for bodies that are not a valid request.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sandgate_protocol::{ExecutionOutcome, ExecutionRequest};
use tokio::net::TcpListener;

use crate::error::SandboxError;
use crate::executor::SandboxExecutor;

/// Build the executor's router.
pub fn router(executor: Arc<SandboxExecutor>) -> Router {
    Router::new()
        .route("/execute", post(execute_handler))
        .route("/health", get(health_handler))
        .with_state(executor)
}

/// Serve the executor on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    executor: Arc<SandboxExecutor>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "sandbox executor listening");
    }
    axum::serve(listener, router(executor))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn execute_handler(
    State(executor): State<Arc<SandboxExecutor>>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionOutcome>, ApiError> {
    let outcome = executor.execute(&request).await?;
    Ok(Json(outcome))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Executor failures rendered as HTTP errors.
struct ApiError(SandboxError);

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SandboxError::ConcurrencyLimit { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SandboxError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self.0, status = status.as_u16(), "execute request failed");
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });
        (status, Json(body)).into_response()
    }
}
