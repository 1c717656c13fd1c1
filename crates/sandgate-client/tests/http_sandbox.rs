//! HttpSandboxClient against stub executors.
//!
//! Each test binds a throwaway axum server on an ephemeral port that answers
//! `/execute` in one particular way, good or bad.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use sandgate_client::HttpSandboxClient;
use sandgate_protocol::{ExecutionRequest, ExecutionStatus, SandboxBackend, TransportError};
use serde_json::{json, Value};

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/execute")
}

fn client(url: &str, grace_ms: u64) -> HttpSandboxClient {
    HttpSandboxClient::new(url, Duration::from_millis(grace_ms)).unwrap()
}

fn request(budget_ms: u64) -> ExecutionRequest {
    ExecutionRequest::new("1 + 1", Duration::from_millis(budget_ms))
}

#[tokio::test]
async fn completed_outcome_is_returned() {
    let url = spawn_stub(Router::new().route(
        "/execute",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["code"], "1 + 1");
            assert_eq!(body["timeout_ms"], 500);
            Json(json!({
                "status": "completed",
                "result": {"mcp_call": {"tool": "hello_name", "arguments": {"name": "Ada"}}},
                "logs": ["hi"]
            }))
        }),
    ))
    .await;

    let outcome = client(&url, 1_000).execute(request(500)).await.unwrap();
    assert_eq!(outcome.status, ExecutionStatus::Completed);
    assert_eq!(outcome.logs, vec!["hi"]);
    assert_eq!(
        outcome.completion_value().unwrap()["mcp_call"]["tool"],
        "hello_name"
    );
}

#[tokio::test]
async fn timed_out_outcome_is_not_a_transport_error() {
    let url = spawn_stub(Router::new().route(
        "/execute",
        post(|| async {
            Json(json!({
                "status": "timed_out",
                "logs": ["before loop"],
                "error": "execution timed out after 100ms"
            }))
        }),
    ))
    .await;

    let outcome = client(&url, 1_000).execute(request(100)).await.unwrap();
    assert_eq!(outcome.status, ExecutionStatus::TimedOut);
    assert!(outcome.completion_value().is_none());
    assert_eq!(outcome.logs, vec!["before loop"]);
}

#[tokio::test]
async fn service_unavailable_is_a_status_error() {
    let url = spawn_stub(Router::new().route(
        "/execute",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "busy", "code": "CONCURRENCY_LIMIT"})),
            )
        }),
    ))
    .await;

    let err = client(&url, 1_000).execute(request(100)).await.unwrap_err();
    match err {
        TransportError::Status { status, body, .. } => {
            assert_eq!(status, 503);
            assert!(body.contains("CONCURRENCY_LIMIT"));
        }
        other => panic!("expected Status, got: {other:?}"),
    }
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let url = spawn_stub(Router::new().route("/execute", post(|| async { "not json" }))).await;

    let err = client(&url, 1_000).execute(request(100)).await.unwrap_err();
    assert!(matches!(err, TransportError::MalformedResponse(_)), "{err:?}");
}

#[tokio::test]
async fn result_on_failed_status_is_malformed() {
    let url = spawn_stub(Router::new().route(
        "/execute",
        post(|| async {
            Json(json!({
                "status": "runtime_error",
                "result": {"leaked": true},
                "logs": [],
                "error": "boom"
            }))
        }),
    ))
    .await;

    let err = client(&url, 1_000).execute(request(100)).await.unwrap_err();
    assert!(matches!(err, TransportError::MalformedResponse(_)), "{err:?}");
}

#[tokio::test]
async fn stalled_executor_is_a_transport_timeout() {
    let url = spawn_stub(Router::new().route(
        "/execute",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({"status": "completed", "logs": []}))
        }),
    ))
    .await;

    let started = std::time::Instant::now();
    let err = client(&url, 100).execute(request(100)).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    match err {
        TransportError::Timeout { timeout_ms, .. } => assert_eq!(timeout_ms, 200),
        other => panic!("expected Timeout, got: {other:?}"),
    }
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/execute");
    let err = client(&url, 1_000).execute(request(100)).await.unwrap_err();
    assert!(matches!(err, TransportError::Unreachable { .. }), "{err:?}");
    assert_eq!(err.code(), "SANDBOX_UNREACHABLE");
}
