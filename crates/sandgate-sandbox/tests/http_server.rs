//! Integration tests for the executor's HTTP front.
//!
//! Each test binds an ephemeral port, serves a fresh executor on it, and talks
//! to it with a plain reqwest client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sandgate_sandbox::{server, SandboxConfig, SandboxExecutor};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn spawn_executor(config: SandboxConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let executor = Arc::new(SandboxExecutor::new(config));
    tokio::spawn(async move {
        server::serve(listener, executor, std::future::pending())
            .await
            .unwrap();
    });
    addr
}

async fn post_execute(addr: SocketAddr, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let addr = spawn_executor(SandboxConfig::default()).await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn completed_script_returns_result_and_logs() {
    let addr = spawn_executor(SandboxConfig::default()).await;
    let (status, body) = post_execute(
        addr,
        json!({"code": "console.log('Hello'); ({ mcp_call: { tool: 'hello_name', arguments: { name: 'Cloudflare' } } })"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["logs"], json!(["Hello"]));
    assert_eq!(body["result"]["mcp_call"]["tool"], "hello_name");
    assert_eq!(body["result"]["mcp_call"]["arguments"]["name"], "Cloudflare");
}

#[tokio::test]
async fn statement_script_omits_result_key() {
    let addr = spawn_executor(SandboxConfig::default()).await;
    let (status, body) = post_execute(addr, json!({"code": "const done = true;"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "completed");
    assert!(body.get("result").is_none(), "body: {body}");
}

#[tokio::test]
async fn timeout_is_reported_in_band() {
    let addr = spawn_executor(SandboxConfig::default()).await;
    let (status, body) = post_execute(
        addr,
        json!({"code": "console.log('tick'); for (;;) {}", "timeout_ms": 200}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "timed_out");
    assert_eq!(body["logs"], json!(["tick"]));
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn thrown_error_is_reported_in_band() {
    let addr = spawn_executor(SandboxConfig::default()).await;
    let (status, body) = post_execute(
        addr,
        json!({"code": "console.log('a'); throw new TypeError('bad input');"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "runtime_error");
    assert_eq!(body["logs"], json!(["a"]));
    assert!(body["error"].as_str().unwrap().contains("bad input"));
}

#[tokio::test]
async fn concurrency_limit_answers_503() {
    let addr = spawn_executor(SandboxConfig {
        max_concurrent: 0,
        ..Default::default()
    })
    .await;
    let (status, body) = post_execute(addr, json!({"code": "1"})).await;
    assert_eq!(status, 503);
    assert_eq!(body["code"], "CONCURRENCY_LIMIT");
}

#[tokio::test]
async fn body_without_code_is_rejected() {
    let addr = spawn_executor(SandboxConfig::default()).await;
    let (status, _) = post_execute(addr, json!({"script": "1"})).await;
    assert!((400..500).contains(&status), "status: {status}");
}

#[tokio::test]
async fn request_budget_is_honoured() {
    let addr = spawn_executor(SandboxConfig {
        timeout: Duration::from_secs(10),
        ..Default::default()
    })
    .await;
    let started = std::time::Instant::now();
    let (_, body) = post_execute(addr, json!({"code": "while(true){}", "timeout_ms": 150})).await;
    assert_eq!(body["status"], "timed_out");
    assert!(started.elapsed() < Duration::from_secs(5));
}
