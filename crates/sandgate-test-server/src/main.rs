//! Minimal MCP tool provider for integration testing.
//!
//! Speaks MCP over stdio and exposes three tools:
//! - `hello_name`: greets by name
//! - `slow_task`: sleeps, then reports how long
//! - `always_fail`: reports a tool error every time

use std::time::Duration;

use anyhow::Context;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ServerHandler, ServiceExt};
use serde::Deserialize;

#[derive(Clone)]
struct TestServer {
    tool_router: ToolRouter<Self>,
}

impl TestServer {
    fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct HelloInput {
    /// Who to greet.
    name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SlowInput {
    /// How long to sleep, in milliseconds.
    duration_ms: u64,
}

#[tool_router(router = tool_router)]
impl TestServer {
    #[tool(name = "hello_name", description = "Greet someone by name")]
    async fn hello_name(&self, Parameters(input): Parameters<HelloInput>) -> Result<String, String> {
        Ok(format!("Hello, {}!", input.name))
    }

    #[tool(name = "slow_task", description = "Sleep for duration_ms, then report")]
    async fn slow_task(&self, Parameters(input): Parameters<SlowInput>) -> Result<String, String> {
        tokio::time::sleep(Duration::from_millis(input.duration_ms)).await;
        Ok(format!(r#"{{"slept_ms":{}}}"#, input.duration_ms))
    }

    #[tool(name = "always_fail", description = "Fail every time")]
    async fn always_fail(&self) -> Result<String, String> {
        Err("always fails".to_string())
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for TestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some("Test tool provider for sandgate integration tests".into()),
            server_info: Implementation {
                name: "sandgate-test-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = TestServer::new()
        .serve(rmcp::transport::io::stdio())
        .await
        .context("MCP handshake failed")?;
    service.waiting().await.context("server task failed")?;
    Ok(())
}
