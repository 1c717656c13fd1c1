//! MCP tool provider.
//!
//! Connects to one MCP server over stdio (child process) or Streamable HTTP
//! and forwards decoded directives to it as `tools/call` requests.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use rmcp::model::{CallToolRequestParams, CallToolResult, Content, RawContent};
use rmcp::service::{RunningService, ServiceError};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{Peer, RoleClient, ServiceExt};
use sandgate_protocol::{ToolError, ToolInvocationResult, ToolProvider};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// How to reach the tool provider.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Spawn a child process and speak MCP over its stdin/stdout.
    Stdio {
        /// Command to execute.
        command: String,
        /// Arguments to the command.
        args: Vec<String>,
    },
    /// Connect via Streamable HTTP.
    Http {
        /// URL of the MCP endpoint.
        url: String,
        /// Sent as `Authorization: Bearer <token>`.
        bearer_token: Option<String>,
        /// Additional HTTP headers.
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    /// Short human-readable description of the endpoint, without secrets.
    pub fn describe(&self) -> String {
        match self {
            TransportConfig::Stdio { command, .. } => format!("stdio:{command}"),
            TransportConfig::Http { url, .. } => url.clone(),
        }
    }
}

/// A live MCP client session acting as the privileged tool provider.
pub struct McpToolProvider {
    endpoint: String,
    service: RunningService<RoleClient, ()>,
}

impl McpToolProvider {
    /// Connect and complete the MCP handshake.
    ///
    /// Any failure here means no call was ever delivered, so it is reported
    /// as [`ToolError::Unreachable`].
    pub async fn connect(config: &TransportConfig) -> Result<Self, ToolError> {
        let endpoint = config.describe();
        let service = match config {
            TransportConfig::Stdio { command, args } => connect_stdio(command, args).await?,
            TransportConfig::Http {
                url,
                bearer_token,
                headers,
            } => connect_http(url, bearer_token.as_deref(), headers).await?,
        };
        tracing::info!(endpoint = %endpoint, "connected to tool provider");
        Ok(Self { endpoint, service })
    }

    /// Where this provider is connected.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn peer(&self) -> &Peer<RoleClient> {
        &self.service
    }

    /// Close the session. For stdio this also ends the child process.
    pub async fn disconnect(self) {
        tracing::debug!(endpoint = %self.endpoint, "disconnecting from tool provider");
        let _ = self.service.cancel().await;
    }
}

/// Default deadline for spawning or reaching the provider and finishing the
/// MCP handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the tool provider on the first call and reuses the session.
///
/// Sessions whose script produces no directive never open a connection.
/// A failed connection attempt is not cached; the next call tries again.
///
/// Connecting and calling have separate deadlines. A handshake that does not
/// finish in time is [`ToolError::Unreachable`] since nothing was delivered;
/// only the `tools/call` itself is bounded by the call deadline.
pub struct LazyMcpToolProvider {
    config: TransportConfig,
    connect_timeout: Duration,
    call_timeout: Option<Duration>,
    provider: OnceCell<McpToolProvider>,
}

impl LazyMcpToolProvider {
    /// Create a provider that connects with `config` when first needed.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
            provider: OnceCell::new(),
        }
    }

    /// Set the connect and handshake deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound each delivered `tools/call` by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Whether a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.provider.initialized()
    }

    /// Close the session if one was opened.
    pub async fn disconnect(self) {
        if let Some(provider) = self.provider.into_inner() {
            provider.disconnect().await;
        }
    }

    async fn connect(&self) -> Result<McpToolProvider, ToolError> {
        match tokio::time::timeout(self.connect_timeout, McpToolProvider::connect(&self.config))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(
                    endpoint = %self.config.describe(),
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "tool provider handshake timed out"
                );
                Err(ToolError::Unreachable(format!(
                    "MCP handshake with {} did not complete within {}ms",
                    self.config.describe(),
                    self.connect_timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl ToolProvider for LazyMcpToolProvider {
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<ToolInvocationResult, ToolError> {
        let provider = self.provider.get_or_try_init(|| self.connect()).await?;
        match self.call_timeout {
            Some(timeout) => {
                crate::timeout::with_deadline(tool, timeout, provider.call_tool(tool, arguments))
                    .await
            }
            None => provider.call_tool(tool, arguments).await,
        }
    }
}

async fn connect_stdio(
    command: &str,
    args: &[String],
) -> Result<RunningService<RoleClient, ()>, ToolError> {
    tracing::info!(command = %command, args = ?args, "spawning tool provider (stdio)");

    let transport = TokioChildProcess::new(Command::new(command).configure(|cmd| {
        for arg in args {
            cmd.arg(arg);
        }
    }))
    .map_err(|e| ToolError::Unreachable(format!("failed to spawn '{command}': {e}")))?;

    ().serve(transport)
        .await
        .map_err(|e| ToolError::Unreachable(format!("MCP handshake with '{command}' failed: {e}")))
}

async fn connect_http(
    url: &str,
    bearer_token: Option<&str>,
    extra_headers: &HashMap<String, String>,
) -> Result<RunningService<RoleClient, ()>, ToolError> {
    tracing::info!(url = %url, "connecting to tool provider (HTTP)");

    let mut headers = extra_headers.clone();
    headers.insert("User-Agent".into(), crate::USER_AGENT.into());
    if let Some(token) = bearer_token {
        headers.insert("Authorization".into(), format!("Bearer {token}"));
    }
    sanitize_headers_for_transport(url, &mut headers);

    let mut header_map = HashMap::new();
    for (key, value) in &headers {
        if is_sensitive_header(key) {
            tracing::debug!(header = %key, "setting header (redacted)");
        } else {
            tracing::debug!(header = %key, value = %value, "setting header");
        }
        let name = http::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ToolError::Internal(anyhow::anyhow!("invalid header name {key}: {e}")))?;
        let value = http::HeaderValue::from_str(value)
            .map_err(|e| ToolError::Internal(anyhow::anyhow!("invalid header value for {key}: {e}")))?;
        header_map.insert(name, value);
    }

    let config = StreamableHttpClientTransportConfig::with_uri(url).custom_headers(header_map);
    let transport = StreamableHttpClientTransport::from_config(config);
    ().serve(transport)
        .await
        .map_err(|e| ToolError::Unreachable(format!("MCP handshake with {url} failed: {e}")))
}

#[async_trait::async_trait]
impl ToolProvider for McpToolProvider {
    #[tracing::instrument(skip(self, arguments), fields(endpoint = %self.endpoint))]
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<ToolInvocationResult, ToolError> {
        let result: CallToolResult = self
            .peer()
            .call_tool(CallToolRequestParams {
                meta: None,
                name: Cow::Owned(tool.to_string()),
                arguments: Some(arguments),
                task: None,
            })
            .await
            .map_err(|e| service_error_to_tool_error(tool, e))?;

        Ok(call_tool_result_to_invocation(result))
    }
}

fn service_error_to_tool_error(tool: &str, err: ServiceError) -> ToolError {
    match err {
        ServiceError::McpError(data) => ToolError::Rejected {
            tool: tool.to_string(),
            message: data.message.to_string(),
        },
        ServiceError::TransportSend(e) => {
            ToolError::Unreachable(format!("failed to send '{tool}' request: {e}"))
        }
        ServiceError::TransportClosed => {
            ToolError::Unreachable(format!("connection closed before '{tool}' completed"))
        }
        other => ToolError::Internal(anyhow::anyhow!("tool call '{tool}' failed: {other}")),
    }
}

/// Map an MCP `CallToolResult` to the provider's verdict.
///
/// `isError: true` becomes a failed invocation carrying the text content.
/// Otherwise structured content wins, then the content items.
fn call_tool_result_to_invocation(result: CallToolResult) -> ToolInvocationResult {
    if result.is_error == Some(true) {
        let message = result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let message = if message.is_empty() {
            "tool reported an error".to_string()
        } else {
            message
        };
        return ToolInvocationResult::failed(message);
    }

    if let Some(structured) = result.structured_content {
        return ToolInvocationResult::ok(structured);
    }

    let payload = match result.content.as_slice() {
        [] => Value::Null,
        [single] => content_to_value(single),
        many => Value::Array(many.iter().map(content_to_value).collect()),
    };
    ToolInvocationResult::ok(payload)
}

/// Maximum size in bytes for text content before it is replaced by a preview.
const MAX_TEXT_CONTENT_SIZE: usize = 10_485_760; // 10 MB

/// Maximum size in bytes for binary content (images, audio) before truncation.
const MAX_BINARY_CONTENT_SIZE: usize = 1_048_576; // 1 MB

fn content_to_value(content: &Content) -> Value {
    match &content.raw {
        RawContent::Text(t) => {
            if t.text.len() > MAX_TEXT_CONTENT_SIZE {
                let preview: String = t.text.chars().take(1024).collect();
                serde_json::json!({
                    "type": "text",
                    "truncated": true,
                    "original_size": t.text.len(),
                    "preview": preview,
                })
            } else {
                // JSON text is passed through as structure, anything else as a string.
                serde_json::from_str(&t.text).unwrap_or_else(|_| Value::String(t.text.clone()))
            }
        }
        RawContent::Image(img) => binary_to_value("image", &img.data, &img.mime_type),
        RawContent::Audio(a) => binary_to_value("audio", &a.data, &a.mime_type),
        RawContent::Resource(r) => serde_json::json!({
            "type": "resource",
            "resource": serde_json::to_value(&r.resource).unwrap_or(Value::Null),
        }),
        _ => serde_json::json!({"type": "unknown"}),
    }
}

fn binary_to_value(kind: &str, data: &str, mime_type: &str) -> Value {
    if data.len() > MAX_BINARY_CONTENT_SIZE {
        serde_json::json!({
            "type": kind,
            "truncated": true,
            "original_size": data.len(),
            "mime_type": mime_type,
        })
    } else {
        serde_json::json!({
            "type": kind,
            "data": data,
            "mime_type": mime_type,
        })
    }
}

/// Sensitive header name substrings (lowercase).
const SENSITIVE_HEADER_PATTERNS: &[&str] = &[
    "authorization",
    "cookie",
    "token",
    "secret",
    "key",
    "credential",
    "password",
    "auth",
];

fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_HEADER_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Whether `url` names this machine (`localhost` or a loopback address).
fn is_loopback_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Strip credential-bearing headers from plain-HTTP connections to other hosts.
///
/// Loopback URLs keep their headers, so local development against an
/// authenticated provider still works without TLS.
fn sanitize_headers_for_transport(url: &str, headers: &mut HashMap<String, String>) {
    if !url.starts_with("http://") || is_loopback_url(url) {
        return;
    }
    let removed: Vec<String> = headers
        .keys()
        .filter(|k| is_sensitive_header(k))
        .cloned()
        .collect();
    for key in &removed {
        headers.remove(key);
    }
    if !removed.is_empty() {
        tracing::warn!(
            url = %url,
            removed_headers = ?removed,
            "stripped credentials from plain HTTP connection, use HTTPS to send them"
        );
    }
}
