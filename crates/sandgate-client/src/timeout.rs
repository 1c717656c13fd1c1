//! Per-call timeout wrapper for tool providers.

use std::sync::Arc;
use std::time::Duration;

use sandgate_protocol::{ToolError, ToolInvocationResult, ToolProvider};
use serde_json::Value;

/// A [`ToolProvider`] that enforces a per-call deadline on the inner provider.
///
/// The deadline is independent of the script's time budget: the script has
/// already finished by the time a tool is called. Wrap providers that are
/// already connected; [`LazyMcpToolProvider`](crate::LazyMcpToolProvider)
/// takes its call deadline directly so connecting is not counted against it.
pub struct TimeoutToolProvider {
    inner: Arc<dyn ToolProvider>,
    timeout: Duration,
}

impl TimeoutToolProvider {
    /// Wrap an inner provider with a per-call timeout.
    pub fn new(inner: Arc<dyn ToolProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait::async_trait]
impl ToolProvider for TimeoutToolProvider {
    #[tracing::instrument(skip(self, arguments), fields(tool))]
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<ToolInvocationResult, ToolError> {
        with_deadline(tool, self.timeout, self.inner.call_tool(tool, arguments)).await
    }
}

/// Bound a delivered `tools/call` by `timeout`.
///
/// Only wrap calls that have reached the provider: an elapsed deadline is
/// reported as [`ToolError::Timeout`], which counts as an action failure.
pub(crate) async fn with_deadline<F>(
    tool: &str,
    timeout: Duration,
    call: F,
) -> Result<ToolInvocationResult, ToolError>
where
    F: std::future::Future<Output = Result<ToolInvocationResult, ToolError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(ToolError::Timeout {
            tool: tool.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
