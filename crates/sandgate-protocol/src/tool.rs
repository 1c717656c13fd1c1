//! Tool provider results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The provider's verdict on one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    /// Whether the provider reports success.
    pub success: bool,
    /// The tool's output. `Null` on failure.
    #[serde(default)]
    pub payload: Value,
    /// The provider's error text when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolInvocationResult {
    /// A successful call.
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error_message: None,
        }
    }

    /// A call the provider reported as failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Value::Null,
            error_message: Some(message.into()),
        }
    }
}
