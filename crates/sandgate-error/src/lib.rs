#![warn(missing_docs)]

//! Typed error types for the sandgate transport boundaries.
//!
//! Provides [`TransportError`] for the orchestrator ⇄ executor round-trip and
//! [`ToolError`] for the orchestrator ⇄ tool provider call. Both carry a
//! static error code for programmatic matching.

use thiserror::Error;

/// Failure to complete a request/response exchange with the sandbox executor.
///
/// These never describe what the script did, only that the plumbing between
/// the orchestrator and the executor failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The executor could not be reached at all.
    #[error("sandbox unreachable at {endpoint}: {message}")]
    Unreachable {
        /// The endpoint that was contacted.
        endpoint: String,
        /// Underlying connection error.
        message: String,
    },

    /// No response arrived within the transport deadline.
    #[error("no response from sandbox at {endpoint} within {timeout_ms}ms")]
    Timeout {
        /// The endpoint that was contacted.
        endpoint: String,
        /// The transport deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The executor answered with a non-success HTTP status.
    #[error("sandbox at {endpoint} returned HTTP {status}: {body}")]
    Status {
        /// The endpoint that was contacted.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The executor answered, but the body does not follow the wire contract.
    #[error("malformed sandbox response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "SANDBOX_UNREACHABLE",
            Self::Timeout { .. } => "SANDBOX_TRANSPORT_TIMEOUT",
            Self::Status { .. } => "SANDBOX_HTTP_STATUS",
            Self::MalformedResponse(_) => "SANDBOX_MALFORMED_RESPONSE",
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Canonical error type for tool provider calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The tool provider could not be reached (connection or handshake failed).
    #[error("tool provider unreachable: {0}")]
    Unreachable(String),

    /// The tool call did not complete within its own deadline.
    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The tool that was called.
        tool: String,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The provider processed the request and reported a failure.
    #[error("tool '{tool}' failed: {message}")]
    Rejected {
        /// The tool that was called.
        tool: String,
        /// The provider's error message.
        message: String,
    },

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "TOOL_PROVIDER_UNREACHABLE",
            Self::Timeout { .. } => "TOOL_TIMEOUT",
            Self::Rejected { .. } => "TOOL_REJECTED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the request can be assumed to never have reached the provider.
    ///
    /// Only in that case is the failure purely a connectivity problem. Every
    /// other variant may have had side effects on the provider.
    pub fn never_delivered(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

// Compile-time assertion: both error types cross task boundaries.
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<TransportError>();
    assert_bounds::<ToolError>();
};
