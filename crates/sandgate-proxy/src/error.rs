//! Session failure taxonomy.

use std::fmt;

use sandgate_protocol::MalformedDirective;
use thiserror::Error;

/// Which side of the orchestrator a transport failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The sandbox executor.
    Sandbox,
    /// The tool provider.
    ToolProvider,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Endpoint::Sandbox => "sandbox",
            Endpoint::ToolProvider => "tool provider",
        })
    }
}

/// Who has to act to fix a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The script itself failed or asked for something malformed.
    Script,
    /// The script asked for a valid action and the action failed.
    Tool,
    /// Connectivity between components failed.
    Plumbing,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fault::Script => "script",
            Fault::Tool => "tool",
            Fault::Plumbing => "plumbing",
        })
    }
}

/// Why a session ended without success. Every variant is terminal.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The script text could not be loaded.
    #[error("script unavailable: {0}")]
    ScriptUnavailable(String),

    /// The sandbox executor or the tool provider could not be reached.
    #[error("{endpoint} transport failure: {message}")]
    TransportFailure {
        /// Which component could not be reached.
        endpoint: Endpoint,
        /// Underlying error text.
        message: String,
    },

    /// The script ran past its time budget.
    #[error("sandbox timed out: {0}")]
    SandboxTimeout(String),

    /// The script threw or was rejected before running.
    #[error("sandbox runtime error: {0}")]
    SandboxRuntimeError(String),

    /// The completion value carried the directive key with a bad payload.
    #[error("malformed directive: {0}")]
    MalformedDirective(#[from] MalformedDirective),

    /// The tool provider reported failure, or the call did not complete.
    #[error("tool '{tool}' failed: {message}")]
    ToolInvocationFailure {
        /// The tool that was called.
        tool: String,
        /// The provider's error text.
        message: String,
    },
}

impl SessionError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ScriptUnavailable(_) => "SCRIPT_UNAVAILABLE",
            Self::TransportFailure { .. } => "TRANSPORT_FAILURE",
            Self::SandboxTimeout(_) => "SANDBOX_TIMEOUT",
            Self::SandboxRuntimeError(_) => "SANDBOX_RUNTIME_ERROR",
            Self::MalformedDirective(_) => "MALFORMED_DIRECTIVE",
            Self::ToolInvocationFailure { .. } => "TOOL_INVOCATION_FAILURE",
        }
    }

    /// Classify the failure by who has to fix it.
    pub fn fault(&self) -> Fault {
        match self {
            Self::ScriptUnavailable(_)
            | Self::SandboxTimeout(_)
            | Self::SandboxRuntimeError(_)
            | Self::MalformedDirective(_) => Fault::Script,
            Self::ToolInvocationFailure { .. } => Fault::Tool,
            Self::TransportFailure { .. } => Fault::Plumbing,
        }
    }
}
