#![warn(missing_docs)]

//! # sandgate-protocol
//!
//! The contract between the three sandgate roles:
//!
//! - [`wire`]: what the orchestrator sends to the sandbox executor and what
//!   comes back ([`ExecutionRequest`], [`ExecutionOutcome`]).
//! - [`directive`]: how a completion value is interpreted as plain data or as
//!   a request for one privileged action ([`decode`]).
//! - [`tool`]: the result of that action ([`ToolInvocationResult`]).
//!
//! The two async seams the orchestrator drives are [`SandboxBackend`] and
//! [`ToolProvider`]. Implementations live in `sandgate-sandbox` (in-process)
//! and `sandgate-client` (HTTP executor, MCP tool provider).

pub mod directive;
pub mod tool;
pub mod wire;

pub use directive::{decode, Decoded, Directive, MalformedDirective, DIRECTIVE_KEY};
pub use sandgate_error::{ToolError, TransportError};
pub use tool::ToolInvocationResult;
pub use wire::{ExecutionOutcome, ExecutionRequest, ExecutionStatus};

/// Submits scripts to an isolated execution context.
///
/// An `Err` always means the exchange itself failed. Script failures
/// (timeouts, thrown errors) are reported inside the returned
/// [`ExecutionOutcome`].
#[async_trait::async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Execute one script under the request's time budget.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, TransportError>;
}

/// Performs named operations on behalf of a validated [`Directive`].
///
/// Implementations hold credentials and connections to the trusted service.
/// The sandboxed script never sees them.
#[async_trait::async_trait]
pub trait ToolProvider: Send + Sync {
    /// Call a tool by name.
    ///
    /// `Ok` carries the provider's verdict, which may itself be a failure
    /// (`success == false`). `Err` means the call could not be completed.
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolInvocationResult, ToolError>;
}
