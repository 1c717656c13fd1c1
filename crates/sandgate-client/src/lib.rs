#![warn(missing_docs)]

//! # sandgate-client
//!
//! Remote implementations of the two orchestrator seams:
//!
//! - [`HttpSandboxClient`] submits scripts to a `sandgate-sandboxd` executor
//!   over HTTP and implements [`SandboxBackend`](sandgate_protocol::SandboxBackend).
//! - [`McpToolProvider`] calls tools on an MCP server over stdio or
//!   Streamable HTTP and implements [`ToolProvider`](sandgate_protocol::ToolProvider).
//!   [`LazyMcpToolProvider`] defers the connection until the first call.
//! - [`TimeoutToolProvider`] bounds every call on a connected provider with
//!   its own deadline.

pub mod mcp;
pub mod sandbox;
pub mod timeout;

pub use mcp::{LazyMcpToolProvider, McpToolProvider, TransportConfig};
pub use sandbox::HttpSandboxClient;
pub use timeout::TimeoutToolProvider;

/// `User-Agent` sent on every outbound HTTP request.
pub const USER_AGENT: &str = concat!("sandgate/", env!("CARGO_PKG_VERSION"));
