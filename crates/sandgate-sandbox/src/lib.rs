#![warn(missing_docs)]

//! # sandgate-sandbox
//!
//! Isolated execution context for sandgate.
//!
//! Runs untrusted JavaScript in a deno_core isolate with no filesystem,
//! network, process, or environment access. The only capability injected is
//! `console`, whose lines are captured per execution.
//!
//! ## Guarantees
//!
//! - **Fresh runtime per call**: no globals or bindings survive a call
//! - **Wall-clock budget**: a watchdog terminates the isolate when it expires
//! - **Failures stay inside**: throws, syntax errors, and timeouts become an
//!   [`ExecutionOutcome`](sandgate_protocol::ExecutionOutcome), never an `Err`
//! - **Bounded output**: completion value size, log lines, and heap are capped

pub mod error;
pub mod executor;
pub mod ops;
pub mod server;
pub mod validator;

pub use error::SandboxError;
pub use executor::{SandboxConfig, SandboxExecutor};

use sandgate_protocol::{ExecutionOutcome, ExecutionRequest, SandboxBackend, TransportError};

/// Run scripts in this process, without HTTP in between.
///
/// Executor-level failures surface as [`TransportError::Unreachable`]: the
/// sandbox could not take the request.
#[async_trait::async_trait]
impl SandboxBackend for SandboxExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, TransportError> {
        SandboxExecutor::execute(self, &request)
            .await
            .map_err(|e| TransportError::Unreachable {
                endpoint: "in-process sandbox".into(),
                message: e.to_string(),
            })
    }
}
