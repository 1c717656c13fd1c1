//! Error types for the sandgate sandbox.
//!
//! Script failures are not errors here: a script that throws or runs out of
//! time still produces an [`ExecutionOutcome`](sandgate_protocol::ExecutionOutcome).
//! These variants cover the executor failing to run the script at all.

use thiserror::Error;

/// Errors that prevent the executor from producing an outcome.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Too many concurrent sandbox executions.
    #[error("concurrency limit reached (max {max} concurrent executions)")]
    ConcurrencyLimit {
        /// Maximum allowed concurrent executions.
        max: usize,
    },

    /// The isolate thread or its runtime could not be set up, or it died.
    #[error("sandbox execution failed: {0}")]
    Execution(#[from] anyhow::Error),
}

impl SandboxError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConcurrencyLimit { .. } => "CONCURRENCY_LIMIT",
            Self::Execution(_) => "EXECUTION_FAILED",
        }
    }
}
