#![warn(missing_docs)]

//! # sandgate-proxy
//!
//! The trusted side of sandgate. An [`Orchestrator`] session:
//!
//! 1. loads a script ([`ScriptSource`])
//! 2. submits it to a [`SandboxBackend`](sandgate_protocol::SandboxBackend)
//!    under a fixed time budget
//! 3. surfaces the captured logs through a [`SessionObserver`]
//! 4. decodes the completion value into plain data or a directive
//! 5. performs at most one [`ToolProvider`](sandgate_protocol::ToolProvider)
//!    call, never retried
//!
//! The result is a [`SessionReport`] whose `error`, if any, is a
//! [`SessionError`] that tells a failing script apart from a failing tool and
//! from failing connectivity.

pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod source;
pub mod state;

pub use error::{Endpoint, Fault, SessionError};
pub use observer::{SessionObserver, TracingObserver};
pub use orchestrator::{Orchestrator, SessionReport};
pub use source::ScriptSource;
pub use state::{SessionState, ToolOutcome};
