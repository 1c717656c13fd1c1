//! Hooks for watching a session as it progresses.

use sandgate_protocol::Directive;
use serde_json::Value;
use uuid::Uuid;

use crate::state::SessionState;

/// Receives session events as they happen, before the report is assembled.
///
/// Sandbox logs are delivered as soon as the outcome arrives, so they stay
/// visible even when a later step fails.
pub trait SessionObserver: Send + Sync {
    /// Console lines captured by the sandbox, in emission order. Called once
    /// per outcome, with an empty slice if the script logged nothing.
    fn on_logs(&self, session_id: Uuid, logs: &[String]);

    /// The script completed; `None` means it left no completion value.
    fn on_completion(&self, _session_id: Uuid, _value: Option<&Value>) {}

    /// A directive is about to be sent to the tool provider.
    fn on_directive(&self, _session_id: Uuid, _directive: &Directive) {}

    /// The session moved to a new state.
    fn on_transition(&self, _session_id: Uuid, _from: SessionState, _to: SessionState) {}
}

/// Emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_logs(&self, session_id: Uuid, logs: &[String]) {
        for line in logs {
            tracing::info!(target: "sandgate::script", session_id = %session_id, "{}", line);
        }
    }

    fn on_completion(&self, session_id: Uuid, value: Option<&Value>) {
        tracing::debug!(session_id = %session_id, has_value = value.is_some(), "script completed");
    }

    fn on_directive(&self, session_id: Uuid, directive: &Directive) {
        tracing::info!(
            session_id = %session_id,
            tool = %directive.operation_name,
            arg_count = directive.arguments.len(),
            "dispatching directive"
        );
    }

    fn on_transition(&self, session_id: Uuid, from: SessionState, to: SessionState) {
        tracing::debug!(session_id = %session_id, from = %from, to = %to, "session transition");
    }
}
