//! Per-session state machine.
//!
//! ```text
//! Idle -> Submitted -> Completed | TimedOut | RuntimeError | TransportFailed
//! Completed -> NoDirective | DirectiveDecoded | MalformedDirective
//! DirectiveDecoded -> ToolInvoked(success | failure)
//! ```

use std::fmt;

/// How the single tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The provider reported success.
    Success,
    /// The provider reported failure or the call did not complete.
    Failure,
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, script not yet submitted.
    Idle,
    /// Script sent to the sandbox, awaiting the outcome.
    Submitted,
    /// The sandbox finished the script normally.
    Completed,
    /// The script ran past its budget.
    TimedOut,
    /// The script failed inside the sandbox.
    RuntimeError,
    /// The sandbox exchange failed.
    TransportFailed,
    /// The completion value was plain data.
    NoDirective,
    /// A well-formed directive was extracted.
    DirectiveDecoded,
    /// The directive key was present with a bad payload.
    MalformedDirective,
    /// The one tool call was made.
    ToolInvoked(ToolOutcome),
}

impl SessionState {
    /// Whether the machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Submitted)
                | (Submitted, Completed | TimedOut | RuntimeError | TransportFailed)
                | (Completed, NoDirective | DirectiveDecoded | MalformedDirective)
                | (DirectiveDecoded, ToolInvoked(_))
        )
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::TimedOut
                | SessionState::RuntimeError
                | SessionState::TransportFailed
                | SessionState::NoDirective
                | SessionState::MalformedDirective
                | SessionState::ToolInvoked(_)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Submitted => "submitted",
            SessionState::Completed => "completed",
            SessionState::TimedOut => "timed_out",
            SessionState::RuntimeError => "runtime_error",
            SessionState::TransportFailed => "transport_failed",
            SessionState::NoDirective => "no_directive",
            SessionState::DirectiveDecoded => "directive_decoded",
            SessionState::MalformedDirective => "malformed_directive",
            SessionState::ToolInvoked(ToolOutcome::Success) => "tool_invoked(success)",
            SessionState::ToolInvoked(ToolOutcome::Failure) => "tool_invoked(failure)",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Idle,
            Submitted,
            Completed,
            DirectiveDecoded,
            ToolInvoked(ToolOutcome::Success),
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn sandbox_failures_cannot_reach_a_tool_call() {
        for failed in [TimedOut, RuntimeError, TransportFailed] {
            assert!(Submitted.can_transition_to(failed));
            assert!(failed.is_terminal());
            assert!(!failed.can_transition_to(DirectiveDecoded));
            assert!(!failed.can_transition_to(ToolInvoked(ToolOutcome::Failure)));
        }
    }

    #[test]
    fn shortcuts_are_rejected() {
        assert!(!Idle.can_transition_to(Completed));
        assert!(!Submitted.can_transition_to(DirectiveDecoded));
        assert!(!Completed.can_transition_to(ToolInvoked(ToolOutcome::Success)));
        assert!(!NoDirective.can_transition_to(DirectiveDecoded));
    }

    #[test]
    fn tool_invoked_is_final() {
        let done = ToolInvoked(ToolOutcome::Success);
        assert!(done.is_terminal());
        assert!(!done.can_transition_to(ToolInvoked(ToolOutcome::Success)));
    }
}
