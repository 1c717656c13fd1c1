//! The dispatch orchestrator.

use std::sync::Arc;
use std::time::Duration;

use sandgate_protocol::{
    decode, Decoded, Directive, ExecutionRequest, ExecutionStatus, SandboxBackend,
    ToolInvocationResult, ToolProvider,
};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Endpoint, SessionError};
use crate::observer::{SessionObserver, TracingObserver};
use crate::source::ScriptSource;
use crate::state::{SessionState, ToolOutcome};

/// Everything one session produced, in the order it was produced.
///
/// Fields populated before a failure are kept; `error` says why the session
/// stopped.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Unique id, also recorded on the session's tracing span.
    pub session_id: Uuid,
    /// Final state.
    pub state: SessionState,
    /// Console lines captured by the sandbox.
    pub logs: Vec<String>,
    /// The script's completion value, if it completed and left one.
    pub completion_value: Option<Value>,
    /// The decoded directive, if any.
    pub directive: Option<Directive>,
    /// The tool provider's verdict, if a call returned one.
    pub tool_result: Option<ToolInvocationResult>,
    /// Why the session failed. `None` means success.
    pub error: Option<SessionError>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Idle,
            logs: Vec::new(),
            completion_value: None,
            directive: None,
            tool_result: None,
            error: None,
        }
    }

    /// Whether the session ended without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs scripts in a sandbox and performs at most one tool call per script.
///
/// Sessions share nothing but the two backends, which are safe for
/// concurrent use, so one orchestrator can serve many tasks at once.
pub struct Orchestrator {
    sandbox: Arc<dyn SandboxBackend>,
    tools: Arc<dyn ToolProvider>,
    time_budget: Duration,
    observer: Arc<dyn SessionObserver>,
}

impl Orchestrator {
    /// Create an orchestrator that reports through [`TracingObserver`].
    pub fn new(
        sandbox: Arc<dyn SandboxBackend>,
        tools: Arc<dyn ToolProvider>,
        time_budget: Duration,
    ) -> Self {
        Self {
            sandbox,
            tools,
            time_budget,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the session observer.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The time budget granted to every script.
    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Run one session to completion. Never fails: errors land in the report.
    pub async fn run(&self, source: &ScriptSource) -> SessionReport {
        let mut session = Session {
            report: SessionReport::new(),
            observer: self.observer.as_ref(),
        };
        let span = tracing::info_span!("session", session_id = %session.report.session_id);

        async {
            tracing::info!(budget_ms = self.time_budget.as_millis() as u64, "session started");
            if let Err(err) = self.drive(&mut session, source).await {
                tracing::warn!(
                    code = err.code(),
                    fault = %err.fault(),
                    state = %session.report.state,
                    error = %err,
                    "session failed"
                );
                session.report.error = Some(err);
            } else {
                tracing::info!(state = %session.report.state, "session finished");
            }
        }
        .instrument(span)
        .await;

        session.report
    }

    async fn drive(
        &self,
        session: &mut Session<'_>,
        source: &ScriptSource,
    ) -> Result<(), SessionError> {
        let code = source.load().await?;

        session.advance(SessionState::Submitted);
        let request = ExecutionRequest::new(code, self.time_budget);
        let outcome = match self.sandbox.execute(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                session.advance(SessionState::TransportFailed);
                return Err(SessionError::TransportFailure {
                    endpoint: Endpoint::Sandbox,
                    message: err.to_string(),
                });
            }
        };

        self.observer
            .on_logs(session.report.session_id, &outcome.logs);
        session.report.logs = outcome.logs.clone();

        let error_text = || {
            outcome
                .error
                .clone()
                .unwrap_or_else(|| "no error message".to_string())
        };
        match outcome.status {
            ExecutionStatus::TimedOut => {
                session.advance(SessionState::TimedOut);
                return Err(SessionError::SandboxTimeout(error_text()));
            }
            ExecutionStatus::RuntimeError => {
                session.advance(SessionState::RuntimeError);
                return Err(SessionError::SandboxRuntimeError(error_text()));
            }
            ExecutionStatus::Completed => session.advance(SessionState::Completed),
        }

        session.report.completion_value = outcome.completion_value().cloned();
        self.observer
            .on_completion(session.report.session_id, outcome.completion_value());
        let directive = match decode(outcome.completion_value()) {
            Decoded::PlainData => {
                session.advance(SessionState::NoDirective);
                return Ok(());
            }
            Decoded::Malformed(reason) => {
                session.advance(SessionState::MalformedDirective);
                return Err(reason.into());
            }
            Decoded::Directive(directive) => directive,
        };

        session.advance(SessionState::DirectiveDecoded);
        session.report.directive = Some(directive.clone());
        self.observer
            .on_directive(session.report.session_id, &directive);

        let tool = directive.operation_name;
        match self.tools.call_tool(&tool, directive.arguments).await {
            Ok(result) if result.success => {
                session.advance(SessionState::ToolInvoked(ToolOutcome::Success));
                session.report.tool_result = Some(result);
                Ok(())
            }
            Ok(result) => {
                session.advance(SessionState::ToolInvoked(ToolOutcome::Failure));
                let message = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "tool reported failure".to_string());
                session.report.tool_result = Some(result);
                Err(SessionError::ToolInvocationFailure { tool, message })
            }
            Err(err) => {
                session.advance(SessionState::ToolInvoked(ToolOutcome::Failure));
                if err.never_delivered() {
                    Err(SessionError::TransportFailure {
                        endpoint: Endpoint::ToolProvider,
                        message: err.to_string(),
                    })
                } else {
                    Err(SessionError::ToolInvocationFailure {
                        tool,
                        message: err.to_string(),
                    })
                }
            }
        }
    }
}

struct Session<'a> {
    report: SessionReport,
    observer: &'a dyn SessionObserver,
}

impl Session<'_> {
    /// Move to `next` if the state machine allows it.
    fn advance(&mut self, next: SessionState) {
        let from = self.report.state;
        if !from.can_transition_to(next) {
            tracing::error!(from = %from, to = %next, "rejected session transition");
            return;
        }
        self.report.state = next;
        self.observer
            .on_transition(self.report.session_id, from, next);
    }
}

// Compile-time assertion: one orchestrator is shared across tasks.
const _: fn() = || {
    fn assert_bounds<T: Send + Sync>() {}
    assert_bounds::<Orchestrator>();
};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use sandgate_protocol::{ExecutionOutcome, ToolError, TransportError};
    use serde_json::json;

    use super::*;

    struct FixedSandbox(Result<ExecutionOutcome, fn() -> TransportError>);

    #[async_trait::async_trait]
    impl SandboxBackend for FixedSandbox {
        async fn execute(
            &self,
            _request: ExecutionRequest,
        ) -> Result<ExecutionOutcome, TransportError> {
            match &self.0 {
                Ok(outcome) => Ok(outcome.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn failing(make: fn() -> TransportError) -> FixedSandbox {
        FixedSandbox(Err(make))
    }

    fn completed(result: Value) -> FixedSandbox {
        FixedSandbox(Ok(ExecutionOutcome::completed(
            Some(result),
            vec!["log line".into()],
        )))
    }

    #[derive(Default)]
    struct RecordingTools {
        calls: Mutex<Vec<(String, serde_json::Map<String, Value>)>>,
        reply: Option<fn() -> Result<ToolInvocationResult, ToolError>>,
    }

    impl RecordingTools {
        fn replying(reply: fn() -> Result<ToolInvocationResult, ToolError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply: Some(reply),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl ToolProvider for RecordingTools {
        async fn call_tool(
            &self,
            tool: &str,
            arguments: serde_json::Map<String, Value>,
        ) -> Result<ToolInvocationResult, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((tool.to_string(), arguments.clone()));
            match self.reply {
                Some(reply) => reply(),
                None => Ok(ToolInvocationResult::ok(json!({ "echo": arguments }))),
            }
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        log_batches: AtomicUsize,
        transitions: Mutex<Vec<SessionState>>,
    }

    impl SessionObserver for CountingObserver {
        fn on_logs(&self, _session_id: Uuid, _logs: &[String]) {
            self.log_batches.fetch_add(1, Ordering::SeqCst);
        }

        fn on_transition(&self, _session_id: Uuid, _from: SessionState, to: SessionState) {
            self.transitions.lock().unwrap().push(to);
        }
    }

    fn orchestrator(sandbox: FixedSandbox, tools: Arc<RecordingTools>) -> Orchestrator {
        Orchestrator::new(Arc::new(sandbox), tools, Duration::from_secs(1))
    }

    fn inline() -> ScriptSource {
        ScriptSource::Inline("irrelevant".into())
    }

    #[tokio::test]
    async fn directive_triggers_exactly_one_call() {
        let tools = Arc::new(RecordingTools::default());
        let report = orchestrator(
            completed(json!({
                "mcp_call": { "tool": "hello_name", "arguments": { "name": "X" } }
            })),
            tools.clone(),
        )
        .run(&inline())
        .await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.state, SessionState::ToolInvoked(ToolOutcome::Success));
        assert_eq!(report.logs, vec!["log line"]);
        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "hello_name");
        assert_eq!(calls[0].1["name"], "X");
        assert_eq!(
            report.tool_result.unwrap().payload,
            json!({ "echo": { "name": "X" } })
        );
    }

    #[tokio::test]
    async fn plain_data_never_calls_the_provider() {
        let tools = Arc::new(RecordingTools::default());
        let report = orchestrator(completed(json!({ "answer": 42 })), tools.clone())
            .run(&inline())
            .await;

        assert!(report.is_success());
        assert_eq!(report.state, SessionState::NoDirective);
        assert_eq!(report.completion_value, Some(json!({ "answer": 42 })));
        assert!(report.directive.is_none());
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn absent_completion_value_is_no_directive() {
        let tools = Arc::new(RecordingTools::default());
        let sandbox = FixedSandbox(Ok(ExecutionOutcome::completed(None, vec![])));
        let report = orchestrator(sandbox, tools.clone()).run(&inline()).await;

        assert_eq!(report.state, SessionState::NoDirective);
        assert!(report.completion_value.is_none());
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_directive_is_a_protocol_error() {
        let tools = Arc::new(RecordingTools::default());
        let report = orchestrator(completed(json!({ "mcp_call": {} })), tools.clone())
            .run(&inline())
            .await;

        assert_eq!(report.state, SessionState::MalformedDirective);
        let err = report.error.unwrap();
        assert_eq!(err.code(), "MALFORMED_DIRECTIVE");
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn timeout_keeps_logs_and_skips_the_provider() {
        let tools = Arc::new(RecordingTools::default());
        let sandbox = FixedSandbox(Ok(ExecutionOutcome::timed_out(
            Duration::from_millis(100),
            vec!["before loop".into()],
        )));
        let report = orchestrator(sandbox, tools.clone()).run(&inline()).await;

        assert_eq!(report.state, SessionState::TimedOut);
        assert_eq!(report.logs, vec!["before loop"]);
        assert!(report.completion_value.is_none());
        assert_eq!(report.error.unwrap().code(), "SANDBOX_TIMEOUT");
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn runtime_error_keeps_message_and_logs() {
        let tools = Arc::new(RecordingTools::default());
        let sandbox = FixedSandbox(Ok(ExecutionOutcome::runtime_error(
            "Error: boom",
            vec!["step 1".into()],
        )));
        let report = orchestrator(sandbox, tools.clone()).run(&inline()).await;

        assert_eq!(report.state, SessionState::RuntimeError);
        assert_eq!(report.logs, vec!["step 1"]);
        let err = report.error.unwrap();
        assert_eq!(err.code(), "SANDBOX_RUNTIME_ERROR");
        assert!(err.to_string().contains("boom"));
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn sandbox_transport_failure_is_plumbing() {
        let tools = Arc::new(RecordingTools::default());
        let sandbox = failing(|| TransportError::Unreachable {
            endpoint: "http://127.0.0.1:1/execute".into(),
            message: "connection refused".into(),
        });
        let report = orchestrator(sandbox, tools.clone()).run(&inline()).await;

        assert_eq!(report.state, SessionState::TransportFailed);
        match report.error.unwrap() {
            SessionError::TransportFailure { endpoint, .. } => {
                assert_eq!(endpoint, Endpoint::Sandbox)
            }
            other => panic!("expected TransportFailure, got: {other:?}"),
        }
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_reported_not_retried() {
        let tools = Arc::new(RecordingTools::replying(|| {
            Ok(ToolInvocationResult::failed("always fails"))
        }));
        let report = orchestrator(
            completed(json!({ "mcp_call": { "tool": "always_fail" } })),
            tools.clone(),
        )
        .run(&inline())
        .await;

        assert_eq!(report.state, SessionState::ToolInvoked(ToolOutcome::Failure));
        assert_eq!(tools.call_count(), 1);
        assert!(!report.tool_result.as_ref().unwrap().success);
        let err = report.error.unwrap();
        assert_eq!(err.code(), "TOOL_INVOCATION_FAILURE");
        assert!(err.to_string().contains("always fails"));
    }

    #[tokio::test]
    async fn tool_timeout_is_an_action_failure() {
        let tools = Arc::new(RecordingTools::replying(|| {
            Err(ToolError::Timeout {
                tool: "slow_task".into(),
                timeout_ms: 50,
            })
        }));
        let report = orchestrator(
            completed(json!({ "mcp_call": { "tool": "slow_task" } })),
            tools.clone(),
        )
        .run(&inline())
        .await;

        assert_eq!(report.error.unwrap().code(), "TOOL_INVOCATION_FAILURE");
        assert_eq!(tools.call_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_failure() {
        let tools = Arc::new(RecordingTools::replying(|| {
            Err(ToolError::Unreachable("connection refused".into()))
        }));
        let report = orchestrator(
            completed(json!({ "mcp_call": { "tool": "hello_name" } })),
            tools.clone(),
        )
        .run(&inline())
        .await;

        assert_eq!(report.state, SessionState::ToolInvoked(ToolOutcome::Failure));
        assert!(report.directive.is_some());
        match report.error.unwrap() {
            SessionError::TransportFailure { endpoint, .. } => {
                assert_eq!(endpoint, Endpoint::ToolProvider)
            }
            other => panic!("expected TransportFailure, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_script_never_reaches_the_sandbox() {
        let tools = Arc::new(RecordingTools::default());
        let report = orchestrator(completed(json!(1)), tools.clone())
            .run(&ScriptSource::File("/definitely/not/here.js".into()))
            .await;

        assert_eq!(report.state, SessionState::Idle);
        assert_eq!(report.error.unwrap().code(), "SCRIPT_UNAVAILABLE");
    }

    #[tokio::test]
    async fn observer_sees_logs_and_every_transition() {
        let tools = Arc::new(RecordingTools::default());
        let observer = Arc::new(CountingObserver::default());
        let report = orchestrator(
            completed(json!({ "mcp_call": { "tool": "hello_name" } })),
            tools,
        )
        .with_observer(observer.clone())
        .run(&inline())
        .await;

        assert!(report.is_success());
        assert_eq!(observer.log_batches.load(Ordering::SeqCst), 1);
        assert_eq!(
            *observer.transitions.lock().unwrap(),
            vec![
                SessionState::Submitted,
                SessionState::Completed,
                SessionState::DirectiveDecoded,
                SessionState::ToolInvoked(ToolOutcome::Success),
            ]
        );
    }

    #[tokio::test]
    async fn observer_is_told_when_there_are_no_logs() {
        let observer = Arc::new(CountingObserver::default());
        let sandbox = FixedSandbox(Ok(ExecutionOutcome::completed(Some(json!(1)), vec![])));
        let report = orchestrator(sandbox, Arc::new(RecordingTools::default()))
            .with_observer(observer.clone())
            .run(&inline())
            .await;

        assert_eq!(report.state, SessionState::NoDirective);
        assert!(report.logs.is_empty());
        assert_eq!(observer.log_batches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sessions_get_distinct_ids() {
        let orchestrator = orchestrator(completed(json!(1)), Arc::new(RecordingTools::default()));
        let a = orchestrator.run(&inline()).await;
        let b = orchestrator.run(&inline()).await;
        assert_ne!(a.session_id, b.session_id);
    }
}
