//! Request/response types exchanged between the orchestrator and the executor.
//!
//! On the wire a request is `{ "code": "...", "timeout_ms": 5000 }` and a
//! response is `{ "status": "completed", "result": {...}, "logs": [...] }`.
//! A `result` key that is missing means the script left no completion value;
//! `"result": null` means the completion value was `null`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One script submission. Built by the orchestrator, consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The script body.
    pub code: String,
    /// Wall-clock budget. `None` lets the executor apply its default.
    #[serde(
        rename = "timeout_ms",
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_millis"
    )]
    pub time_budget: Option<Duration>,
}

impl ExecutionRequest {
    /// Create a request with an explicit time budget.
    pub fn new(code: impl Into<String>, time_budget: Duration) -> Self {
        Self {
            code: code.into(),
            time_budget: Some(time_budget),
        }
    }
}

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The script ran to the end.
    Completed,
    /// The watchdog aborted the script when its budget ran out.
    TimedOut,
    /// The script threw, failed to parse, or was rejected before running.
    RuntimeError,
}

impl ExecutionStatus {
    /// Stable lowercase name, identical to the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::RuntimeError => "runtime_error",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single result of one [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// How the run ended.
    pub status: ExecutionStatus,
    /// The completion value. Only ever present when `status` is `Completed`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,
    /// Diagnostic lines in emission order.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Error message for `TimedOut` and `RuntimeError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// A run that finished, with an optional completion value.
    pub fn completed(result: Option<Value>, logs: Vec<String>) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            result,
            logs,
            error: None,
        }
    }

    /// A run aborted by the watchdog. Any pending completion value is dropped.
    pub fn timed_out(budget: Duration, logs: Vec<String>) -> Self {
        Self {
            status: ExecutionStatus::TimedOut,
            result: None,
            logs,
            error: Some(format!(
                "execution timed out after {}ms",
                budget.as_millis()
            )),
        }
    }

    /// A run that failed inside the sandbox.
    pub fn runtime_error(message: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            status: ExecutionStatus::RuntimeError,
            result: None,
            logs,
            error: Some(message.into()),
        }
    }

    /// The completion value, if the run completed and left one.
    pub fn completion_value(&self) -> Option<&Value> {
        match self.status {
            ExecutionStatus::Completed => self.result.as_ref(),
            _ => None,
        }
    }

    /// Reject outcomes that break the status/result invariant.
    ///
    /// Used on the receiving side of the wire: an executor that reports a
    /// completion value for a failed run is not trusted.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.status != ExecutionStatus::Completed && self.result.is_some() {
            return Err(format!(
                "status '{}' must not carry a completion value",
                self.status
            ));
        }
        Ok(())
    }
}

/// Deserialize a present key as `Some`, including an explicit `null`.
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
