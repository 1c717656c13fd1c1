//! HTTP client for the sandbox executor.

use std::time::Duration;

use sandgate_protocol::{ExecutionOutcome, ExecutionRequest, SandboxBackend, TransportError};

/// Budget assumed when a request does not name one.
const FALLBACK_BUDGET: Duration = Duration::from_secs(30);

/// Longest error body kept in [`TransportError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Talks to a `sandgate-sandboxd` executor at a fixed `/execute` URL.
///
/// The whole exchange is bounded by the script's budget plus a grace period,
/// so a stalled executor surfaces as [`TransportError::Timeout`] instead of
/// hanging the session.
#[derive(Debug, Clone)]
pub struct HttpSandboxClient {
    http: reqwest::Client,
    endpoint: String,
    grace: Duration,
}

impl HttpSandboxClient {
    /// Create a client for `endpoint` (the full `/execute` URL).
    pub fn new(endpoint: impl Into<String>, grace: Duration) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| TransportError::Unreachable {
                endpoint: endpoint.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            endpoint,
            grace,
        })
    }

    /// The executor URL this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn deadline(&self, request: &ExecutionRequest) -> Duration {
        request.time_budget.unwrap_or(FALLBACK_BUDGET) + self.grace
    }

    fn classify(&self, err: reqwest::Error, deadline: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                endpoint: self.endpoint.clone(),
                timeout_ms: deadline.as_millis() as u64,
            }
        } else {
            TransportError::Unreachable {
                endpoint: self.endpoint.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl SandboxBackend for HttpSandboxClient {
    #[tracing::instrument(skip(self, request), fields(endpoint = %self.endpoint))]
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, TransportError> {
        let deadline = self.deadline(&request);
        tracing::debug!(
            code_len = request.code.len(),
            deadline_ms = deadline.as_millis() as u64,
            "submitting script to sandbox"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(deadline)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e, deadline))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(e, deadline))?;
        let outcome: ExecutionOutcome = serde_json::from_slice(&bytes)?;
        outcome
            .check_consistency()
            .map_err(TransportError::MalformedResponse)?;

        tracing::debug!(
            status = %outcome.status,
            logs = outcome.logs.len(),
            has_result = outcome.result.is_some(),
            "sandbox responded"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_budget_plus_grace() {
        let client =
            HttpSandboxClient::new("http://127.0.0.1:1/execute", Duration::from_secs(5)).unwrap();
        let request = ExecutionRequest::new("1", Duration::from_millis(250));
        assert_eq!(client.deadline(&request), Duration::from_millis(5_250));
    }

    #[test]
    fn deadline_without_budget_uses_fallback() {
        let client =
            HttpSandboxClient::new("http://127.0.0.1:1/execute", Duration::from_secs(1)).unwrap();
        let request = ExecutionRequest {
            code: "1".into(),
            time_budget: None,
        };
        assert_eq!(client.deadline(&request), Duration::from_secs(31));
    }
}
