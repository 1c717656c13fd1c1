#![warn(missing_docs)]

//! # sandgate-config
//!
//! Configuration loading for the sandgate proxy and its sandbox executor.
//!
//! Supports TOML configuration files with environment variable expansion.
//! Every section is optional; missing values fall back to local defaults
//! (executor on `127.0.0.1:8080`, tool provider on `127.0.0.1:1338/mcp`).
//!
//! ## Example
//!
//! ```toml
//! [sandbox]
//! url = "http://127.0.0.1:8080/execute"
//! time_budget_ms = 5000
//! transport_grace_ms = 5000
//!
//! [tool_provider]
//! transport = "http"
//! url = "https://tools.example.com/mcp"
//! bearer_token = "${SANDGATE_BEARER_TOKEN}"
//! timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [executor]
//! listen = "127.0.0.1:8080"
//! max_concurrent = 8
//! max_heap_mb = 64
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SANDGATE_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sandgate.toml";

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level sandgate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandgateConfig {
    /// How the proxy reaches the sandbox executor.
    #[serde(default)]
    pub sandbox: SandboxEndpoint,

    /// How the proxy reaches the tool provider.
    #[serde(default)]
    pub tool_provider: ToolProviderConfig,

    /// Settings for the executor server itself.
    #[serde(default)]
    pub executor: ExecutorOverrides,
}

/// The sandbox executor as seen from the proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxEndpoint {
    /// Full URL of the executor's `/execute` route.
    #[serde(default = "default_sandbox_url")]
    pub url: String,

    /// Wall-clock budget granted to each script.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,

    /// Extra time the HTTP round-trip may take beyond the budget.
    #[serde(default = "default_transport_grace_ms")]
    pub transport_grace_ms: u64,
}

impl Default for SandboxEndpoint {
    fn default() -> Self {
        Self {
            url: default_sandbox_url(),
            time_budget_ms: default_time_budget_ms(),
            transport_grace_ms: default_transport_grace_ms(),
        }
    }
}

impl SandboxEndpoint {
    /// The per-script time budget.
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// The deadline for the whole HTTP exchange: budget plus grace.
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms.saturating_add(self.transport_grace_ms))
    }
}

/// Connection settings for the tool provider (an MCP server).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolProviderConfig {
    /// Transport type: "http" (Streamable HTTP) or "stdio".
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Server URL (http transport).
    #[serde(default = "default_tool_provider_url")]
    pub url: Option<String>,

    /// Command to execute (stdio transport).
    #[serde(default)]
    pub command: Option<String>,

    /// Command arguments (stdio transport).
    #[serde(default)]
    pub args: Vec<String>,

    /// Bearer token sent as `Authorization: Bearer <token>` (http transport).
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Additional HTTP headers (http transport).
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Deadline for one tool call, independent of the script budget.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    /// Deadline for spawning or reaching the provider and completing the
    /// MCP handshake.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ToolProviderConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            url: default_tool_provider_url(),
            command: None,
            args: Vec::new(),
            bearer_token: None,
            headers: HashMap::new(),
            timeout_secs: default_tool_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ToolProviderConfig {
    /// The per-call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The connect and handshake deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Executor server overrides. Unset values keep the executor's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorOverrides {
    /// Socket address to listen on.
    #[serde(default)]
    pub listen: Option<String>,

    /// Budget applied when a request names none, in milliseconds.
    #[serde(default)]
    pub default_time_budget_ms: Option<u64>,

    /// Upper bound for any requested budget, in milliseconds.
    #[serde(default)]
    pub max_time_budget_ms: Option<u64>,

    /// Maximum concurrent sandbox executions.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Maximum script size in kilobytes.
    #[serde(default)]
    pub max_code_size_kb: Option<usize>,

    /// Maximum serialized completion value size in kilobytes.
    #[serde(default)]
    pub max_output_kb: Option<usize>,

    /// Maximum V8 heap size in megabytes.
    #[serde(default)]
    pub max_heap_mb: Option<usize>,

    /// Maximum console lines kept per execution.
    #[serde(default)]
    pub max_log_lines: Option<usize>,
}

impl ExecutorOverrides {
    /// Reject limits that would leave the executor unable to run anything.
    ///
    /// `max_log_lines = 0` is allowed and discards all console output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zeroed = [
            ("default_time_budget_ms", self.default_time_budget_ms == Some(0)),
            ("max_time_budget_ms", self.max_time_budget_ms == Some(0)),
            ("max_concurrent", self.max_concurrent == Some(0)),
            ("max_code_size_kb", self.max_code_size_kb == Some(0)),
            ("max_output_kb", self.max_output_kb == Some(0)),
            ("max_heap_mb", self.max_heap_mb == Some(0)),
        ];
        if let Some((name, _)) = zeroed.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::Invalid(format!(
                "executor: '{name}' must be greater than zero"
            )));
        }
        if let (Some(default), Some(max)) = (self.default_time_budget_ms, self.max_time_budget_ms) {
            if default > max {
                return Err(ConfigError::Invalid(format!(
                    "executor: 'default_time_budget_ms' ({default}) exceeds 'max_time_budget_ms' ({max})"
                )));
            }
        }
        Ok(())
    }
}

fn default_sandbox_url() -> String {
    "http://127.0.0.1:8080/execute".into()
}

fn default_time_budget_ms() -> u64 {
    5_000
}

fn default_transport_grace_ms() -> u64 {
    5_000
}

fn default_transport() -> String {
    "http".into()
}

fn default_tool_provider_url() -> Option<String> {
    Some("http://127.0.0.1:1338/mcp".into())
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl SandgateConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: SandgateConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    /// Check that every endpoint and budget a session needs is present.
    ///
    /// Called by the parsers, and again by front ends after they apply
    /// command-line overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.sandbox.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("sandbox: 'url' is required".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "sandbox: 'url' must be an http(s) URL, got '{url}'"
            )));
        }
        if self.sandbox.time_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "sandbox: 'time_budget_ms' must be greater than zero".into(),
            ));
        }

        let provider = &self.tool_provider;
        match provider.transport.as_str() {
            "http" => {
                if provider.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                    return Err(ConfigError::Invalid(
                        "tool_provider: http transport requires 'url'".into(),
                    ));
                }
            }
            "stdio" => {
                if provider.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
                    return Err(ConfigError::Invalid(
                        "tool_provider: stdio transport requires 'command'".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "tool_provider: unsupported transport '{other}', supported: http, stdio"
                )));
            }
        }
        if provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tool_provider: 'timeout_secs' must be greater than zero".into(),
            ));
        }
        if provider.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tool_provider: 'connect_timeout_secs' must be greater than zero".into(),
            ));
        }
        if provider
            .bearer_token
            .as_deref()
            .is_some_and(|t| t.contains("${"))
        {
            return Err(ConfigError::Invalid(
                "tool_provider: 'bearer_token' references an unset environment variable".into(),
            ));
        }

        self.executor.validate()
    }
}

/// Locate the config file.
///
/// Search order:
/// 1. an explicit path (from the command line)
/// 2. `SANDGATE_CONFIG` environment variable
/// 3. `./sandgate.toml` in the current directory
/// 4. None (no config file found, which is not an error)
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let cwd = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                // Leave the placeholder; validate() reports it where it matters.
                Err(_) => result.push_str(&format!("${{{var_name}}}")),
            }
        } else {
            result.push(ch);
        }
    }

    result
}
