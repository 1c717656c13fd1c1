#![warn(missing_docs)]

//! sandgate: run a script in the sandbox, then perform the one tool call it
//! asks for.
//!
//! ```text
//! sandgate run --script "console.log('Hello'); ({ mcp_call: { tool: 'hello_name', arguments: { name: 'Ada' } } })"
//! ```
//!
//! Output goes to stdout in the order the session produced it: sandbox logs,
//! the completion value, the detected tool call, and the tool result.
//! Diagnostics go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandgate_client::{HttpSandboxClient, LazyMcpToolProvider, TransportConfig};
use sandgate_config::{find_config_file, SandgateConfig, ToolProviderConfig};
use sandgate_protocol::Directive;
use sandgate_proxy::{Orchestrator, ScriptSource, SessionObserver, SessionReport};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sandgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run untrusted scripts in a sandbox and dispatch the tool call they request", long_about = None)]
struct Cli {
    /// Config file (default: $SANDGATE_CONFIG, then ./sandgate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one script and dispatch its directive, if any
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Script code, or a path to a script file
    #[arg(short, long)]
    script: String,

    /// MCP server URL of the tool provider
    #[arg(long, env = "SANDGATE_SERVER_URL")]
    server_url: Option<String>,

    /// Bearer token for the tool provider
    #[arg(long, env = "SANDGATE_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: Option<String>,

    /// Sandbox executor URL (the /execute route)
    #[arg(long, env = "SANDGATE_SANDBOX_URL")]
    sandbox_url: Option<String>,

    /// Time budget for the script in milliseconds
    #[arg(long)]
    time_budget_ms: Option<u64>,
}

/// Apply command-line overrides on top of the file config.
fn apply_overrides(config: &mut SandgateConfig, args: &RunArgs) {
    if let Some(url) = &args.sandbox_url {
        config.sandbox.url = url.clone();
    }
    if let Some(ms) = args.time_budget_ms {
        config.sandbox.time_budget_ms = ms;
    }
    if let Some(url) = &args.server_url {
        config.tool_provider.transport = "http".into();
        config.tool_provider.url = Some(url.clone());
    }
    if let Some(token) = &args.bearer_token {
        config.tool_provider.bearer_token = Some(token.clone());
    }
}

/// Convert the validated tool provider section to a TransportConfig.
fn to_transport_config(provider: &ToolProviderConfig) -> Result<TransportConfig> {
    match provider.transport.as_str() {
        "stdio" => Ok(TransportConfig::Stdio {
            command: provider.command.clone().unwrap_or_default(),
            args: provider.args.clone(),
        }),
        "http" => Ok(TransportConfig::Http {
            url: provider.url.clone().unwrap_or_default(),
            bearer_token: provider.bearer_token.clone(),
            headers: provider.headers.clone(),
        }),
        other => anyhow::bail!(
            "unsupported transport type '{}' (expected 'http' or 'stdio')",
            other
        ),
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<SandgateConfig> {
    match find_config_file(explicit) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            SandgateConfig::from_file_with_env(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(SandgateConfig::default())
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Prints session events to stdout as they happen.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_logs(&self, _session_id: Uuid, logs: &[String]) {
        println!("--- Sandbox Logs ---");
        for line in logs {
            println!("| {line}");
        }
    }

    fn on_completion(&self, _session_id: Uuid, value: Option<&Value>) {
        println!("\n--- Sandbox Final Result ---");
        match value {
            Some(value) => println!("{}", pretty(value)),
            None => println!("(no completion value)"),
        }
    }

    fn on_directive(&self, _session_id: Uuid, directive: &Directive) {
        println!(
            "\n--- Proxy: Detected MCP Tool Call: {} ---",
            directive.operation_name
        );
        println!("Calling tool '{}' on server...", directive.operation_name);
    }
}

fn print_outcome(report: &SessionReport) {
    if let Some(result) = &report.tool_result {
        println!("\n--- MCP Server Result ---");
        if result.success {
            println!("{}", pretty(&result.payload));
        } else {
            println!(
                "tool reported failure: {}",
                result.error_message.as_deref().unwrap_or("(no message)")
            );
        }
    }

    if let Some(err) = &report.error {
        println!("\nSession failed [{}] ({} fault): {}", err.code(), err.fault(), err);
    }
}

async fn run(config: SandgateConfig, args: RunArgs) -> Result<ExitCode> {
    let sandbox = HttpSandboxClient::new(
        config.sandbox.url.clone(),
        Duration::from_millis(config.sandbox.transport_grace_ms),
    )
    .context("failed to create sandbox client")?;

    let transport = to_transport_config(&config.tool_provider)?;
    tracing::debug!(provider = %transport.describe(), "tool provider configured");
    let tools = Arc::new(
        LazyMcpToolProvider::new(transport)
            .with_connect_timeout(config.tool_provider.connect_timeout())
            .with_call_timeout(config.tool_provider.timeout()),
    );

    let orchestrator = Orchestrator::new(
        Arc::new(sandbox),
        tools.clone(),
        config.sandbox.time_budget(),
    )
    .with_observer(Arc::new(ConsoleObserver));

    println!("--- Sending code to Sandbox ({}) ---", config.sandbox.url);
    let report = orchestrator
        .run(&ScriptSource::from_arg(&args.script))
        .await;
    print_outcome(&report);

    // The orchestrator holds the other reference; release it first.
    drop(orchestrator);
    if let Some(tools) = Arc::into_inner(tools) {
        tools.disconnect().await;
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, &args);
            config.validate().context("invalid configuration")?;
            run(config, args).await
        }
    }
}
