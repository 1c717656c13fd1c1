#![warn(missing_docs)]

//! sandgate sandbox executor.
//!
//! Serves `POST /execute` and `GET /health` on the configured address. Every
//! request runs in a fresh V8 isolate on its own thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sandgate_config::{find_config_file, ExecutorOverrides, SandgateConfig};
use sandgate_sandbox::{server, SandboxConfig, SandboxExecutor};
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Parser)]
#[command(name = "sandgate-sandboxd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run untrusted scripts in isolated V8 runtimes over HTTP", long_about = None)]
struct Args {
    /// Config file (default: $SANDGATE_CONFIG, then ./sandgate.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding [executor].listen
    #[arg(long, env = "SANDGATE_LISTEN")]
    listen: Option<String>,

    /// Maximum concurrent executions, overriding [executor].max_concurrent
    #[arg(long)]
    max_concurrent: Option<usize>,
}

/// Build SandboxConfig from config overrides.
fn build_sandbox_config(overrides: &ExecutorOverrides) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    if let Some(ms) = overrides.default_time_budget_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = overrides.max_time_budget_ms {
        config.max_time_budget = Duration::from_millis(ms);
    }
    if let Some(kb) = overrides.max_code_size_kb {
        config.max_code_size = kb * 1024;
    }
    if let Some(kb) = overrides.max_output_kb {
        config.max_output_size = kb * 1024;
    }
    if let Some(heap) = overrides.max_heap_mb {
        config.max_heap_size = heap * 1024 * 1024;
    }
    if let Some(concurrent) = overrides.max_concurrent {
        config.max_concurrent = concurrent;
    }
    if let Some(lines) = overrides.max_log_lines {
        config.max_log_lines = lines;
    }
    config
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c, shutting down");
        return;
    }
    tracing::info!("ctrl-c received, draining in-flight executions");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match find_config_file(args.config.as_deref()) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            SandgateConfig::from_file_with_env(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => {
            tracing::info!("no config file found, using executor defaults");
            SandgateConfig::default()
        }
    };

    let mut overrides = config.executor;
    if args.max_concurrent.is_some() {
        overrides.max_concurrent = args.max_concurrent;
    }
    overrides.validate().context("invalid executor configuration")?;

    let sandbox_config = build_sandbox_config(&overrides);
    let listen = args
        .listen
        .or(overrides.listen)
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());

    tracing::info!(
        listen = %listen,
        default_budget_ms = sandbox_config.timeout.as_millis() as u64,
        max_budget_ms = sandbox_config.max_time_budget.as_millis() as u64,
        max_concurrent = sandbox_config.max_concurrent,
        max_heap_mb = sandbox_config.max_heap_size / (1024 * 1024),
        "starting sandbox executor"
    );

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let executor = Arc::new(SandboxExecutor::new(sandbox_config));

    server::serve(listener, executor, shutdown_signal())
        .await
        .context("sandbox executor server failed")?;

    tracing::info!("sandbox executor stopped");
    Ok(())
}
