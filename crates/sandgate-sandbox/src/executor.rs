//! Sandbox executor: creates fresh V8 isolates and runs untrusted scripts.
//!
//! Each execution gets a brand new runtime. No state leaks between calls.
//!
//! Scripts run as classic (non-module) scripts, so the value handed back is
//! V8's completion value: the value of the last evaluated expression
//! statement. `({ answer: 42 })` yields the object, `x = 1;` followed by a
//! declaration yields nothing.
//!
//! V8 isolates are `!Send`, so all JsRuntime operations run on a dedicated
//! thread with its own single-threaded tokio runtime. The public API is
//! fully async and `Send`-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use sandgate_protocol::{ExecutionOutcome, ExecutionRequest};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::SandboxError;
use crate::ops::{sandgate_ext, ScriptLog};
use crate::validator::{validate_script, DEFAULT_MAX_CODE_SIZE};

/// Configuration for the sandbox executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Time budget used when a request does not name one.
    pub timeout: Duration,
    /// Upper bound for any requested time budget.
    pub max_time_budget: Duration,
    /// Maximum script size in bytes.
    pub max_code_size: usize,
    /// Maximum size of the serialized completion value in bytes.
    pub max_output_size: usize,
    /// V8 heap limit in bytes.
    pub max_heap_size: usize,
    /// Maximum concurrent sandbox executions.
    pub max_concurrent: usize,
    /// Maximum console lines kept per execution.
    pub max_log_lines: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_time_budget: Duration::from_secs(30),
            max_code_size: DEFAULT_MAX_CODE_SIZE,
            max_output_size: 1024 * 1024,    // 1 MB
            max_heap_size: 64 * 1024 * 1024, // 64 MB
            max_concurrent: 8,
            max_log_lines: 1000,
        }
    }
}

impl SandboxConfig {
    /// The budget actually applied to a request.
    pub fn effective_budget(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.timeout)
            .min(self.max_time_budget)
            .max(Duration::from_millis(1))
    }
}

/// The sandbox executor. Creates fresh V8 isolates for each execution.
///
/// This is `Send + Sync` safe: all V8 operations are dispatched to a
/// dedicated thread internally. A concurrency semaphore limits the number
/// of simultaneous V8 isolates.
pub struct SandboxExecutor {
    config: SandboxConfig,
    semaphore: Arc<Semaphore>,
}

impl SandboxExecutor {
    /// Create a new sandbox executor with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, semaphore }
    }

    /// The executor's configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run one script and report how it ended.
    ///
    /// Thrown errors, syntax errors, validation rejections and timeouts are
    /// all reported inside the returned [`ExecutionOutcome`]. `Err` only
    /// means no isolate could be run.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let budget = self.config.effective_budget(request.time_budget);
        tracing::info!(
            code_len = request.code.len(),
            budget_ms = budget.as_millis() as u64,
            "execute: starting"
        );

        if let Err(reason) = validate_script(&request.code, self.config.max_code_size) {
            tracing::warn!(reason = %reason, "execute: script rejected");
            return Ok(ExecutionOutcome::runtime_error(
                format!("code validation failed: {reason}"),
                Vec::new(),
            ));
        }

        let permit = self.semaphore.clone().try_acquire_owned().map_err(|_| {
            SandboxError::ConcurrencyLimit {
                max: self.config.max_concurrent,
            }
        })?;

        let code = request.code.clone();
        let config = self.config.clone();
        let started = Instant::now();

        // V8 isolates are !Send, so run everything on a dedicated thread.
        // The thread owns the permit: a dropped caller must not free a slot
        // while its isolate is still running.
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    drop(permit);
                    if tx.send(Err(SandboxError::Execution(e.into()))).is_err() {
                        tracing::warn!("sandbox result receiver dropped");
                    }
                    return;
                }
            };
            let result = rt.block_on(run_script(&config, &code, budget));
            drop(permit);
            if tx.send(result).is_err() {
                tracing::warn!("sandbox result receiver dropped before result was sent");
            }
        });

        let result = rx
            .await
            .map_err(|_| SandboxError::Execution(anyhow::anyhow!("sandbox thread panicked")))?;

        match &result {
            Ok(outcome) => tracing::info!(
                status = %outcome.status,
                log_lines = outcome.logs.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "execute: complete"
            ),
            Err(e) => tracing::warn!(error = %e, "execute: failed"),
        }

        result
    }

    /// Convenience wrapper around [`execute`](Self::execute).
    pub async fn execute_code(
        &self,
        code: &str,
        time_budget: Duration,
    ) -> Result<ExecutionOutcome, SandboxError> {
        self.execute(&ExecutionRequest::new(code, time_budget)).await
    }
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    /// Set once the callback fired. Atomic so the callback only needs `&`.
    triggered: AtomicBool,
}

/// V8 near-heap-limit callback. Terminates execution and grants 1MB grace
/// for the termination to propagate cleanly.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the boxed HeapLimitState created in
    // `run_script`. The box is dropped only after the script and the event
    // loop have finished, and V8 only calls back while they are running.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Bootstrap run before user code: install `console`, then remove `Deno`,
/// `eval` and the function constructors.
const BOOTSTRAP: &str = r#"
((ops) => {
    const render = (value) => {
        if (typeof value === "string") return value;
        try {
            const json = JSON.stringify(value);
            return json === undefined ? String(value) : json;
        } catch (_) {
            return String(value);
        }
    };
    const emit = (...args) => ops.op_sandgate_log(args.map(render).join(" "));
    globalThis.console = Object.freeze({
        log: emit,
        info: emit,
        warn: emit,
        error: emit,
        debug: emit,
    });
    delete globalThis.Deno;

    delete globalThis.eval;
    const AsyncFunction = (async function(){}).constructor;
    const GeneratorFunction = (function*(){}).constructor;
    Object.defineProperty(Function.prototype, 'constructor', {
        value: undefined, configurable: false, writable: false
    });
    Object.defineProperty(AsyncFunction.prototype, 'constructor', {
        value: undefined, configurable: false, writable: false
    });
    Object.defineProperty(GeneratorFunction.prototype, 'constructor', {
        value: undefined, configurable: false, writable: false
    });
})(Deno.core.ops);
"#;

/// Create a fresh JsRuntime with the sandgate extension and V8 heap limits.
fn create_runtime(config: &SandboxConfig) -> Result<JsRuntime, SandboxError> {
    let create_params = v8::CreateParams::default().heap_limits(0, config.max_heap_size);

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![sandgate_ext::init()],
        create_params: Some(create_params),
        ..Default::default()
    });

    runtime
        .op_state()
        .borrow_mut()
        .put(ScriptLog::new(config.max_log_lines));

    runtime
        .execute_script("[sandgate:bootstrap]", BOOTSTRAP)
        .map_err(|e| SandboxError::Execution(anyhow::anyhow!("bootstrap failed: {e}")))?;

    Ok(runtime)
}

/// Run a script in a fresh isolate on the current thread.
///
/// Must be called from a dedicated thread, not the main tokio runtime.
/// Sets up a CPU watchdog thread and a near-heap-limit callback before
/// running user code. The watchdog terminates V8 execution when the budget
/// elapses, which also stops CPU-bound infinite loops.
pub async fn run_script(
    config: &SandboxConfig,
    code: &str,
    budget: Duration,
) -> Result<ExecutionOutcome, SandboxError> {
    let mut runtime = create_runtime(config)?;

    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(budget) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    let started = Instant::now();
    let evaluation: Result<Option<String>, String> =
        match runtime.execute_script("[sandgate:script]", code.to_string()) {
            Ok(completion) => match completion_to_json(&mut runtime, completion) {
                // Drain microtasks so lines logged from promise callbacks are kept.
                Ok(json) => {
                    let remaining = budget.saturating_sub(started.elapsed());
                    match tokio::time::timeout(
                        remaining,
                        runtime.run_event_loop(PollEventLoopOptions::default()),
                    )
                    .await
                    {
                        Ok(Ok(())) => Ok(json),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => {
                            timed_out.store(true, Ordering::SeqCst);
                            Err("async timeout".to_string())
                        }
                    }
                }
                Err(message) => Err(message),
            },
            Err(e) => Err(e.to_string()),
        };

    // The watchdog must be gone before the runtime (and its IsolateHandle)
    // is dropped.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    let logs = runtime
        .op_state()
        .borrow_mut()
        .try_take::<ScriptLog>()
        .map(ScriptLog::into_lines)
        .unwrap_or_default();

    if heap_state.triggered.load(Ordering::SeqCst) {
        return Ok(ExecutionOutcome::runtime_error(
            format!(
                "V8 heap limit exceeded ({} bytes)",
                config.max_heap_size
            ),
            logs,
        ));
    }

    if timed_out.load(Ordering::SeqCst) {
        return Ok(ExecutionOutcome::timed_out(budget, logs));
    }

    let json = match evaluation {
        Ok(json) => json,
        Err(message) => {
            return Ok(ExecutionOutcome::runtime_error(
                clean_error_message(&message),
                logs,
            ))
        }
    };

    let Some(json) = json else {
        return Ok(ExecutionOutcome::completed(None, logs));
    };

    if json.len() > config.max_output_size {
        return Ok(ExecutionOutcome::runtime_error(
            format!(
                "output exceeds maximum size of {} bytes",
                config.max_output_size
            ),
            logs,
        ));
    }

    match serde_json::from_str::<Value>(&json) {
        Ok(value) => Ok(ExecutionOutcome::completed(Some(value), logs)),
        Err(e) => Ok(ExecutionOutcome::runtime_error(
            format!("completion value is not valid JSON: {e}"),
            logs,
        )),
    }
}

/// Serialize a completion value with `JSON.stringify` semantics.
///
/// Returns `Ok(None)` when there is no JSON representation (`undefined`,
/// functions, symbols), and `Err` when stringification throws (cycles,
/// BigInt).
fn completion_to_json(
    runtime: &mut JsRuntime,
    completion: v8::Global<v8::Value>,
) -> Result<Option<String>, String> {
    let scope = &mut runtime.handle_scope();
    let value = v8::Local::new(scope, completion);
    if value.is_undefined() || value.is_function() || value.is_symbol() {
        return Ok(None);
    }

    let tc = &mut v8::TryCatch::new(scope);
    match v8::json::stringify(tc, value) {
        Some(json) => {
            let json = json.to_rust_string_lossy(tc);
            if json == "undefined" {
                Ok(None)
            } else {
                Ok(Some(json))
            }
        }
        None => Err(tc
            .exception()
            .map(|e| e.to_rust_string_lossy(tc))
            .unwrap_or_else(|| "completion value could not be serialized".to_string())),
    }
}

/// Reduce a V8 error report to its first line, without the `Uncaught ` prefix.
fn clean_error_message(raw: &str) -> String {
    let first = raw.lines().next().unwrap_or(raw).trim();
    let first = first.strip_prefix("Uncaught ").unwrap_or(first);
    if first.is_empty() {
        "script failed".to_string()
    } else {
        first.to_string()
    }
}
