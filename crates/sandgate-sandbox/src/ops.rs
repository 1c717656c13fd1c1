//! deno_core op definitions for the sandgate sandbox.
//!
//! The only capability a script receives is diagnostic logging. Lines land in
//! a [`ScriptLog`] owned by the runtime's `OpState`, so each isolate has its
//! own buffer and nothing reaches the host's stdout.
//!
//! The `#[op2]` macro generates public items that cannot carry doc comments.
#![allow(missing_docs)]

use deno_core::op2;
use deno_core::OpState;

/// Per-execution buffer of console lines, in emission order.
#[derive(Debug, Default)]
pub struct ScriptLog {
    lines: Vec<String>,
    max_lines: usize,
    dropped: usize,
}

impl ScriptLog {
    /// Create an empty buffer that keeps at most `max_lines` lines.
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Vec::new(),
            max_lines,
            dropped: 0,
        }
    }

    /// Record one line, or count it as dropped once the buffer is full.
    pub fn push(&mut self, line: String) {
        if self.lines.len() < self.max_lines {
            self.lines.push(line);
        } else {
            self.dropped += 1;
        }
    }

    /// Consume the buffer. A trailing marker line reports dropped lines.
    pub fn into_lines(mut self) -> Vec<String> {
        if self.dropped > 0 {
            self.lines
                .push(format!("... {} more log lines dropped", self.dropped));
        }
        self.lines
    }
}

/// Record a console line from sandbox code.
#[op2(fast)]
pub fn op_sandgate_log(state: &mut OpState, #[string] line: &str) {
    tracing::debug!(target: "sandgate::sandbox::script", "{}", line);
    if let Some(log) = state.try_borrow_mut::<ScriptLog>() {
        log.push(line.to_string());
    }
}

deno_core::extension!(sandgate_ext, ops = [op_sandgate_log]);
