//! Pre-execution script checks.
//!
//! The V8 isolate is the actual boundary; these checks reject obvious escape
//! attempts with a readable message before an isolate is created.

/// Default maximum script size in bytes (64 KB).
pub const DEFAULT_MAX_CODE_SIZE: usize = 64 * 1024;

/// Patterns rejected in script source.
const BANNED_PATTERNS: &[&str] = &[
    "eval(",
    "Function(",
    "import(",
    "require(",
    "Deno.",
    "constructor.constructor",
    // Named members only; a bare "process." would reject `job.process.id`.
    "process.env",
    "process.exit",
    "process.argv",
    "process.stdin",
    "process.stdout",
    "process.stderr",
    "process.kill",
    "process.binding",
];

/// Validate a script before it reaches an isolate.
///
/// Returns the rejection message on failure.
pub fn validate_script(code: &str, max_size: usize) -> Result<(), String> {
    if code.len() > max_size {
        return Err(format!(
            "code exceeds maximum size of {max_size} bytes (got {})",
            code.len()
        ));
    }

    if code.trim().is_empty() {
        return Err("code is empty".into());
    }

    if let Some(pattern) = BANNED_PATTERNS.iter().find(|p| code.contains(**p)) {
        return Err(format!(
            "banned pattern detected: `{pattern}`; the sandbox has no module, process, or code generation access"
        ));
    }

    Ok(())
}
