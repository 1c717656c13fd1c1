//! Where a session's script text comes from.

use std::path::{Path, PathBuf};

use crate::error::SessionError;

/// A script given inline or by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// The script text itself.
    Inline(String),
    /// A file to read when the session starts.
    File(PathBuf),
}

impl ScriptSource {
    /// Interpret a command-line value: an existing file is read, anything
    /// else is treated as code.
    pub fn from_arg(arg: &str) -> Self {
        let path = Path::new(arg);
        if path.is_file() {
            ScriptSource::File(path.to_path_buf())
        } else {
            ScriptSource::Inline(arg.to_string())
        }
    }

    /// Load the script text.
    pub async fn load(&self) -> Result<String, SessionError> {
        match self {
            ScriptSource::Inline(code) => Ok(code.clone()),
            ScriptSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                SessionError::ScriptUnavailable(format!("{}: {e}", path.display()))
            }),
        }
    }
}
