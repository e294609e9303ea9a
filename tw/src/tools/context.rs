//! ToolContext - execution context for direct tools

use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;

/// Execution context handed to every direct tool
///
/// Scopes relative paths to a root directory and carries the session's
/// cancellation token. Tools are not sandboxed beyond their own behaviour.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Base directory for relative paths
    pub root: PathBuf,

    /// Owning session identifier
    pub session_id: String,

    /// Cooperative cancellation signal
    pub cancel: CancelToken,
}

impl ToolContext {
    pub fn new(root: PathBuf, session_id: impl Into<String>) -> Self {
        Self {
            root,
            session_id: session_id.into(),
            cancel: CancelToken::new(),
        }
    }

    /// Attach a shared cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve a possibly relative path against the root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }
}
