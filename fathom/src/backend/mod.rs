//! Pluggable storage backends.
//!
//! A [`Backend`] provides the filesystem capability set the built-in
//! tools are written against: `ls_info`, `read`, `read_raw`,
//! `grep_raw`, `glob_info`, `write`, `edit`. A backend that can also
//! run shell commands additionally implements [`SandboxBackend`] and
//! advertises it through [`Backend::as_sandbox`].
//!
//! Shipped implementations:
//! - [`StateBackend`] — the default, a view over [`AgentState`] files.
//! - [`DiskBackend`] — rooted at a real directory; doubles as a local
//!   sandbox via `sh -c`.
//! - [`CompositeBackend`] — routes paths to mounted backends by
//!   longest matching prefix.

mod composite;
mod disk;
mod state;

pub use composite::CompositeBackend;
pub use disk::DiskBackend;
pub use state::StateBackend;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::BackendError;
use crate::state::{AgentState, FileData};

/// A type alias for `Result<T, BackendError>`.
pub type BackendResult<T> = Result<T, BackendError>;

/// Default timeout applied to sandbox command execution.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum combined stdout/stderr size returned from a sandbox command.
pub const MAX_EXECUTE_OUTPUT: usize = 1024 * 1024;

/// Default line cap for `read` when the caller does not limit it.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Metadata about a file or directory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path of the entry.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modification time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// Create a file entry.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size: None,
            modified_at: None,
        }
    }

    /// Create a directory entry.
    #[must_use]
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: None,
            modified_at: None,
        }
    }
}

/// A single grep match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// File containing the match.
    pub path: String,
    /// 1-based line number.
    pub line_number: usize,
    /// The matching line.
    pub line: String,
}

/// Outcome of a sandbox command execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code; `-1` for timeout or cancellation.
    pub exit_code: i32,
    /// Whether output was clipped at [`MAX_EXECUTE_OUTPUT`].
    pub truncated: bool,
}

/// The storage capability set consumed by the built-in tools.
#[async_trait]
pub trait Backend: Send + Sync {
    /// List entries at `path`.
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// Read a file as numbered lines, starting at `offset` (0-based),
    /// returning at most `limit` lines.
    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String>;

    /// Read a file's raw data.
    async fn read_raw(&self, path: &str) -> BackendResult<FileData>;

    /// Search file contents for a regular expression, optionally
    /// restricted to paths under `path`.
    async fn grep_raw(&self, pattern: &str, path: Option<&str>) -> BackendResult<Vec<GrepMatch>>;

    /// List files matching a glob pattern.
    async fn glob_info(&self, pattern: &str) -> BackendResult<Vec<FileInfo>>;

    /// Create or overwrite a file.
    async fn write(&self, path: &str, content: &str) -> BackendResult<()>;

    /// Replace `old` with `new` in a file. Unless `replace_all`, the
    /// match must be unique. Returns the number of replacements.
    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<usize>;

    /// Downcast to the sandbox extension, when supported.
    fn as_sandbox(&self) -> Option<&dyn SandboxBackend> {
        None
    }
}

/// Extension for backends that can execute shell commands.
#[async_trait]
pub trait SandboxBackend: Backend {
    /// Identifier of the sandbox, surfaced to tool descriptions.
    fn sandbox_id(&self) -> &str;

    /// Run a shell command, racing the token for cancellation.
    async fn execute(&self, command: &str, cancel: &CancelToken)
    -> BackendResult<ExecuteResult>;
}

/// Backend configuration: a shared instance, or a factory invoked per
/// invocation with that invocation's state.
#[derive(Clone)]
pub enum BackendChoice {
    /// Use this instance for every invocation.
    Instance(Arc<dyn Backend>),
    /// Build a backend from the invocation's state.
    Factory(Arc<dyn Fn(&AgentState) -> Arc<dyn Backend> + Send + Sync>),
}

impl BackendChoice {
    /// Resolve the backend for one invocation.
    #[must_use]
    pub fn resolve(&self, state: &AgentState) -> Arc<dyn Backend> {
        match self {
            Self::Instance(backend) => Arc::clone(backend),
            Self::Factory(factory) => factory(state),
        }
    }
}

impl Default for BackendChoice {
    fn default() -> Self {
        Self::Factory(Arc::new(|state| {
            Arc::new(StateBackend::new(state.clone())) as Arc<dyn Backend>
        }))
    }
}

impl fmt::Debug for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("BackendChoice::Instance(..)"),
            Self::Factory(_) => f.write_str("BackendChoice::Factory(..)"),
        }
    }
}

/// Normalize a virtual path to a rooted, `/`-separated form.
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." {
        return "/".to_owned();
    }
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(trimmed);
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Render file lines as numbered text, `cat -n` style.
pub(crate) fn render_numbered(lines: &[String], offset: usize, limit: usize) -> String {
    lines
        .iter()
        .skip(offset)
        .take(limit)
        .enumerate()
        .map(|(i, line)| format!("{:>6}\t{line}", offset + i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply a string replacement with uniqueness rules shared by every
/// backend's `edit`.
pub(crate) fn apply_edit(
    path: &str,
    text: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> BackendResult<(String, usize)> {
    if old.is_empty() {
        return Err(BackendError::EditConflict {
            path: path.to_owned(),
            message: "old string must not be empty".to_owned(),
        });
    }
    let occurrences = text.matches(old).count();
    if occurrences == 0 {
        return Err(BackendError::EditConflict {
            path: path.to_owned(),
            message: "old string not found".to_owned(),
        });
    }
    if occurrences > 1 && !replace_all {
        return Err(BackendError::EditConflict {
            path: path.to_owned(),
            message: format!("old string occurs {occurrences} times; pass replace_all"),
        });
    }
    if replace_all {
        Ok((text.replace(old, new), occurrences))
    } else {
        Ok((text.replacen(old, new, 1), 1))
    }
}
