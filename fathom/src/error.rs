//! Error types for the fathom engine.
//!
//! Each subsystem has its own error enum; [`Error`] is the crate-level
//! umbrella returned by the blocking entry points. The streaming entry
//! point never surfaces errors to the caller directly — failures become
//! `error` events carrying the [`Error::kind`] discriminant.

use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type used by user-supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The crate-level error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid engine configuration (missing model, invalid schema).
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable input: neither prompt, messages, resume, nor thread id.
    #[error("input error: {0}")]
    Input(String),

    /// The model adapter failed after retries.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The run was cancelled via its abort token.
    #[error("run was cancelled")]
    Cancelled,

    /// A tool failed in a way that could not be reported in-band.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The checkpoint store failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The final text did not satisfy the configured output schema.
    #[error("structured output error: {0}")]
    Output(String),
}

impl Error {
    /// Create a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new input error.
    #[must_use]
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create a new structured-output error.
    #[must_use]
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output(message.into())
    }

    /// Stable discriminant string used by the `error` event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Input(_) => "input",
            Self::Model(_) => "model",
            Self::Cancelled => "cancelled",
            Self::Tool(_) => "tool",
            Self::Backend(_) => "backend",
            Self::Checkpoint(_) => "checkpoint",
            Self::Output(_) => "output",
        }
    }
}

/// Error from a model adapter.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The adapter failed to start a generation.
    #[error("model call failed: {0}")]
    Call(String),

    /// The adapter's chunk stream failed mid-generation.
    #[error("model stream failed: {0}")]
    Stream(String),
}

impl ModelError {
    /// Create a new call error.
    #[must_use]
    pub fn call(message: impl Into<String>) -> Self {
        Self::Call(message.into())
    }

    /// Create a new stream error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }
}

/// Error raised by tool lookup or execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// No tool with the requested name is registered.
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// Tool arguments failed to deserialize.
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// The tool's execute body failed.
    #[error("tool execution failed: {0}")]
    Execution(String),

    /// The tool requires a capability the backend does not provide.
    #[error("tool unsupported: {0}")]
    Unsupported(String),
}

impl ToolError {
    /// Create a new execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

impl From<BackendError> for ToolError {
    fn from(err: BackendError) -> Self {
        Self::Execution(err.to_string())
    }
}

/// Error raised by a storage backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The requested path does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path escapes the backend root or is otherwise malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A glob or regex pattern failed to parse.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// An edit target string was not found, or was ambiguous.
    #[error("edit failed for {path}: {message}")]
    EditConflict {
        /// Path of the file being edited.
        path: String,
        /// Why the edit could not be applied.
        message: String,
    },

    /// The backend does not implement the requested capability.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(String),

    /// Underlying I/O failure.
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by a checkpoint store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckpointError {
    /// The store could not persist or read a record.
    #[error("checkpoint store error: {0}")]
    Store(String),

    /// A checkpoint document failed to (de)serialize.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable() {
        assert_eq!(Error::config("x").kind(), "config");
        assert_eq!(Error::input("x").kind(), "input");
        assert_eq!(Error::from(ModelError::call("x")).kind(), "model");
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::output("x").kind(), "output");
    }

    #[test]
    fn display_includes_context() {
        let err = Error::from(ToolError::NotFound("grep".to_owned()));
        assert!(err.to_string().contains("grep"));

        let err = BackendError::EditConflict {
            path: "/a.txt".to_owned(),
            message: "string not found".to_owned(),
        };
        assert!(err.to_string().contains("/a.txt"));
    }

    #[test]
    fn backend_error_converts_to_tool_error() {
        let err: ToolError = BackendError::NotFound("/missing".to_owned()).into();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
