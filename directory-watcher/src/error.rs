//! Error types for the directory watcher.

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
///
/// Every variant except those produced while polling is returned synchronously
/// to the caller of the failing operation. Poll-cycle failures are logged by the
/// watch loop and never surface here.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// A required argument was absent (an empty path or an empty event list).
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// An argument was present but structurally wrong.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A subscriber filter did not compile.
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The operation is not allowed in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The poll loop needs a tokio runtime to run on.
    #[error("no tokio runtime available to run the poll loop")]
    NoRuntime,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory listing error.
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatcherError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}
