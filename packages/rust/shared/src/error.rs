//! Error types for the govdata workspace.
//!
//! Library crates use [`GovDataError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all govdata operations.
#[derive(Debug, thiserror::Error)]
pub enum GovDataError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure talking to the remote data source.
    #[error("network error: {0}")]
    Network(String),

    /// Source payload matched none of the known wrapping conventions.
    #[error("unexpected payload shape: {message}")]
    Shape { message: String },

    /// Parsing error (scheme keys, JSON bodies, mapping files).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Source response body exceeded the accepted size.
    #[error("response too large: more than {max} bytes")]
    ResponseTooLarge { max: u64 },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GovDataError>;

impl GovDataError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a shape-mismatch error from any displayable message.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a fetch that failed with this error is worth another attempt.
    ///
    /// Only transport failures qualify; a well-formed but oddly shaped
    /// payload will not change on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
