//! Error types for hutchns.
//!
//! Library crates use [`NamespaceError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all hutchns operations.
#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A type name or dotted type path could not be resolved.
    #[error("type {name} could not be loaded")]
    TypeNotFound { name: String },

    /// A scope source (module or object path) could not be resolved.
    #[error("error loading {name}: {reason}")]
    SourceNotFound { name: String, reason: String },

    /// Object database could not be parsed or assembled.
    #[error("load error: {message}")]
    Load { message: String },

    /// Logging has not been set up, or could not be set up.
    #[error("logging error: {0}")]
    Logging(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NamespaceError>;

impl NamespaceError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a type resolution error for the offending name.
    pub fn type_not_found(name: impl Into<String>) -> Self {
        Self::TypeNotFound { name: name.into() }
    }

    /// Create a scope source resolution error.
    pub fn source_not_found(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceNotFound {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an object database load error.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load {
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
}
