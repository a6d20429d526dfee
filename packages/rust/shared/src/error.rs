//! Error types for frond.
//!
//! Library crates use [`FrondError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all frond operations.
#[derive(Debug, thiserror::Error)]
pub enum FrondError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A transform stage failed while processing an asset.
    ///
    /// `message` is kept verbatim (it may be empty) so the error sink can
    /// decide how to normalize it.
    #[error("{message}")]
    Stage { stage: String, message: String },

    /// Directive expansion failed (missing include, cycle, bad encoding).
    #[error("directive error in {path:?}: {message}")]
    Directive { path: PathBuf, message: String },

    /// A job record could not be composed.
    #[error("compose error: {message}")]
    Compose { message: String },

    /// A processor factory failed to produce its stages.
    #[error("processor error for .{extension}: {message}")]
    Processor { extension: String, message: String },

    /// Data validation error (bad pattern, invalid filename, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FrondError>;

impl FrondError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a stage error attributed to the named stage.
    pub fn stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Create a directive error for the file being expanded.
    pub fn directive(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Directive {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a compose error from any displayable message.
    pub fn compose(msg: impl Into<String>) -> Self {
        Self::Compose {
            message: msg.into(),
        }
    }

    /// Create a processor error for the given extension.
    pub fn processor(extension: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Processor {
            extension: extension.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
