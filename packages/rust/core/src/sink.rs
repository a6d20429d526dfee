//! Build-scoped, append-only collection of fatal stream errors.
//!
//! One [`ErrorSink`] is created per build and handed to every stream. After
//! the build, [`ErrorSink::errors`] decides success or failure.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Message recorded when a failure carries no message of its own.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred in the pipes";

/// A recorded stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamError {
    /// Human-readable message, prefixed with `[Stream Error]`.
    pub message: String,
    /// Source file whose pipeline failed.
    pub source_path: PathBuf,
    /// Name of the failing stage.
    pub stage: String,
}

impl StreamError {
    /// Build a record, normalizing a missing message.
    pub fn new(source_path: &Path, stage: &str, message: &str) -> Self {
        let message = if message.trim().is_empty() {
            UNKNOWN_ERROR_MESSAGE
        } else {
            message
        };
        Self {
            message: format!("[Stream Error] {message}"),
            source_path: source_path.to_path_buf(),
            stage: stage.to_string(),
        }
    }
}

/// Cheap-clone handle to the build's error list.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    errors: Arc<Mutex<Vec<StreamError>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error. Errors are never removed.
    pub fn record(&self, error: StreamError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    /// Snapshot of every recorded error, in recording order.
    pub fn errors(&self) -> Vec<StreamError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
