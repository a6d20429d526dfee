//! Core domain types shared by the build pipeline.

use std::path::{Path, PathBuf};

use crate::error::{FrondError, Result};

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A file object flowing through a pipeline stream.
///
/// `path` is absolute; `base` is the directory `path` is written relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Directory the asset's relative path is computed from.
    pub base: PathBuf,
    /// Absolute path of the asset.
    pub path: PathBuf,
    /// Raw file contents.
    pub contents: Vec<u8>,
}

impl Asset {
    /// Create an asset rooted at `base`.
    pub fn new(base: impl Into<PathBuf>, path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
            contents,
        }
    }

    /// Create an asset whose base is its own parent directory.
    pub fn from_path(path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        let path = path.into();
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            base,
            path,
            contents,
        }
    }

    /// File name component of `path` (empty if there is none).
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path relative to `base`; falls back to the basename when `path` is
    /// not under `base`.
    pub fn relative(&self) -> PathBuf {
        match self.path.strip_prefix(&self.base) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => PathBuf::from(self.basename()),
        }
    }

    /// Replace the basename, keeping the directory.
    pub fn set_basename(&mut self, filename: &str) {
        self.path.set_file_name(filename);
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.contents).map_err(|e| {
            FrondError::validation(format!("{} is not valid UTF-8: {e}", self.path.display()))
        })
    }

    /// Replace the contents with the given text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.contents = text.into().into_bytes();
    }
}
