//! Shared types, error model, and configuration for frond.
//!
//! This crate is the foundation depended on by the other frond crates.
//! It provides:
//! - [`FrondError`]: the unified error type
//! - [`Asset`]: the file object flowing through build pipelines
//! - Configuration ([`BuildConfig`], [`ProcessorConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BuildConfig, CONFIG_FILE_NAME, CliOverrides, ProcessorAction, ProcessorConfig,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{FrondError, Result};
pub use types::Asset;
