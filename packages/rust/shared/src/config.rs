//! Build configuration for frond.
//!
//! Project config lives at `<root>/frond.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FrondError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "frond.toml";

// ---------------------------------------------------------------------------
// Config structs (matching frond.toml schema)
// ---------------------------------------------------------------------------

/// Top-level build config, deserialized from TOML.
///
/// This is also the "global configuration" every processor factory receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Source directory, relative to the project root.
    #[serde(default = "default_source_path")]
    pub source_path: String,

    /// Output directory, relative to the project root.
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Extensions whose files are scanned for include directives.
    #[serde(default = "default_directive_file_types")]
    pub directive_file_types: Vec<String>,

    /// Files and directories starting with one of these are never built
    /// on their own (partials).
    #[serde(default = "default_ignore_prefixes")]
    pub ignore_prefixes: Vec<String>,

    /// Source extension → output extension.
    #[serde(default = "default_extension_map")]
    pub extension_map: BTreeMap<String, String>,

    /// Free-form values handed to processors.
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub vars: toml::Table,

    /// Processors applied to included files during directive expansion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocessors: Vec<ProcessorConfig>,

    /// Processors applied to every built file, keyed by extension.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postprocessors: Vec<ProcessorConfig>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            target_path: default_target_path(),
            directive_file_types: default_directive_file_types(),
            ignore_prefixes: default_ignore_prefixes(),
            extension_map: default_extension_map(),
            vars: toml::Table::new(),
            preprocessors: Vec::new(),
            postprocessors: Vec::new(),
        }
    }
}

fn default_source_path() -> String {
    "source".into()
}
fn default_target_path() -> String {
    "build".into()
}
fn default_directive_file_types() -> Vec<String> {
    ["js", "coffee", "ts", "css", "less", "scss", "sass", "html", "ejs", "md"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_ignore_prefixes() -> Vec<String> {
    vec!["_".into()]
}
fn default_extension_map() -> BTreeMap<String, String> {
    [
        ("less", "css"),
        ("scss", "css"),
        ("sass", "css"),
        ("coffee", "js"),
        ("ts", "js"),
        ("ejs", "html"),
        ("md", "html"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// `[[preprocessors]]` / `[[postprocessors]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Extension the processor is registered under (without the dot).
    pub extension: String,

    /// Output extension this processor produces, if it changes the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Regex the full filename must match for the processor to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// What the processor does.
    pub action: ProcessorAction,
}

/// Built-in processor behaviors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProcessorAction {
    /// Pass contents through unchanged.
    Identity,
    /// Prepend a line of text.
    Banner { text: String },
    /// Regex substitution over the whole file.
    Replace { pattern: String, replacement: String },
    /// Pipe contents through an external program (stdin → stdout).
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl ProcessorAction {
    /// Short name used for stage labels and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Banner { .. } => "banner",
            Self::Replace { .. } => "replace",
            Self::Command { .. } => "command",
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides & validation
// ---------------------------------------------------------------------------

/// Values supplied on the command line that win over `frond.toml`.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source_path: Option<String>,
    pub target_path: Option<String>,
}

impl BuildConfig {
    /// Apply CLI overrides on top of the loaded config.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(source) = &overrides.source_path {
            self.source_path = source.clone();
        }
        if let Some(target) = &overrides.target_path {
            self.target_path = target.clone();
        }
        self
    }

    /// Absolute source directory for a project root.
    pub fn source_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.source_path)
    }

    /// Absolute output directory for a project root.
    pub fn target_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.target_path)
    }

    /// Check extension names and processor patterns.
    pub fn validate(&self) -> Result<()> {
        for (from, to) in &self.extension_map {
            validate_extension(from)?;
            validate_extension(to)?;
        }

        for entry in self.preprocessors.iter().chain(&self.postprocessors) {
            validate_extension(&entry.extension)?;
            if let Some(target) = &entry.target {
                validate_extension(target)?;
            }
            if let Some(pattern) = &entry.pattern {
                Regex::new(pattern).map_err(|e| {
                    FrondError::config(format!(
                        "invalid pattern for .{} processor: {e}",
                        entry.extension
                    ))
                })?;
            }
            if let ProcessorAction::Replace { pattern, .. } = &entry.action {
                Regex::new(pattern).map_err(|e| {
                    FrondError::config(format!(
                        "invalid replace pattern for .{} processor: {e}",
                        entry.extension
                    ))
                })?;
            }
        }

        Ok(())
    }
}

fn validate_extension(ext: &str) -> Result<()> {
    if ext.is_empty() || ext.contains('.') || ext.contains('/') {
        return Err(FrondError::config(format!(
            "invalid extension '{ext}': expected a bare name such as 'css'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path to the config file for a project root.
pub fn config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load the project config. Returns defaults if the file does not exist.
pub fn load_config(root: &Path) -> Result<BuildConfig> {
    let path = config_file_path(root);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(BuildConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<BuildConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FrondError::io(path, e))?;

    let config: BuildConfig = toml::from_str(&content)
        .map_err(|e| FrondError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;

    tracing::debug!(
        ?path,
        preprocessors = config.preprocessors.len(),
        postprocessors = config.postprocessors.len(),
        "config loaded"
    );
    Ok(config)
}

/// Write a default `frond.toml` into `root`. Refuses to overwrite.
/// Returns the path to the created file.
pub fn init_config(root: &Path) -> Result<PathBuf> {
    let path = config_file_path(root);
    if path.exists() {
        return Err(FrondError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&BuildConfig::default())
        .map_err(|e| FrondError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FrondError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
