//! Stage trait, processor descriptors, and the extension-keyed processor store.
//!
//! A [`Processor`] pairs an extension with a [`ProcessorFactory`]. When a file
//! with that extension is built, the factory is asked for zero, one, or many
//! [`Stage`]s, which are then chained into the file's stream.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use frond_shared::{Asset, BuildConfig, Result};

use crate::extension::ExtensionMap;

// ---------------------------------------------------------------------------
// Produced
// ---------------------------------------------------------------------------

/// Tagged "zero, one, or many" result used by factories and stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Produced<T> {
    /// Nothing was produced.
    None,
    /// Exactly one value.
    One(T),
    /// Any number of values, in order.
    Many(Vec<T>),
}

impl<T> Produced<T> {
    /// Flatten into a list, preserving order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::None => Vec::new(),
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }

    /// Number of produced values.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    /// Whether nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<Option<T>> for Produced<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Self::One)
    }
}

impl<T> From<Vec<T>> for Produced<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A single transformation step applied to every asset flowing through a
/// stream. One asset in; zero, one, or many out.
pub trait Stage: Send + Sync {
    /// Human-readable name for tracing and error records.
    fn name(&self) -> &str;

    /// Transform one asset.
    fn apply(&self, asset: Asset) -> Result<Produced<Asset>>;
}

/// Shared handle to a stage.
pub type StageRef = Arc<dyn Stage>;

/// A stage backed by a closure.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> Stage for FnStage<F>
where
    F: Fn(Asset) -> Result<Produced<Asset>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, asset: Asset) -> Result<Produced<Asset>> {
        (self.f)(asset)
    }
}

/// Wrap a closure as a named stage.
pub fn stage_fn<F>(name: impl Into<String>, f: F) -> StageRef
where
    F: Fn(Asset) -> Result<Produced<Asset>> + Send + Sync + 'static,
{
    Arc::new(FnStage {
        name: name.into(),
        f,
    })
}

// ---------------------------------------------------------------------------
// Factories & descriptors
// ---------------------------------------------------------------------------

/// Per-invocation context handed to processor factories.
#[derive(Debug, Clone, Default)]
pub struct ProcessorContext {
    /// File the stages are being built for.
    pub source_path: PathBuf,
    /// Set when the file is being pulled in by an include directive.
    pub included_from: Option<PathBuf>,
}

/// Builds the stages a processor contributes to one file.
pub trait ProcessorFactory: Send + Sync {
    /// Called once per matching file per build.
    fn build(
        &self,
        global: &BuildConfig,
        context: Option<&ProcessorContext>,
    ) -> Result<Produced<StageRef>>;
}

struct FnFactory<F>(F);

impl<F> ProcessorFactory for FnFactory<F>
where
    F: Fn(&BuildConfig, Option<&ProcessorContext>) -> Result<Produced<StageRef>> + Send + Sync,
{
    fn build(
        &self,
        global: &BuildConfig,
        context: Option<&ProcessorContext>,
    ) -> Result<Produced<StageRef>> {
        (self.0)(global, context)
    }
}

/// A registered `{extension, factory}` pair.
#[derive(Clone)]
pub struct Processor {
    extension: String,
    name: String,
    pattern: Option<Regex>,
    target_extension: Option<String>,
    factory: Arc<dyn ProcessorFactory>,
}

impl Processor {
    /// Register a closure factory under `extension`.
    pub fn new<F>(extension: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&BuildConfig, Option<&ProcessorContext>) -> Result<Produced<StageRef>>
            + Send
            + Sync
            + 'static,
    {
        Self::from_factory(extension, Arc::new(FnFactory(factory)))
    }

    /// Register an existing factory under `extension`.
    pub fn from_factory(extension: impl Into<String>, factory: Arc<dyn ProcessorFactory>) -> Self {
        let extension = extension.into();
        Self {
            name: extension.clone(),
            extension,
            pattern: None,
            target_extension: None,
            factory,
        }
    }

    /// Only apply to filenames matching `pattern`.
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Declare the extension this processor's output has.
    pub fn with_target(mut self, extension: impl Into<String>) -> Self {
        self.target_extension = Some(extension.into());
        self
    }

    /// Override the display name (defaults to the extension).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_extension(&self) -> Option<&str> {
        self.target_extension.as_deref()
    }

    /// Whether this processor applies to `filename`.
    pub fn matches(&self, filename: &str) -> bool {
        self.pattern.as_ref().is_none_or(|p| p.is_match(filename))
    }

    /// Ask the factory for this file's stages.
    pub fn build(
        &self,
        global: &BuildConfig,
        context: Option<&ProcessorContext>,
    ) -> Result<Produced<StageRef>> {
        self.factory.build(global, context)
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("extension", &self.extension)
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("target_extension", &self.target_extension)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Registry of processors keyed by extension, in registration order.
///
/// Read-only while a build runs; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStore {
    processors: HashMap<String, Vec<Processor>>,
}

impl ProcessorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor under its extension.
    pub fn register(&mut self, processor: Processor) {
        self.processors
            .entry(processor.extension.clone())
            .or_default()
            .push(processor);
    }

    /// Processors for `extension` whose pattern accepts `filename`.
    pub fn get(&self, extension: &str, filename: &str) -> Vec<&Processor> {
        self.processors
            .get(extension)
            .map(|list| list.iter().filter(|p| p.matches(filename)).collect())
            .unwrap_or_default()
    }

    /// Whether anything is registered under `extension`, ignoring patterns.
    pub fn has(&self, extension: &str) -> bool {
        self.processors
            .get(extension)
            .is_some_and(|list| !list.is_empty())
    }

    /// Target extensions declared by registered processors.
    pub fn declared_targets(&self) -> ExtensionMap {
        self.processors
            .values()
            .flatten()
            .filter_map(|p| {
                p.target_extension
                    .as_ref()
                    .map(|target| (p.extension.clone(), target.clone()))
            })
            .collect()
    }

    /// Total number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
