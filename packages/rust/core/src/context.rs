//! Everything a build shares across its jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use frond_shared::BuildConfig;

use crate::extension::ExtensionMap;
use crate::processor::ProcessorStore;
use crate::sink::ErrorSink;

/// Read-only build inputs plus the build's error sink.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project root; relative config paths resolve against it.
    pub root_path: PathBuf,
    /// Global configuration handed to every processor factory.
    pub config: Arc<BuildConfig>,
    /// Processors applied to included files during directive expansion.
    pub preprocessors: Arc<ProcessorStore>,
    /// Processors applied to every built file.
    pub postprocessors: Arc<ProcessorStore>,
    /// Config extension map merged with processor-declared targets.
    pub extension_map: ExtensionMap,
    /// Collects runtime failures for the whole build.
    pub sink: ErrorSink,
}

impl BuildContext {
    /// Create a context with a fresh error sink.
    ///
    /// A relative `root_path` is made absolute against the working directory.
    ///
    /// Targets declared by processors take precedence over `[extension_map]`.
    pub fn new(
        root_path: impl Into<PathBuf>,
        config: BuildConfig,
        preprocessors: ProcessorStore,
        postprocessors: ProcessorStore,
    ) -> Self {
        let root_path = root_path.into();
        let root_path = std::path::absolute(&root_path).unwrap_or(root_path);

        let mut extension_map = config.extension_map.clone();
        extension_map.extend(preprocessors.declared_targets());
        extension_map.extend(postprocessors.declared_targets());

        Self {
            root_path,
            config: Arc::new(config),
            preprocessors: Arc::new(preprocessors),
            postprocessors: Arc::new(postprocessors),
            extension_map,
            sink: ErrorSink::new(),
        }
    }

    /// Absolute source directory.
    pub fn source_dir(&self) -> PathBuf {
        self.config.source_dir(&self.root_path)
    }

    /// Absolute output directory.
    pub fn target_dir(&self) -> PathBuf {
        self.config.target_dir(&self.root_path)
    }

    /// Resolve a possibly-relative path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root_path.join(path)
    }

    /// Both processor stores, for "is this extension registered anywhere".
    pub fn stores(&self) -> [&ProcessorStore; 2] {
        [&self.preprocessors, &self.postprocessors]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Processor, Produced};

    #[test]
    fn declared_targets_override_config_map() {
        let mut post = ProcessorStore::new();
        post.register(Processor::new("md", |_, _| Ok(Produced::None)).with_target("txt"));

        let ctx = BuildContext::new("/project", BuildConfig::default(), ProcessorStore::new(), post);
        assert_eq!(ctx.extension_map.get("md").map(String::as_str), Some("txt"));
        assert_eq!(ctx.extension_map.get("scss").map(String::as_str), Some("css"));
    }

    #[test]
    fn relative_root_becomes_absolute() {
        let ctx = BuildContext::new(".", BuildConfig::default(), ProcessorStore::new(), ProcessorStore::new());
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(ctx.root_path, cwd);
        assert_eq!(ctx.target_dir(), cwd.join("build"));
    }

    #[test]
    fn directories_resolve_against_root() {
        let ctx = BuildContext::new(
            "/project",
            BuildConfig::default(),
            ProcessorStore::new(),
            ProcessorStore::new(),
        );
        assert_eq!(ctx.source_dir(), PathBuf::from("/project/source"));
        assert_eq!(ctx.target_dir(), PathBuf::from("/project/build"));
        assert_eq!(ctx.resolve(Path::new("/abs/dist")), PathBuf::from("/abs/dist"));
    }
}
