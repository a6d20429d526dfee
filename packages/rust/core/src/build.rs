//! Build orchestration: discover sources → compose jobs → aggregate → report.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use frond_shared::{FrondError, Result};

use crate::aggregate::{BuildReport, JobReport, JobStatus, aggregate};
use crate::context::BuildContext;
use crate::directives::{DirectiveExpander, DirectiveOptions};
use crate::dispatch::stages_for_file;
use crate::extension::{ExtensionMap, extension_chain, registered_extension_map, rewrite_extensions};
use crate::pipeline::build_job;
use crate::processor::ProcessorStore;
use crate::sink::StreamError;

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a new phase starts.
    fn phase(&self, name: &str);
    /// Called after each job is composed (or fails to compose).
    fn job_composed(&self, source: &Path, current: usize, total: usize);
    /// Called once the build report is ready.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn job_composed(&self, _source: &Path, _current: usize, _total: usize) {}
    fn done(&self, _report: &BuildReport) {}
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

/// Every buildable file under the source directory, sorted.
///
/// Files and directories whose name starts with an ignore prefix are
/// skipped along with everything below them.
pub fn discover_sources(ctx: &BuildContext) -> Result<Vec<PathBuf>> {
    let source_dir = ctx.source_dir();
    if !source_dir.is_dir() {
        return Err(FrondError::config(format!(
            "source directory {} does not exist",
            source_dir.display()
        )));
    }

    let mut found = Vec::new();
    let mut pending = vec![source_dir];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| FrondError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FrondError::io(&dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_ignored(&name, &ctx.config.ignore_prefixes) {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| FrondError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_ignored(name: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|p| !p.is_empty() && name.starts_with(p.as_str()))
}

/// Resolve explicitly named files against the project root.
pub fn sources_from_paths(ctx: &BuildContext, files: &[PathBuf]) -> Vec<PathBuf> {
    files.iter().map(|f| ctx.resolve(f)).collect()
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Build every discovered source file.
pub async fn build(ctx: &BuildContext, progress: &dyn ProgressReporter) -> Result<BuildReport> {
    progress.phase("Discovering sources");
    let sources = discover_sources(ctx)?;
    build_all(ctx, sources, progress).await
}

/// Compose one job per source, run them all, and report.
///
/// A file whose job cannot be composed is recorded in the sink under the
/// `compose` stage and skipped; its siblings still build.
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn build_all(
    ctx: &BuildContext,
    sources: Vec<PathBuf>,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    progress.phase("Composing jobs");
    let total = sources.len();
    let mut jobs = Vec::with_capacity(total);
    let mut rejected = Vec::new();

    for (i, source_path) in sources.into_iter().enumerate() {
        match build_job(ctx, &source_path) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                warn!(source = %source_path.display(), error = %e, "job composition failed, skipping file");
                let record = StreamError::new(&source_path, "compose", &e.to_string());
                rejected.push(JobReport {
                    source_path: source_path.clone(),
                    output_path: None,
                    outputs: Vec::new(),
                    status: JobStatus::Failed {
                        stage: "compose".into(),
                        message: record.message.clone(),
                    },
                });
                ctx.sink.record(record);
            }
        }
        progress.job_composed(&source_path, i + 1, total);
    }

    progress.phase("Running streams");
    let mut report = aggregate(jobs)?.run(&ctx.sink).await;
    report.jobs.extend(rejected);

    info!(
        jobs = report.jobs.len(),
        completed = report.completed(),
        errors = report.errors.len(),
        "build finished"
    );

    progress.done(&report);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// What the build would do with one file, without reading or writing it.
#[derive(Debug, Clone, Serialize)]
pub struct FileInspection {
    pub filename: String,
    pub extension_chain: Vec<String>,
    /// Pre-processors registered for the chain (applied to includes).
    pub preprocessors: Vec<String>,
    pub postprocessors: Vec<String>,
    /// Post-processing stages in application order.
    pub stages: Vec<String>,
    pub registered_extension_map: ExtensionMap,
    pub target_filename: String,
    pub directive_eligible: bool,
}

/// Inspect how `filename` would be processed.
pub fn inspect_file(ctx: &BuildContext, filename: &str) -> Result<FileInspection> {
    let basename = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    let chain = extension_chain(&basename);
    let registered = registered_extension_map(&basename, &ctx.extension_map, &ctx.stores());
    let stages = stages_for_file(&basename, &ctx.postprocessors, &ctx.config, None)?;
    let expander = DirectiveExpander::new(DirectiveOptions::from_context(ctx));

    Ok(FileInspection {
        preprocessors: processor_names(&ctx.preprocessors, &chain, &basename),
        postprocessors: processor_names(&ctx.postprocessors, &chain, &basename),
        stages: stages.iter().map(|s| s.name().to_string()).collect(),
        target_filename: rewrite_extensions(&basename, &registered),
        directive_eligible: expander.is_eligible(&basename),
        registered_extension_map: registered,
        extension_chain: chain,
        filename: basename,
    })
}

fn processor_names(store: &ProcessorStore, chain: &[String], filename: &str) -> Vec<String> {
    chain
        .iter()
        .flat_map(|ext| store.get(ext, filename))
        .map(|p| p.name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use frond_shared::{BuildConfig, ProcessorAction, ProcessorConfig};

    use crate::processors::stores_from_config;

    struct Project {
        root: PathBuf,
    }

    impl Project {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("frond-build-{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(root.join("source")).unwrap();
            Self { root }
        }

        fn file(&self, relative: &str, contents: &str) -> PathBuf {
            let path = self.root.join("source").join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
            path
        }

        fn context(&self, config: BuildConfig) -> BuildContext {
            let (pre, post) = stores_from_config(&config).unwrap();
            BuildContext::new(&self.root, config, pre, post)
        }
    }

    impl Drop for Project {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn processor(extension: &str, target: Option<&str>, action: ProcessorAction) -> ProcessorConfig {
        ProcessorConfig {
            extension: extension.into(),
            target: target.map(str::to_string),
            pattern: None,
            action,
        }
    }

    fn dist_config() -> BuildConfig {
        BuildConfig {
            target_path: "dist".into(),
            ..BuildConfig::default()
        }
    }

    #[test]
    fn discovery_skips_partials_and_sorts() {
        let project = Project::new();
        project.file("b.js", "");
        project.file("a.js", "");
        project.file("_header.html", "");
        project.file("css/site.scss", "");
        project.file("_vendor/lib.js", "");

        let ctx = project.context(BuildConfig::default());
        let found = discover_sources(&ctx).unwrap();
        let source = project.root.join("source");
        assert_eq!(
            found,
            vec![source.join("a.js"), source.join("b.js"), source.join("css/site.scss")]
        );
    }

    #[test]
    fn missing_source_dir_is_a_config_error() {
        let project = Project::new();
        let config = BuildConfig {
            source_path: "nope".into(),
            ..BuildConfig::default()
        };
        let err = discover_sources(&project.context(config)).unwrap_err();
        assert!(matches!(err, FrondError::Config { .. }));
    }

    #[tokio::test]
    async fn scss_identity_builds_css() {
        let project = Project::new();
        project.file("main.scss", "a { color: red; }\n");

        let mut config = dist_config();
        config
            .postprocessors
            .push(processor("scss", Some("css"), ProcessorAction::Identity));
        let ctx = project.context(config);

        let report = build(&ctx, &SilentProgress).await.unwrap();

        assert!(report.is_success());
        assert_eq!(
            std::fs::read_to_string(project.root.join("dist/main.css")).unwrap(),
            "a { color: red; }\n"
        );
        assert_eq!(report.jobs[0].output_path, Some(project.root.join("dist/main.css")));
    }

    #[tokio::test]
    async fn one_failing_file_does_not_stop_the_build() {
        let project = Project::new();
        let bad = project.file("bad.js", "x");
        project.file("good.css", "y");

        let mut config = dist_config();
        config.postprocessors.push(processor(
            "js",
            None,
            ProcessorAction::Command {
                program: "frond-definitely-not-installed".into(),
                args: vec![],
            },
        ));
        let ctx = project.context(config);

        let report = build(&ctx, &SilentProgress).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].source_path, bad);
        assert_eq!(report.errors[0].stage, "js:command");
        assert!(report.errors[0].message.starts_with("[Stream Error] "));
        assert_eq!(
            std::fs::read_to_string(project.root.join("dist/good.css")).unwrap(),
            "y"
        );
        assert!(!project.root.join("dist/bad.js").exists());
    }

    #[tokio::test]
    async fn compose_failures_are_recorded_and_skipped() {
        let project = Project::new();
        let good = project.file("good.css", "y");
        project.file("bad.js", "x");

        let mut post = ProcessorStore::new();
        post.register(crate::processor::Processor::new("js", |_, _| {
            Err(FrondError::processor("js", "compiler not configured"))
        }));
        let ctx = BuildContext::new(&project.root, dist_config(), ProcessorStore::new(), post);

        let report = build_all(&ctx, vec![project.root.join("source/bad.js"), good], &SilentProgress)
            .await
            .unwrap();

        assert_eq!(ctx.sink.len(), 1);
        assert_eq!(ctx.sink.errors()[0].stage, "compose");
        assert_eq!(report.completed(), 1);
        assert!(matches!(
            &report.jobs[1].status,
            JobStatus::Failed { stage, .. } if stage == "compose"
        ));
    }

    #[tokio::test]
    async fn explicit_files_resolve_against_root() {
        let project = Project::new();
        project.file("only.txt", "z");
        project.file("other.txt", "w");

        let ctx = project.context(dist_config());
        let sources = sources_from_paths(&ctx, &[PathBuf::from("source/only.txt")]);
        let report = build_all(&ctx, sources, &SilentProgress).await.unwrap();

        assert_eq!(report.jobs.len(), 1);
        assert!(project.root.join("dist/only.txt").exists());
        assert!(!project.root.join("dist/other.txt").exists());
    }

    #[test]
    fn inspection_reports_dispatch_plan() {
        let mut config = BuildConfig::default();
        config
            .postprocessors
            .push(processor("coffee", Some("js"), ProcessorAction::Identity));
        config.postprocessors.push(processor(
            "js",
            None,
            ProcessorAction::Banner { text: "// x".into() },
        ));
        let (pre, post) = stores_from_config(&config).unwrap();
        let ctx = BuildContext::new("/project", config, pre, post);

        let inspection = inspect_file(&ctx, "lib/app.coffee.js").unwrap();

        assert_eq!(inspection.filename, "app.coffee.js");
        assert_eq!(inspection.extension_chain, vec!["js", "coffee"]);
        assert_eq!(inspection.postprocessors, vec!["js:banner", "coffee:identity"]);
        assert_eq!(inspection.stages, vec!["js:banner", "coffee:identity"]);
        assert!(inspection.preprocessors.is_empty());
        assert_eq!(inspection.target_filename, "app.js.js");
        assert!(inspection.directive_eligible);
    }
}
