//! Per-file pipeline composition: source → preprocess → postprocess →
//! rewrite-extension → normalize-path → write.
//!
//! A [`JobRecord`] is threaded through [`PipelineStep`]s by value. Each step
//! returns a new record with its links attached to the record's stream, and
//! [`compose`] refuses steps that arrive out of order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use frond_shared::{Asset, FrondError, Result};

use crate::context::BuildContext;
use crate::directives::{DirectiveExpander, DirectiveOptions};
use crate::dispatch::stages_for_file;
use crate::extension::{registered_extension_map, rewrite_extensions};
use crate::processor::{ProcessorContext, Produced, stage_fn};
use crate::stream::{AssetStream, Source, apply_stages};

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// The fixed pipeline stages, in the only order they may be composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Source,
    Preprocess,
    Postprocess,
    RewriteExtension,
    NormalizePath,
    Write,
}

/// One source file's unit of work.
pub struct JobRecord {
    source_path: PathBuf,
    target_path: PathBuf,
    target_filename: Option<String>,
    stream: Option<AssetStream>,
    lineage: Vec<StageKind>,
}

impl JobRecord {
    /// Create a record for `source_path`, writing into `target_path`.
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            target_filename: None,
            stream: None,
            lineage: Vec::new(),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Output basename; `None` until rewrite-extension has run.
    pub fn target_filename(&self) -> Option<&str> {
        self.target_filename.as_deref()
    }

    /// Basename of the source file.
    pub fn source_filename(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stream(&self) -> Option<&AssetStream> {
        self.stream.as_ref()
    }

    /// Stages composed so far, in order.
    pub fn lineage(&self) -> &[StageKind] {
        &self.lineage
    }

    /// Take the attached stream, leaving the record's metadata behind.
    pub fn into_stream(self) -> Option<AssetStream> {
        self.stream
    }

    /// Attach a fresh stream. Fails if one is already attached.
    pub fn with_source(self, source: Source) -> Result<Self> {
        if self.stream.is_some() {
            return Err(FrondError::compose(format!(
                "{} already has a source",
                self.source_path.display()
            )));
        }
        Ok(Self {
            stream: Some(AssetStream::new(source)),
            ..self
        })
    }

    /// Extend the attached stream. Fails if there is no stream yet.
    pub fn with_stream(self, extend: impl FnOnce(AssetStream) -> AssetStream) -> Result<Self> {
        let Some(stream) = self.stream else {
            return Err(FrondError::compose(format!(
                "{} has no source stream attached",
                self.source_path.display()
            )));
        };
        Ok(Self {
            stream: Some(extend(stream)),
            ..self
        })
    }

    /// Set the output basename. It can only be set once.
    pub fn with_target_filename(self, filename: impl Into<String>) -> Result<Self> {
        if let Some(existing) = &self.target_filename {
            return Err(FrondError::compose(format!(
                "target filename for {} already set to '{existing}'",
                self.source_path.display()
            )));
        }
        Ok(Self {
            target_filename: Some(filename.into()),
            ..self
        })
    }

    /// Absolute output path, once the target filename is known.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.target_filename
            .as_ref()
            .map(|name| self.target_path.join(name))
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("source_path", &self.source_path)
            .field("target_path", &self.target_path)
            .field("target_filename", &self.target_filename)
            .field("links", &self.stream.as_ref().map(AssetStream::link_names))
            .field("lineage", &self.lineage)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

type StepFn<'a> = Box<dyn FnOnce(JobRecord) -> Result<JobRecord> + 'a>;

/// A named transformation of a job record.
pub struct PipelineStep<'a> {
    kind: StageKind,
    apply: StepFn<'a>,
}

impl<'a> PipelineStep<'a> {
    pub fn new(kind: StageKind, apply: impl FnOnce(JobRecord) -> Result<JobRecord> + 'a) -> Self {
        Self {
            kind,
            apply: Box::new(apply),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }
}

/// Apply `steps` to `job` strictly left to right.
///
/// A step whose kind does not come after the last composed kind is a
/// compose error, as is any error a step returns. Either aborts composition
/// of this job only.
pub fn compose(job: JobRecord, steps: Vec<PipelineStep<'_>>) -> Result<JobRecord> {
    steps.into_iter().try_fold(job, |job, step| {
        if let Some(&last) = job.lineage.last() {
            if step.kind <= last {
                return Err(FrondError::compose(format!(
                    "{:?} cannot follow {last:?} for {}",
                    step.kind,
                    job.source_path.display()
                )));
            }
        }

        let mut job = (step.apply)(job)?;
        job.lineage.push(step.kind);
        Ok(job)
    })
}

// ---------------------------------------------------------------------------
// Stage constructors
// ---------------------------------------------------------------------------

/// Attach `source` as the job's stream.
pub fn source(source: Source) -> PipelineStep<'static> {
    PipelineStep::new(StageKind::Source, move |job| job.with_source(source))
}

/// Attach a stream that reads the job's source file, relative to `base`.
pub fn source_file(base: impl Into<PathBuf>) -> PipelineStep<'static> {
    let base = base.into();
    PipelineStep::new(StageKind::Source, move |job| {
        let path = job.source_path.clone();
        job.with_source(Source::File { base, path })
    })
}

/// Attach include-directive expansion.
pub fn preprocess(ctx: &BuildContext) -> PipelineStep<'_> {
    PipelineStep::new(StageKind::Preprocess, move |job| {
        let expander = Arc::new(DirectiveExpander::new(DirectiveOptions::from_context(ctx)));
        job.with_stream(|stream| stream.pipe(expander))
    })
}

/// Attach the extension-dispatched post-processors, each guarded by the
/// build's error sink.
pub fn postprocess(ctx: &BuildContext) -> PipelineStep<'_> {
    PipelineStep::new(StageKind::Postprocess, move |job| {
        let filename = job.source_filename();
        let context = ProcessorContext {
            source_path: job.source_path.clone(),
            included_from: None,
        };
        let stages = stages_for_file(&filename, &ctx.postprocessors, &ctx.config, Some(&context))?;
        debug!(filename = %filename, stages = stages.len(), "post-processors attached");

        let source_path = job.source_path.clone();
        job.with_stream(|stream| apply_stages(stream, stages, &ctx.sink, &source_path))
    })
}

/// Compute the output filename and attach the renaming link.
pub fn rewrite_extension(ctx: &BuildContext) -> PipelineStep<'_> {
    PipelineStep::new(StageKind::RewriteExtension, move |job| {
        if !job.lineage.contains(&StageKind::Postprocess) {
            return Err(FrondError::compose(format!(
                "rewrite-extension requires post-processing to be attached first for {}",
                job.source_path.display()
            )));
        }

        let filename = job.source_filename();
        let registered = registered_extension_map(&filename, &ctx.extension_map, &ctx.stores());
        let target_filename = rewrite_extensions(&filename, &registered);

        info!(
            source = %job.source_path.display(),
            target = %job.target_path.join(&target_filename).display(),
            "queued"
        );

        let job = job.with_target_filename(target_filename.clone())?;
        job.with_stream(|stream| {
            stream.pipe(stage_fn("rewrite-extension", move |mut asset: Asset| {
                asset.set_basename(&target_filename);
                Ok(Produced::One(asset))
            }))
        })
    })
}

/// Re-root every asset at the job's target directory.
pub fn normalize_path() -> PipelineStep<'static> {
    PipelineStep::new(StageKind::NormalizePath, move |job| {
        let target_dir = job.target_path.clone();
        job.with_stream(|stream| {
            stream.pipe(stage_fn("normalize-path", move |mut asset: Asset| {
                let basename = asset.basename();
                asset.path = target_dir.join(basename);
                asset.base = target_dir.clone();
                Ok(Produced::One(asset))
            }))
        })
    })
}

/// Attach the writer that persists every asset under the target directory.
pub fn write() -> PipelineStep<'static> {
    PipelineStep::new(StageKind::Write, move |job| {
        let target_dir = job.target_path.clone();
        job.with_stream(|stream| stream.dest(target_dir))
    })
}

/// Target directory for a source file: the target root plus the source's
/// sub-directory below the source root.
pub fn target_dir_for(ctx: &BuildContext, source_path: &Path) -> PathBuf {
    let target_root = ctx.target_dir();
    let relative_dir = source_path
        .strip_prefix(ctx.source_dir())
        .ok()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    target_root.join(relative_dir)
}

/// Compose the full six-stage pipeline for one source file.
#[instrument(skip_all, fields(source = %source_path.display()))]
pub fn build_job(ctx: &BuildContext, source_path: &Path) -> Result<JobRecord> {
    let source_path = ctx.resolve(source_path);
    let job = JobRecord::new(&source_path, target_dir_for(ctx, &source_path));

    compose(
        job,
        vec![
            source_file(ctx.source_dir()),
            preprocess(ctx),
            postprocess(ctx),
            rewrite_extension(ctx),
            normalize_path(),
            write(),
        ],
    )
}

/// Compose the full pipeline for an in-memory asset.
pub fn build_memory_job(
    ctx: &BuildContext,
    asset: Asset,
    target_path: impl Into<PathBuf>,
) -> Result<JobRecord> {
    let target_path: PathBuf = target_path.into();
    let job = JobRecord::new(ctx.resolve(&asset.path), ctx.resolve(&target_path));

    compose(
        job,
        vec![
            source(Source::Memory(asset)),
            preprocess(ctx),
            postprocess(ctx),
            rewrite_extension(ctx),
            normalize_path(),
            write(),
        ],
    )
}
