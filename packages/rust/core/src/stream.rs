//! Cold asset streams: links are attached first, data flows only on `run`.
//!
//! An [`AssetStream`] is built by attaching links (stages, a destination) to a
//! source. Nothing is read or transformed until [`AssetStream::run`] consumes
//! the stream, so every link is in place before the first asset moves.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use frond_shared::{Asset, FrondError, Result};

use crate::processor::{Produced, StageRef};
use crate::sink::{ErrorSink, StreamError};

// ---------------------------------------------------------------------------
// Source & links
// ---------------------------------------------------------------------------

/// Where a stream's assets come from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Read one file from disk when the stream runs.
    File { base: PathBuf, path: PathBuf },
    /// Emit one in-memory asset.
    Memory(Asset),
    /// Emit nothing.
    Empty,
}

impl Source {
    async fn read(self) -> Result<Vec<Asset>> {
        match self {
            Self::File { base, path } => {
                let contents = tokio::fs::read(&path)
                    .await
                    .map_err(|e| FrondError::io(&path, e))?;
                Ok(vec![Asset::new(base, path, contents)])
            }
            Self::Memory(asset) => Ok(vec![asset]),
            Self::Empty => Ok(Vec::new()),
        }
    }
}

enum Op {
    Map(StageRef),
    Dest(PathBuf),
}

/// Routes a link's runtime failure into the sink instead of the caller.
struct Guard {
    sink: ErrorSink,
    source_path: PathBuf,
}

struct Link {
    op: Op,
    guard: Option<Guard>,
}

impl Link {
    fn name(&self) -> &str {
        match &self.op {
            Op::Map(stage) => stage.name(),
            Op::Dest(_) => "dest",
        }
    }
}

// ---------------------------------------------------------------------------
// AssetStream
// ---------------------------------------------------------------------------

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every link ran; these assets came out of the last one.
    Finished(Vec<Asset>),
    /// A guarded link failed; its error is in the sink and nothing
    /// downstream of it ran.
    Terminated { stage: String },
}

/// A lazily-run, ordered chain of links over a source.
pub struct AssetStream {
    source: Source,
    links: Vec<Link>,
}

impl AssetStream {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            links: Vec::new(),
        }
    }

    /// Stream that reads `path` from disk, relative to `base`.
    pub fn from_file(base: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self::new(Source::File {
            base: base.into(),
            path: path.into(),
        })
    }

    /// Stream that yields exactly one in-memory asset.
    pub fn from_asset(asset: Asset) -> Self {
        Self::new(Source::Memory(asset))
    }

    /// Attach a stage whose errors propagate out of [`run`](Self::run).
    pub fn pipe(mut self, stage: StageRef) -> Self {
        self.links.push(Link {
            op: Op::Map(stage),
            guard: None,
        });
        self
    }

    /// Attach a stage whose errors are recorded in `sink` and end the stream.
    pub fn pipe_guarded(mut self, stage: StageRef, sink: &ErrorSink, source_path: &Path) -> Self {
        self.links.push(Link {
            op: Op::Map(stage),
            guard: Some(Guard {
                sink: sink.clone(),
                source_path: source_path.to_path_buf(),
            }),
        });
        self
    }

    /// Attach the terminal writer: persist every asset under `dir`.
    pub fn dest(mut self, dir: impl Into<PathBuf>) -> Self {
        self.links.push(Link {
            op: Op::Dest(dir.into()),
            guard: None,
        });
        self
    }

    /// Names of the attached links, in order.
    pub fn link_names(&self) -> Vec<String> {
        self.links.iter().map(|l| l.name().to_string()).collect()
    }

    /// Consume the stream and push its assets through every link.
    ///
    /// Yields to the scheduler between links, and stages run on the blocking
    /// pool so a slow stage never stalls sibling streams. Guarded failures end the
    /// stream with [`StreamOutcome::Terminated`]; unguarded ones are returned.
    pub async fn run(self) -> Result<StreamOutcome> {
        let mut batch = self.source.read().await?;

        for link in &self.links {
            tokio::task::yield_now().await;

            let mut next = Vec::with_capacity(batch.len());
            for asset in batch {
                let result = match &link.op {
                    Op::Map(stage) => apply_blocking(stage, asset).await,
                    Op::Dest(dir) => write_asset(dir, asset).await.map(|a| vec![a]),
                };

                match result {
                    Ok(out) => next.extend(out),
                    Err(err) => match &link.guard {
                        Some(guard) => {
                            let record =
                                StreamError::new(&guard.source_path, link.name(), &error_message(&err));
                            warn!(
                                source = %guard.source_path.display(),
                                stage = link.name(),
                                message = %record.message,
                                "stage failed, ending stream"
                            );
                            guard.sink.record(record);
                            return Ok(StreamOutcome::Terminated {
                                stage: link.name().to_string(),
                            });
                        }
                        None => return Err(err),
                    },
                }
            }

            debug!(link = link.name(), assets = next.len(), "link complete");
            batch = next;
        }

        Ok(StreamOutcome::Finished(batch))
    }
}

/// Attach `stages` in order, each guarded by `sink`.
pub fn apply_stages(
    stream: AssetStream,
    stages: Vec<StageRef>,
    sink: &ErrorSink,
    source_path: &Path,
) -> AssetStream {
    stages
        .into_iter()
        .fold(stream, |stream, stage| stream.pipe_guarded(stage, sink, source_path))
}

async fn apply_blocking(stage: &StageRef, asset: Asset) -> Result<Vec<Asset>> {
    let task = Arc::clone(stage);
    tokio::task::spawn_blocking(move || task.apply(asset).map(Produced::into_vec))
        .await
        .map_err(|e| FrondError::stage(stage.name(), format!("stage task failed: {e}")))?
}

/// The message a failure should be recorded with (possibly empty).
pub(crate) fn error_message(err: &FrondError) -> String {
    match err {
        FrondError::Stage { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

async fn write_asset(dir: &Path, mut asset: Asset) -> Result<Asset> {
    let target = dir.join(asset.relative());
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FrondError::io(parent, e))?;
    }
    tokio::fs::write(&target, &asset.contents)
        .await
        .map_err(|e| FrondError::io(&target, e))?;

    debug!(path = %target.display(), bytes = asset.contents.len(), "wrote asset");
    asset.base = dir.to_path_buf();
    asset.path = target;
    Ok(asset)
}
