//! Merge per-file streams into one build and wait for all of them.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use frond_shared::{Asset, FrondError, Result};

use crate::pipeline::JobRecord;
use crate::sink::{ErrorSink, StreamError};
use crate::stream::{AssetStream, StreamOutcome, error_message};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// How one job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum JobStatus {
    /// Every link ran.
    Completed,
    /// A guarded stage failed; downstream links were skipped.
    Terminated { stage: String },
    /// An unguarded link failed or the job never started.
    Failed { stage: String, message: String },
}

/// Outcome of one source file.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub source_path: PathBuf,
    /// Expected output path (if the rewrite stage was composed).
    pub output_path: Option<PathBuf>,
    /// Paths of the assets that left the stream.
    pub outputs: Vec<PathBuf>,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Result of running an [`Aggregate`].
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub jobs: Vec<JobReport>,
    /// Snapshot of the error sink taken when every stream had finished.
    pub errors: Vec<StreamError>,
    /// Every asset that left a stream, job by job.
    #[serde(skip)]
    pub assets: Vec<Asset>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BuildReport {
    /// A build succeeds when nothing was recorded in the sink.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of jobs whose streams ran to the end.
    pub fn completed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

struct Entry {
    source_path: PathBuf,
    output_path: Option<PathBuf>,
    stream: AssetStream,
}

/// A set of cold per-file streams that run together.
pub struct Aggregate {
    entries: Vec<Entry>,
}

/// Collect the streams of `jobs`. Every job must have a stream attached.
pub fn aggregate(jobs: Vec<JobRecord>) -> Result<Aggregate> {
    let entries = jobs
        .into_iter()
        .map(|job| {
            let source_path = job.source_path().to_path_buf();
            let output_path = job.output_path();
            let stream = job.into_stream().ok_or_else(|| {
                FrondError::compose(format!(
                    "{} has no stream to aggregate",
                    source_path.display()
                ))
            })?;
            Ok(Entry {
                source_path,
                output_path,
                stream,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Aggregate { entries })
}

impl Aggregate {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start every stream and wait until all of them have finished.
    ///
    /// Failures never stop the aggregate: guarded ones are already in the
    /// sink, unguarded ones and panics are recorded here.
    pub async fn run(self, sink: &ErrorSink) -> BuildReport {
        let start = Instant::now();

        let mut handles = Vec::with_capacity(self.entries.len());
        let mut metas = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            handles.push(tokio::spawn(entry.stream.run()));
            metas.push((entry.source_path, entry.output_path));
        }

        let mut jobs = Vec::with_capacity(handles.len());
        let mut assets = Vec::new();

        for ((source_path, output_path), handle) in metas.into_iter().zip(handles) {
            let (status, outputs) = match handle.await {
                Ok(Ok(StreamOutcome::Finished(out))) => {
                    let paths = out.iter().map(|a| a.path.clone()).collect();
                    assets.extend(out);
                    (JobStatus::Completed, paths)
                }
                Ok(Ok(StreamOutcome::Terminated { stage })) => {
                    (JobStatus::Terminated { stage }, Vec::new())
                }
                Ok(Err(err)) => {
                    let stage = failed_stage(&err);
                    let record = StreamError::new(&source_path, stage, &error_message(&err));
                    warn!(source = %source_path.display(), stage, message = %record.message, "stream failed");
                    let message = record.message.clone();
                    sink.record(record);
                    (
                        JobStatus::Failed {
                            stage: stage.to_string(),
                            message,
                        },
                        Vec::new(),
                    )
                }
                Err(join_err) => {
                    let record = StreamError::new(&source_path, "task", &join_err.to_string());
                    warn!(source = %source_path.display(), message = %record.message, "stream task aborted");
                    let message = record.message.clone();
                    sink.record(record);
                    (
                        JobStatus::Failed {
                            stage: "task".into(),
                            message,
                        },
                        Vec::new(),
                    )
                }
            };

            jobs.push(JobReport {
                source_path,
                output_path,
                outputs,
                status,
            });
        }

        let report = BuildReport {
            jobs,
            errors: sink.errors(),
            assets,
            elapsed: start.elapsed(),
        };

        info!(
            jobs = report.jobs.len(),
            completed = report.completed(),
            errors = report.errors.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "aggregate complete"
        );

        report
    }
}

fn failed_stage(err: &FrondError) -> &str {
    match err {
        FrondError::Stage { stage, .. } => stage,
        FrondError::Io { .. } => "io",
        FrondError::Directive { .. } => "directives",
        _ => "stream",
    }
}
