//! Core build engine for frond.
//!
//! Source files are dispatched by their extension chain to registered
//! processors, composed into per-file pipelines (source → preprocess →
//! postprocess → rewrite-extension → normalize-path → write), and run
//! together as one aggregate whose failures are collected in an error sink.

pub mod aggregate;
pub mod build;
pub mod context;
pub mod directives;
pub mod dispatch;
pub mod extension;
pub mod pipeline;
pub mod processor;
pub mod processors;
pub mod sink;
pub mod stream;

pub use aggregate::{BuildReport, JobReport, JobStatus};
pub use build::{FileInspection, ProgressReporter, SilentProgress, build, build_all, inspect_file};
pub use context::BuildContext;
pub use processor::{Processor, ProcessorStore, Produced, Stage, StageRef};
pub use sink::{ErrorSink, StreamError};
