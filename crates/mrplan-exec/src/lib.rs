#![forbid(unsafe_code)]
//! mrplan-exec: task-side evaluation and job submission.
//!
//! - [`task`] runs aggregate functions over grouped rows in each pipeline
//!   stage (map, combine, reduce) or through the accumulator interface.
//! - [`shuffle`] routes map output to reducers: hash, range or skew aware.
//! - [`launcher`] submits a job plan in dependency order through a
//!   [`JobSubmitter`] and reports per-job outcomes.

pub mod failpoints;
pub mod launcher;
pub mod metrics;
pub mod shuffle;
pub mod task;

pub use launcher::{JobLauncher, JobOutcome, JobSubmitter, LaunchConfig, LaunchReport};
pub use shuffle::{
    partitioner_for, HashPartitioner, Partitioner, QuantileFile, RangePartitioner, Shuffle,
    ShuffledRow, SkewPartitioner,
};
pub use task::{AggregateTask, TaskMode, TaskStats, DEFAULT_CHUNK_ROWS};
