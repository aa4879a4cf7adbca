#![forbid(unsafe_code)]
//! mrplan-planner: job nodes and the job DAG.
//!
//! Design:
//! - Optimizer passes mutate a [`JobNodeBuilder`]: phase plans, latches and
//!   strategy annotations (global sort, skewed join, fragment-replicate join,
//!   secondary key, combiner eligibility, parallelism, limits).
//! - `freeze` validates the builder into an immutable [`JobNode`]; execution,
//!   explanation and manifests only ever see frozen nodes.
//! - [`OperatorPlan`] orders jobs for submission and answers "who depends on
//!   this job" for failure propagation.
//! - Fresh operator keys (unions inserted while sealing a phase) come from a
//!   caller-owned `NodeIdGenerator`, so id sequences are reproducible.

pub mod job;
pub mod manifest;
pub mod plan;
pub mod visitor;

pub use job::{JobAnnotations, JobNode, JobNodeBuilder, MAP_PLAN_EMPTY, REDUCE_PLAN_EMPTY};
pub use manifest::{JobManifest, PhaseManifest};
pub use plan::OperatorPlan;
pub use visitor::{JobVisitor, WalkOrder};
