#![forbid(unsafe_code)]
//! mrplan: the job-compilation core of a dataflow-to-MapReduce compiler.
//!
//! This crate only re-exports the workspace members; integration tests and
//! benches live alongside it.

pub use mrplan_core;
pub use mrplan_exec;
pub use mrplan_operators;
pub use mrplan_planner;
pub use mrplan_skew;
