#![forbid(unsafe_code)]
//! mrplan-operators: physical operators, phase plans and the aggregate protocol.
//!
//! Design intent:
//! - Keep this crate pure and synchronous.
//! - A [`PhasePlan`] is a small DAG of [`PhysicalOperator`]s for one phase
//!   (map or reduce) of a job; the planner owns and seals them.
//! - Aggregates implement both the three-stage algebraic decomposition and
//!   incremental accumulation, so the plan can pick either strategy.

pub mod agg;
pub mod physical;
pub mod plan;
pub mod traits;

pub use agg::AggregateRegistry;
pub use physical::{AggCall, AggStage, FileSpec, OpKind, PhysicalOperator};
pub use plan::{PhasePlan, EXPLAIN_INDENT};
pub use traits::{Accumulator, AggregateFunction, Algebraic};
