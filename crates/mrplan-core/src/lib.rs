#![forbid(unsafe_code)]
//! mrplan-core: the leaf types every other mrplan crate builds on.
//!
//! - `id`: scope-qualified operator keys and the context-scoped allocator
//!   that mints them (no process-wide generator).
//! - `types`: the tuple/bag value model aggregates and routers operate on.
//! - `error`: plan-construction, plan-validation and execution error kinds.
//! - `config`: externally supplied skew-join knobs.
//! - `hash`: stable hashing for partitioning and digests.
//!
//! No I/O and no plan structure here.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod types;

/// Crate version stamped into persisted artifacts (partition files).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
