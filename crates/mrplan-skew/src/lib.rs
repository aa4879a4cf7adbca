#![forbid(unsafe_code)]
//! mrplan-skew: skewed-join mitigation.
//!
//! Two passes:
//! 1. A sampling job feeds one join input through a [`Sampler`] and turns the
//!    resulting [`KeySample`] into a [`PartitionMap`] (validated against the
//!    requested parallelism) persisted as a partition file.
//! 2. At shuffle time every map task loads that file and routes rows through
//!    a [`SkewRouter`].

pub mod partition;
pub mod router;
pub mod sample;
pub mod store;
pub mod validate;

pub use partition::{PartitionEntry, PartitionMap};
pub use router::{JoinSide, SkewRouter};
pub use sample::{KeySample, Sampler};
pub use store::{read_partition_file, write_partition_file, FsStorage, MemoryStorage, Storage};
pub use validate::{plan_skewed_join, validate_inputs, validate_parallelism};
