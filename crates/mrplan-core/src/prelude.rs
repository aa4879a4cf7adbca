//! Convenient re-exports for downstream crates.

pub use crate::config::SkewJoinConfig;
pub use crate::error::{codes, Error, ErrorSource, ExecError, Result, TupleError};
pub use crate::id::{NodeIdGenerator, OperatorKey};
pub use crate::schema::DataType;
pub use crate::types::{Bag, Scalar, Tuple};
