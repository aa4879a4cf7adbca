//! The decomposable-aggregate protocol.
//!
//! A logical aggregate runs under one of two strategies, picked by the plan:
//!
//! - **Algebraic** (a combiner phase exists): `initial` once per input row in
//!   the map phase, `intermediate` any number of times across combiner waves,
//!   `final_value` once in the reduce phase.
//! - **Accumulator** (no combiner): one-pass folding over the sorted value run
//!   of a key, chunk by chunk.
//!
//! Both strategies must agree: for any split of a bag into chunks, composing
//! `intermediate`s then `final_value`, or `accumulate`-ing the chunks then
//! reading `value`, yields `final_value` of the whole bag.

use mrplan_core::error::ExecError;
use mrplan_core::schema::DataType;
use mrplan_core::types::{Bag, Scalar, Tuple};

/// Three-stage decomposition of an aggregate.
///
/// Every stage takes a bag of single-field tuples; `initial` and
/// `intermediate` return a single-field tuple so their output can be fed
/// into a later `intermediate` or `final_value`.
pub trait Algebraic {
    type Value;

    /// Identity projection of the first tuple's value (map phase, one row).
    fn initial(&self, input: &Bag) -> Result<Tuple, ExecError>;

    /// Reduce partial values into one, wrapped back into a tuple.
    fn intermediate(&self, input: &Bag) -> Result<Tuple, ExecError>;

    /// Reduce partial values to the terminal result; `None` is logical null.
    fn final_value(&self, input: &Bag) -> Result<Option<Self::Value>, ExecError>;
}

/// Incremental one-pass evaluation over a key's value run.
///
/// State survives across `accumulate` calls and `value` reads; only
/// `cleanup` resets it. The harness calls `cleanup` between keys.
pub trait Accumulator {
    type Value;

    fn accumulate(&mut self, chunk: &Bag) -> Result<(), ExecError>;

    fn value(&self) -> Option<Self::Value>;

    fn cleanup(&mut self);
}

/// Type-erased aggregate as instantiated by a task from a registry name.
///
/// Values cross this boundary as [`Scalar`]s; `Scalar::Null` is logical null.
pub trait AggregateFunction: Send {
    fn name(&self) -> &str;

    fn output_type(&self) -> DataType;

    /// One-shot evaluation over a whole bag.
    fn exec(&self, input: &Bag) -> Result<Scalar, ExecError>;

    fn initial(&self, input: &Bag) -> Result<Tuple, ExecError>;

    fn intermediate(&self, input: &Bag) -> Result<Tuple, ExecError>;

    fn final_value(&self, input: &Bag) -> Result<Scalar, ExecError>;

    fn accumulate(&mut self, chunk: &Bag) -> Result<(), ExecError>;

    fn value(&self) -> Scalar;

    fn cleanup(&mut self);
}
