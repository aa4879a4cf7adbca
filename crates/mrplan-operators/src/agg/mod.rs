//! Numeric aggregates (max, min, sum) over ints, longs, floats and doubles.
//!
//! Every aggregate here is a [`function::Aggregate`] parameterised by a
//! value type and a combining rule; the registry maps the familiar names
//! (`LongMax`, `DoubleSum`, ...) onto those instantiations.

pub mod function;
pub mod numeric;
pub mod registry;
pub mod rule;

pub use function::{
    Aggregate, AggregateState, DoubleMax, DoubleMin, DoubleSum, FloatMax, IntMax, IntMin,
    LongMax, LongMin, LongSum, ValueTypeError,
};
pub use numeric::AggNumeric;
pub use registry::{AggregateCtor, AggregateRegistry};
pub use rule::{CombineRule, Max, Min, Sum};
