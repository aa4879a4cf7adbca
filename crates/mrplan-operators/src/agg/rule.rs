//! Associative combining rules shared by every stage of an aggregate.

use super::numeric::AggNumeric;

/// `Max` and `Min` propagate NaN: once a NaN is combined in, it is the
/// result.
pub trait CombineRule: Send + Sync + 'static {
    /// Suffix of registry names (`Max` in `LongMax`).
    const NAME: &'static str;
    /// Verb used in error messages ("max").
    const VERB: &'static str;

    /// Seed the running value starts from on the first non-null chunk.
    /// Combining the seed with `x` yields `x`.
    fn seed<T: AggNumeric>() -> T;

    fn combine<T: AggNumeric>(acc: T, next: T) -> T;
}

pub struct Max;
pub struct Min;
pub struct Sum;

impl CombineRule for Max {
    const NAME: &'static str = "Max";
    const VERB: &'static str = "max";

    fn seed<T: AggNumeric>() -> T {
        T::lowest()
    }

    fn combine<T: AggNumeric>(acc: T, next: T) -> T {
        if acc.is_nan() {
            acc
        } else if next.is_nan() || next > acc {
            next
        } else {
            acc
        }
    }
}

impl CombineRule for Min {
    const NAME: &'static str = "Min";
    const VERB: &'static str = "min";

    fn seed<T: AggNumeric>() -> T {
        T::highest()
    }

    fn combine<T: AggNumeric>(acc: T, next: T) -> T {
        if acc.is_nan() {
            acc
        } else if next.is_nan() || next < acc {
            next
        } else {
            acc
        }
    }
}

impl CombineRule for Sum {
    const NAME: &'static str = "Sum";
    const VERB: &'static str = "sum";

    fn seed<T: AggNumeric>() -> T {
        T::zero()
    }

    fn combine<T: AggNumeric>(acc: T, next: T) -> T {
        acc.plus(next)
    }
}
