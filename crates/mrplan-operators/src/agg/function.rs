//! Generic numeric aggregate implementing both execution strategies.

use std::marker::PhantomData;

use mrplan_core::error::{codes, BoxError, ErrorSource, ExecError};
use mrplan_core::schema::DataType;
use mrplan_core::types::{Bag, Scalar, Tuple};
use thiserror::Error;

use super::numeric::AggNumeric;
use super::rule::{CombineRule, Max, Min, Sum};
use crate::traits::{Accumulator, AggregateFunction, Algebraic};

pub type IntMax = Aggregate<i32, Max>;
pub type IntMin = Aggregate<i32, Min>;
pub type LongMax = Aggregate<i64, Max>;
pub type LongMin = Aggregate<i64, Min>;
pub type LongSum = Aggregate<i64, Sum>;
pub type FloatMax = Aggregate<f32, Max>;
pub type DoubleMax = Aggregate<f64, Max>;
pub type DoubleMin = Aggregate<f64, Min>;
pub type DoubleSum = Aggregate<f64, Sum>;

/// A value of the wrong type in an aggregate's input.
#[derive(Debug, Error)]
#[error("expected {expected} value, found {found}")]
pub struct ValueTypeError {
    pub expected: &'static str,
    pub found: &'static str,
}

/// Running state of one aggregate instance in accumulator mode.
///
/// Private to a task; rebuilt from scratch when the task is retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateState<T> {
    running: Option<T>,
    saw_non_null: bool,
}

impl<T: AggNumeric> AggregateState<T> {
    pub fn new() -> Self {
        Self {
            running: None,
            saw_non_null: false,
        }
    }

    pub fn saw_non_null(&self) -> bool {
        self.saw_non_null
    }

    pub fn value(&self) -> Option<T> {
        self.running
    }

    fn fold<R: CombineRule>(&mut self, chunk_value: T) {
        let acc = self.running.unwrap_or_else(R::seed::<T>);
        self.running = Some(R::combine(acc, chunk_value));
        self.saw_non_null = true;
    }

    fn reset(&mut self) {
        self.running = None;
        self.saw_non_null = false;
    }
}

impl<T: AggNumeric> Default for AggregateState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `R`-reduction over values of type `T`.
pub struct Aggregate<T: AggNumeric, R: CombineRule> {
    name: String,
    state: AggregateState<T>,
    _rule: PhantomData<R>,
}

impl<T: AggNumeric, R: CombineRule> Aggregate<T, R> {
    pub fn new() -> Self {
        Self {
            name: Self::function_name(),
            state: AggregateState::new(),
            _rule: PhantomData,
        }
    }

    /// Registry name, e.g. `LongMax`.
    pub fn function_name() -> String {
        format!("{}{}", T::PREFIX, R::NAME)
    }

    pub fn state(&self) -> &AggregateState<T> {
        &self.state
    }

    /// The combining rule over a bag: empty or all-null bags reduce to
    /// `None`, otherwise nulls are skipped.
    pub fn reduce(&self, input: &Bag) -> Result<Option<T>, ExecError> {
        reduce_bag::<T, R>(input, &self.name)
    }

    fn guarded<O>(&self, f: impl FnOnce() -> Result<O, BoxError>) -> Result<O, ExecError> {
        f().map_err(|e| ExecError::classify(&format!("{} in {}", R::VERB, self.name), e))
    }
}

impl<T: AggNumeric, R: CombineRule> Default for Aggregate<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

fn reduce_bag<T: AggNumeric, R: CombineRule>(
    input: &Bag,
    name: &str,
) -> Result<Option<T>, ExecError> {
    let scan = || -> Result<Option<T>, BoxError> {
        if input.is_empty() {
            return Ok(None);
        }
        let mut acc = R::seed::<T>();
        let mut saw_non_null = false;
        for t in input {
            let v = t.get(0)?;
            if v.is_null() {
                continue;
            }
            let Some(x) = T::from_scalar(v) else {
                let cause = ValueTypeError {
                    expected: T::DATA_TYPE.name(),
                    found: v.data_type().name(),
                };
                return Err(Box::new(
                    ExecError::new(
                        codes::BAD_VALUE_IN_BAG,
                        ErrorSource::Bug,
                        format!("Problem while computing {} of {}.", R::VERB, T::PLURAL),
                    )
                    .with_cause(cause),
                ));
            };
            saw_non_null = true;
            acc = R::combine(acc, x);
        }
        Ok(saw_non_null.then_some(acc))
    };
    scan().map_err(|e| ExecError::classify(&format!("{} in {name}", R::VERB), e))
}

impl<T: AggNumeric, R: CombineRule> Algebraic for Aggregate<T, R> {
    type Value = T;

    fn initial(&self, input: &Bag) -> Result<Tuple, ExecError> {
        self.guarded(|| {
            let Some(first) = input.iter().next() else {
                return Ok(Tuple::single(Scalar::Null));
            };
            let v = first.get(0)?;
            if v.is_null() {
                return Ok(Tuple::single(Scalar::Null));
            }
            let x = T::from_scalar(v).ok_or(ValueTypeError {
                expected: T::DATA_TYPE.name(),
                found: v.data_type().name(),
            })?;
            Ok(Tuple::single(x.into_scalar()))
        })
    }

    fn intermediate(&self, input: &Bag) -> Result<Tuple, ExecError> {
        let v = self.reduce(input)?;
        Ok(Tuple::single(v.map(AggNumeric::into_scalar)))
    }

    fn final_value(&self, input: &Bag) -> Result<Option<T>, ExecError> {
        self.reduce(input)
    }
}

impl<T: AggNumeric, R: CombineRule> Accumulator for Aggregate<T, R> {
    type Value = T;

    fn accumulate(&mut self, chunk: &Bag) -> Result<(), ExecError> {
        if let Some(v) = self.reduce(chunk)? {
            self.state.fold::<R>(v);
        }
        Ok(())
    }

    fn value(&self) -> Option<T> {
        self.state.value()
    }

    fn cleanup(&mut self) {
        self.state.reset();
    }
}

impl<T: AggNumeric, R: CombineRule> AggregateFunction for Aggregate<T, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_type(&self) -> DataType {
        T::DATA_TYPE
    }

    fn exec(&self, input: &Bag) -> Result<Scalar, ExecError> {
        Ok(self.reduce(input)?.into_scalar_or_null())
    }

    fn initial(&self, input: &Bag) -> Result<Tuple, ExecError> {
        Algebraic::initial(self, input)
    }

    fn intermediate(&self, input: &Bag) -> Result<Tuple, ExecError> {
        Algebraic::intermediate(self, input)
    }

    fn final_value(&self, input: &Bag) -> Result<Scalar, ExecError> {
        Ok(Algebraic::final_value(self, input)?.into_scalar_or_null())
    }

    fn accumulate(&mut self, chunk: &Bag) -> Result<(), ExecError> {
        Accumulator::accumulate(self, chunk)
    }

    fn value(&self) -> Scalar {
        Accumulator::value(self).into_scalar_or_null()
    }

    fn cleanup(&mut self) {
        Accumulator::cleanup(self)
    }
}

trait IntoScalarOrNull {
    fn into_scalar_or_null(self) -> Scalar;
}

impl<T: AggNumeric> IntoScalarOrNull for Option<T> {
    fn into_scalar_or_null(self) -> Scalar {
        self.map(AggNumeric::into_scalar).unwrap_or(Scalar::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn longs(values: &[Option<i64>]) -> Bag {
        Bag::of_values(values.iter().copied())
    }

    fn partials(parts: &[Tuple]) -> Bag {
        parts.iter().cloned().collect()
    }

    #[test]
    fn empty_and_all_null_bags_are_null() {
        let f = LongMax::new();
        assert_eq!(Algebraic::final_value(&f, &Bag::new()).unwrap(), None);
        assert_eq!(Algebraic::final_value(&f, &longs(&[None, None])).unwrap(), None);
        assert_eq!(
            Algebraic::intermediate(&f, &Bag::new()).unwrap(),
            Tuple::single(Scalar::Null)
        );
    }

    #[test]
    fn nulls_are_skipped_not_propagated() {
        assert_eq!(
            Algebraic::final_value(
                &LongMax::new(),
                &longs(&[Some(3), None, Some(-7), Some(12)])
            )
            .unwrap(),
            Some(12)
        );
        assert_eq!(
            Algebraic::final_value(&LongMin::new(), &longs(&[None, Some(3), Some(-7)])).unwrap(),
            Some(-7)
        );
        assert_eq!(
            Algebraic::final_value(&LongSum::new(), &longs(&[Some(3), None, Some(4)])).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn max_of_only_min_value_is_not_null() {
        assert_eq!(
            Algebraic::final_value(&LongMax::new(), &longs(&[Some(i64::MIN)])).unwrap(),
            Some(i64::MIN)
        );
    }

    #[test]
    fn nan_wins_max_and_min() {
        let bag = Bag::of_values([Some(1.0f64), Some(f64::NAN), None, Some(3.0)]);
        let max = Algebraic::final_value(&DoubleMax::new(), &bag).unwrap();
        assert!(max.is_some_and(f64::is_nan), "{max:?}");
        let min = Algebraic::final_value(&DoubleMin::new(), &bag).unwrap();
        assert!(min.is_some_and(f64::is_nan), "{min:?}");

        let lone = Bag::of_values([f64::NAN]);
        let max = Algebraic::final_value(&DoubleMax::new(), &lone).unwrap();
        assert!(max.is_some_and(f64::is_nan), "{max:?}");

        let mut f = DoubleMax::new();
        Accumulator::accumulate(&mut f, &Bag::of_values([f64::NAN])).unwrap();
        Accumulator::accumulate(&mut f, &Bag::of_values([7.0f64])).unwrap();
        assert!(Accumulator::value(&f).is_some_and(f64::is_nan));
    }

    #[test]
    fn initial_projects_first_value() {
        let f = LongMax::new();
        assert_eq!(
            Algebraic::initial(&f, &longs(&[Some(42)])).unwrap(),
            Tuple::single(42i64)
        );
        assert_eq!(
            Algebraic::initial(&f, &longs(&[None])).unwrap(),
            Tuple::single(Scalar::Null)
        );
        assert_eq!(
            Algebraic::initial(&f, &Bag::new()).unwrap(),
            Tuple::single(Scalar::Null)
        );
    }

    #[test]
    fn wrong_value_type_is_bad_value_error() {
        let bag = Bag::of_values(["oops"]);
        let err = Algebraic::final_value(&LongMax::new(), &bag).unwrap_err();
        assert_eq!(err.code(), codes::BAD_VALUE_IN_BAG);
        assert_eq!(err.source_kind(), ErrorSource::Bug);
        assert_eq!(err.message(), "Problem while computing max of longs.");
    }

    #[test]
    fn empty_tuple_is_wrapped_as_bug() {
        let bag: Bag = vec![Tuple::new(vec![])].into_iter().collect();
        let err = Algebraic::final_value(&LongMax::new(), &bag).unwrap_err();
        assert_eq!(err.code(), codes::AGGREGATE_BUG);
        let err = Algebraic::initial(&LongMax::new(), &bag).unwrap_err();
        assert_eq!(err.code(), codes::AGGREGATE_BUG);
    }

    #[test]
    fn accumulator_keeps_state_until_cleanup() {
        let mut f = LongMax::new();
        Accumulator::accumulate(&mut f, &longs(&[Some(1), Some(5)])).unwrap();
        assert_eq!(Accumulator::value(&f), Some(5));
        assert_eq!(Accumulator::value(&f), Some(5));
        Accumulator::accumulate(&mut f, &longs(&[None])).unwrap();
        Accumulator::accumulate(&mut f, &Bag::new()).unwrap();
        assert_eq!(Accumulator::value(&f), Some(5));
        Accumulator::accumulate(&mut f, &longs(&[Some(9)])).unwrap();
        assert_eq!(Accumulator::value(&f), Some(9));
        assert!(f.state().saw_non_null());

        Accumulator::cleanup(&mut f);
        assert_eq!(Accumulator::value(&f), None);
        assert!(!f.state().saw_non_null());
        Accumulator::accumulate(&mut f, &longs(&[Some(-3)])).unwrap();
        assert_eq!(Accumulator::value(&f), Some(-3));
    }

    #[test]
    fn accumulator_error_leaves_state_untouched() {
        let mut f = LongSum::new();
        Accumulator::accumulate(&mut f, &longs(&[Some(2)])).unwrap();
        assert!(Accumulator::accumulate(&mut f, &Bag::of_values(["x"])).is_err());
        assert_eq!(Accumulator::value(&f), Some(2));
    }

    #[test]
    fn type_erased_surface_matches_typed() {
        let mut f: Box<dyn AggregateFunction> = Box::new(DoubleMax::new());
        assert_eq!(f.name(), "DoubleMax");
        assert_eq!(f.output_type(), DataType::Float64);
        let bag = Bag::of_values([Some(1.5f64), None, Some(-2.0)]);
        assert_eq!(f.exec(&bag).unwrap(), Scalar::F64(1.5));
        assert_eq!(f.final_value(&Bag::new()).unwrap(), Scalar::Null);
        f.accumulate(&bag).unwrap();
        assert_eq!(f.value(), Scalar::F64(1.5));
        f.cleanup();
        assert_eq!(f.value(), Scalar::Null);
    }

    fn chunked(values: &[Option<i64>], cuts: &[usize]) -> Vec<Bag> {
        let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (values.len() + 1)).collect();
        cuts.sort_unstable();
        let mut out = Vec::new();
        let mut start = 0;
        for c in cuts {
            out.push(longs(&values[start..c]));
            start = c;
        }
        out.push(longs(&values[start..]));
        out
    }

    proptest! {
        #[test]
        fn intermediate_then_final_matches_final(
            values in proptest::collection::vec(proptest::option::of(0i64..1_000_000), 0..40),
            cuts in proptest::collection::vec(0usize..64, 0..6),
        ) {
            let max = LongMax::new();
            let whole = Algebraic::final_value(&max, &longs(&values)).unwrap();
            let parts: Vec<Tuple> = chunked(&values, &cuts)
                .iter()
                .map(|c| Algebraic::intermediate(&max, c).unwrap())
                .collect();
            prop_assert_eq!(Algebraic::final_value(&max, &partials(&parts)).unwrap(), whole);
            let sum = LongSum::new();
            let whole = Algebraic::final_value(&sum, &longs(&values)).unwrap();
            let parts: Vec<Tuple> = chunked(&values, &cuts)
                .iter()
                .map(|c| Algebraic::intermediate(&sum, c).unwrap())
                .collect();
            // a second combiner wave over the first wave's output
            let wave2 = Algebraic::intermediate(&sum, &partials(&parts)).unwrap();
            prop_assert_eq!(Algebraic::final_value(&sum, &partials(&[wave2])).unwrap(), whole);
        }

        #[test]
        fn accumulated_chunks_match_final(
            values in proptest::collection::vec(proptest::option::of(-1_000i64..1_000), 0..40),
            cuts in proptest::collection::vec(0usize..64, 0..6),
        ) {
            let mut min = LongMin::new();
            for c in chunked(&values, &cuts) {
                Accumulator::accumulate(&mut min, &c).unwrap();
            }
            let whole = Algebraic::final_value(&min, &longs(&values)).unwrap();
            prop_assert_eq!(Accumulator::value(&min), whole);
        }
    }
}
