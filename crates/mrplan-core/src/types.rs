//! Lightweight tuple/bag value model.
//!
//! Aggregates consume bags of tuples, the shuffle routes tuples by key. This
//! keeps the execution contracts testable without a columnar runtime.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::TupleError;
use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Null,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I32(_) => DataType::Int32,
            Scalar::I64(_) => DataType::Int64,
            Scalar::F32(_) => DataType::Float32,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
            Scalar::Bin(_) => DataType::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Rough in-memory footprint, used by skew sampling to estimate how many
    /// rows of a key fit in a reducer's memory share.
    pub fn estimated_bytes(&self) -> u64 {
        match self {
            Scalar::Null => 1,
            Scalar::Bool(_) => 1,
            Scalar::I32(_) | Scalar::F32(_) => 4,
            Scalar::I64(_) | Scalar::F64(_) => 8,
            Scalar::Str(s) => s.len() as u64 + 8,
            Scalar::Bin(b) => b.len() as u64 + 8,
        }
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::F32(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Ordered list of fields. Ordering and equality are total (see [`scalar_cmp`]),
/// so tuples can key ordered maps (join keys in partition files).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuple(Vec<Scalar>);

impl Tuple {
    pub fn new(fields: Vec<Scalar>) -> Self {
        Self(fields)
    }

    pub fn single(value: impl Into<Scalar>) -> Self {
        Self(vec![value.into()])
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Result<&Scalar, TupleError> {
        self.0.get(index).ok_or(TupleError {
            index,
            arity: self.0.len(),
        })
    }

    pub fn fields(&self) -> &[Scalar] {
        &self.0
    }

    pub fn push(&mut self, value: impl Into<Scalar>) {
        self.0.push(value.into());
    }

    pub fn estimated_bytes(&self) -> u64 {
        self.0.iter().map(Scalar::estimated_bytes).sum::<u64>() + 16
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Tuple {}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        scalar_tuple_cmp(&self.0, &other.0)
    }
}

impl From<Vec<Scalar>> for Tuple {
    fn from(v: Vec<Scalar>) -> Self {
        Tuple(v)
    }
}

/// Unordered multiset of tuples. Iteration order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bag(Vec<Tuple>);

impl Bag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bag of single-field tuples, one per value.
    pub fn of_values<T: Into<Scalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self(values.into_iter().map(Tuple::single).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.0.iter()
    }

    pub fn add(&mut self, t: Tuple) {
        self.0.push(t);
    }

    pub fn extend(&mut self, other: Bag) {
        self.0.extend(other.0);
    }
}

impl FromIterator<Tuple> for Bag {
    fn from_iter<I: IntoIterator<Item = Tuple>>(iter: I) -> Self {
        Bag(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Bag {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Bag {
    type Item = Tuple;
    type IntoIter = std::vec::IntoIter<Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Compare two scalar tuples lexicographically.
pub fn scalar_tuple_cmp(a: &[Scalar], b: &[Scalar]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match scalar_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Total order over scalars.
///
/// Nulls sort first, NaN sorts after every other float, and mixed types are
/// ordered by variant.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (I32(x), I32(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (F32(x), F32(y)) => float_cmp(f64::from(*x), f64::from(*y)),
        (F64(x), F64(y)) => float_cmp(*x, *y),
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
    }
}

fn float_cmp(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Numeric order of scalar variants for mixed-type comparisons and hashing.
pub fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I32(_) => 2,
        I64(_) => 3,
        F32(_) => 4,
        F64(_) => 5,
        Str(_) => 6,
        Bin(_) => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_get_reports_arity() {
        let t = Tuple::new(vec![Scalar::I64(1)]);
        assert_eq!(t.get(0), Ok(&Scalar::I64(1)));
        assert_eq!(t.get(2), Err(TupleError { index: 2, arity: 1 }));
    }

    #[test]
    fn tuple_order_is_total_with_nan() {
        let a = Tuple::single(f64::NAN);
        let b = Tuple::single(1.0f64);
        assert_eq!(a, a.clone());
        assert!(b < a);
        assert!(Tuple::single(Scalar::Null) < b);
    }

    #[test]
    fn option_values_become_nulls() {
        let bag = Bag::of_values([Some(3i64), None]);
        assert_eq!(bag.len(), 2);
        let second = bag.iter().nth(1).expect("two tuples");
        assert!(second.get(0).expect("field").is_null());
    }
}
