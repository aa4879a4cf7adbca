//! Ordered numeric types an aggregate can run over.

use std::fmt::Debug;

use mrplan_core::schema::DataType;
use mrplan_core::types::Scalar;

pub trait AggNumeric: Copy + PartialOrd + Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    /// Prefix of registry names (`Long` in `LongMax`).
    const PREFIX: &'static str;
    /// Plural noun used in error messages ("longs").
    const PLURAL: &'static str;

    /// Lowest value; seed for max.
    fn lowest() -> Self;
    /// Highest value; seed for min.
    fn highest() -> Self;
    fn zero() -> Self;

    fn plus(self, other: Self) -> Self;

    fn is_nan(self) -> bool {
        false
    }

    /// Extract from a non-null scalar; `None` on type mismatch.
    fn from_scalar(s: &Scalar) -> Option<Self>;

    fn into_scalar(self) -> Scalar;
}

impl AggNumeric for i32 {
    const DATA_TYPE: DataType = DataType::Int32;
    const PREFIX: &'static str = "Int";
    const PLURAL: &'static str = "ints";

    fn lowest() -> Self {
        i32::MIN
    }
    fn highest() -> Self {
        i32::MAX
    }
    fn zero() -> Self {
        0
    }
    fn plus(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn from_scalar(s: &Scalar) -> Option<Self> {
        match s {
            Scalar::I32(v) => Some(*v),
            _ => None,
        }
    }
    fn into_scalar(self) -> Scalar {
        Scalar::I32(self)
    }
}

impl AggNumeric for i64 {
    const DATA_TYPE: DataType = DataType::Int64;
    const PREFIX: &'static str = "Long";
    const PLURAL: &'static str = "longs";

    fn lowest() -> Self {
        i64::MIN
    }
    fn highest() -> Self {
        i64::MAX
    }
    fn zero() -> Self {
        0
    }
    fn plus(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn from_scalar(s: &Scalar) -> Option<Self> {
        match s {
            Scalar::I64(v) => Some(*v),
            Scalar::I32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
    fn into_scalar(self) -> Scalar {
        Scalar::I64(self)
    }
}

impl AggNumeric for f32 {
    const DATA_TYPE: DataType = DataType::Float32;
    const PREFIX: &'static str = "Float";
    const PLURAL: &'static str = "floats";

    fn lowest() -> Self {
        f32::NEG_INFINITY
    }
    fn highest() -> Self {
        f32::INFINITY
    }
    fn zero() -> Self {
        0.0
    }
    fn plus(self, other: Self) -> Self {
        self + other
    }
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    fn from_scalar(s: &Scalar) -> Option<Self> {
        match s {
            Scalar::F32(v) => Some(*v),
            _ => None,
        }
    }
    fn into_scalar(self) -> Scalar {
        Scalar::F32(self)
    }
}

impl AggNumeric for f64 {
    const DATA_TYPE: DataType = DataType::Float64;
    const PREFIX: &'static str = "Double";
    const PLURAL: &'static str = "doubles";

    fn lowest() -> Self {
        f64::NEG_INFINITY
    }
    fn highest() -> Self {
        f64::INFINITY
    }
    fn zero() -> Self {
        0.0
    }
    fn plus(self, other: Self) -> Self {
        self + other
    }
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    fn from_scalar(s: &Scalar) -> Option<Self> {
        match s {
            Scalar::F64(v) => Some(*v),
            Scalar::F32(v) => Some(f64::from(*v)),
            _ => None,
        }
    }
    fn into_scalar(self) -> Scalar {
        Scalar::F64(self)
    }
}
