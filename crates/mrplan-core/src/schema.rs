//! Type tags. Pure data; no schema inference here.

use serde::{Deserialize, Serialize};

/// Runtime type tag of a value, also used as a job's map key type: it tells
/// the shuffle how to materialize a null key on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataType {
    #[default]
    Unknown,
    Null,
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
    Tuple,
    Bag,
}

impl DataType {
    /// Short lowercase name used in explain output and messages.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Unknown => "unknown",
            DataType::Null => "null",
            DataType::Boolean => "boolean",
            DataType::Int32 => "int",
            DataType::Int64 => "long",
            DataType::Float32 => "float",
            DataType::Float64 => "double",
            DataType::Utf8 => "chararray",
            DataType::Binary => "bytearray",
            DataType::Tuple => "tuple",
            DataType::Bag => "bag",
        }
    }
}
