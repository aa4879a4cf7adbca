//! Stable hashing helpers for partitioning and content digests.
//!
//! Everything here is platform- and run-independent (blake3 over a fixed
//! little-endian encoding), so a key hashes to the same reducer in every task.

use blake3::Hasher;
use serde::Serialize;

use crate::types::{scalar_type_order, Scalar, Tuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// First eight bytes as a little-endian integer.
    pub fn low_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(buf)
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

pub fn hash_str(s: &str) -> Hash256 {
    hash_bytes(s.as_bytes())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(v)?;
    Ok(hash_bytes(&bytes))
}

/// Stable 64-bit hash of a key tuple.
pub fn hash_tuple(t: &Tuple) -> u64 {
    let mut h = Hasher::new();
    for s in t.fields() {
        hash_scalar(s, &mut h);
    }
    Hash256(h.finalize().into()).low_u64()
}

/// Feed a scalar into a hasher: type discriminant first, then payload.
pub fn hash_scalar(scalar: &Scalar, hasher: &mut Hasher) {
    use Scalar::*;

    hasher.update(&[scalar_type_order(scalar)]);

    match scalar {
        Null => {}
        Bool(b) => {
            hasher.update(&[*b as u8]);
        }
        I32(i) => {
            hasher.update(&i.to_le_bytes());
        }
        I64(i) => {
            hasher.update(&i.to_le_bytes());
        }
        F32(f) => {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        F64(f) => {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        Str(s) => {
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Bin(b) => {
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}
