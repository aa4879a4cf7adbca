//! Externally supplied knobs for skewed-join planning.
//!
//! Nothing here is computed internally: the values come from the environment,
//! a property map handed over by the script layer, or plain defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Property key: hard cap on tuples of one key per reducer partition.
pub const PROP_REDUCE_MAXTUPLE: &str = "pig.skewedjoin.reduce.maxtuple";
/// Property key: fraction of reducer memory one key's rows may occupy.
pub const PROP_REDUCE_MEMUSAGE: &str = "pig.skewedjoin.reduce.memusage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewJoinConfig {
    /// Maximum tuples of a single key one reducer partition may receive.
    pub max_tuples_per_reducer: u64,

    /// Maximum fraction of reducer memory usable by one key's rows, in (0, 1].
    pub max_memory_fraction: f64,

    /// Heap available to one reduce task, in bytes.
    pub reducer_heap_bytes: u64,

    /// Parallelism assumed when a job does not request one.
    pub default_parallelism: u32,
}

impl Default for SkewJoinConfig {
    fn default() -> Self {
        Self {
            max_tuples_per_reducer: 5_000_000,
            max_memory_fraction: 0.3,
            reducer_heap_bytes: 512 * 1024 * 1024, // 512 MiB
            default_parallelism: 1,
        }
    }
}

impl SkewJoinConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `MRPLAN_SKEWEDJOIN_REDUCE_MAXTUPLE`: max tuples per reducer partition
    /// - `MRPLAN_SKEWEDJOIN_REDUCE_MEMUSAGE`: max memory fraction per key
    /// - `MRPLAN_REDUCER_HEAP_BYTES`: reducer heap size
    /// - `MRPLAN_DEFAULT_PARALLELISM`: parallelism when none is requested
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("MRPLAN_SKEWEDJOIN_REDUCE_MAXTUPLE") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.max_tuples_per_reducer = v;
            }
        }

        if let Ok(s) = std::env::var("MRPLAN_SKEWEDJOIN_REDUCE_MEMUSAGE") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.max_memory_fraction = v;
            }
        }

        if let Ok(s) = std::env::var("MRPLAN_REDUCER_HEAP_BYTES") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.reducer_heap_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("MRPLAN_DEFAULT_PARALLELISM") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.default_parallelism = v;
            }
        }

        cfg
    }

    /// Overlay script-level properties on the defaults.
    ///
    /// Unlike `from_env`, malformed or out-of-range values are errors.
    pub fn from_properties(props: &BTreeMap<String, String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(s) = props.get(PROP_REDUCE_MAXTUPLE) {
            cfg.max_tuples_per_reducer = s.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{PROP_REDUCE_MAXTUPLE}={s:?}: {e}"))
            })?;
        }

        if let Some(s) = props.get(PROP_REDUCE_MEMUSAGE) {
            cfg.max_memory_fraction = s.trim().parse::<f64>().map_err(|e| {
                Error::Config(format!("{PROP_REDUCE_MEMUSAGE}={s:?}: {e}"))
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tuples_per_reducer == 0 {
            return Err(Error::Config(format!(
                "{PROP_REDUCE_MAXTUPLE} must be positive"
            )));
        }
        if !(self.max_memory_fraction > 0.0 && self.max_memory_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "{PROP_REDUCE_MEMUSAGE} must be in (0, 1], got {}",
                self.max_memory_fraction
            )));
        }
        if self.reducer_heap_bytes == 0 {
            return Err(Error::Config("reducer heap must be non-zero".into()));
        }
        Ok(())
    }

    /// Bytes one key's rows may occupy on a single reducer.
    pub fn per_key_memory_bytes(&self) -> u64 {
        (self.reducer_heap_bytes as f64 * self.max_memory_fraction) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn properties_override_defaults() {
        let cfg = SkewJoinConfig::from_properties(&props(&[
            (PROP_REDUCE_MAXTUPLE, "5"),
            (PROP_REDUCE_MEMUSAGE, "0.1"),
        ]))
        .expect("valid props");
        assert_eq!(cfg.max_tuples_per_reducer, 5);
        assert!((cfg.max_memory_fraction - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn script_layer_key_names_are_read() {
        let cfg = SkewJoinConfig::from_properties(&props(&[
            ("pig.skewedjoin.reduce.maxtuple", "7"),
            ("pig.skewedjoin.reduce.memusage", "0.5"),
            ("skewedjoin.reduce.maxtuple", "1"),
        ]))
        .expect("valid props");
        assert_eq!(cfg.max_tuples_per_reducer, 7);
        assert!((cfg.max_memory_fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_memusage_is_rejected() {
        let err = SkewJoinConfig::from_properties(&props(&[(PROP_REDUCE_MEMUSAGE, "1.5")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_maxtuple_is_rejected() {
        let err = SkewJoinConfig::from_properties(&props(&[(PROP_REDUCE_MAXTUPLE, "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains(PROP_REDUCE_MAXTUPLE));
    }

    #[test]
    fn per_key_memory_is_fraction_of_heap() {
        let cfg = SkewJoinConfig {
            reducer_heap_bytes: 1000,
            max_memory_fraction: 0.25,
            ..SkewJoinConfig::default()
        };
        assert_eq!(cfg.per_key_memory_bytes(), 250);
    }
}
