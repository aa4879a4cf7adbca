//! Partition map: which keys are skewed and which reducers host them.

use std::collections::BTreeMap;

use mrplan_core::config::SkewJoinConfig;
use mrplan_core::error::{Error, Result};
use mrplan_core::types::Tuple;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sample::KeySample;

/// Spread of one skewed key.
///
/// Rows of `key` go to the `partitions` consecutive reducers starting at
/// `first_reducer` (wrapping around the job's parallelism).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub key: Tuple,
    pub partitions: u32,
    pub first_reducer: u32,
}

impl PartitionEntry {
    /// Partitions beyond the one a key gets under plain hash routing.
    pub fn extra_partitions(&self) -> u32 {
        self.partitions.saturating_sub(1)
    }

    /// Reducer for the `slot`-th partition of this key.
    pub fn reducer(&self, slot: u32, parallelism: u32) -> u32 {
        let offset = u64::from(slot % self.partitions.max(1));
        ((u64::from(self.first_reducer) + offset) % u64::from(parallelism.max(1))) as u32
    }

    pub fn reducers(&self, parallelism: u32) -> impl Iterator<Item = u32> + '_ {
        (0..self.partitions).map(move |slot| self.reducer(slot, parallelism))
    }
}

/// Key to spread table for one skewed join. Keys without an entry use the
/// default hash route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionMap {
    parallelism: u32,
    entries: BTreeMap<Tuple, PartitionEntry>,
}

impl PartitionMap {
    pub fn new(parallelism: u32) -> Self {
        Self {
            parallelism,
            entries: BTreeMap::new(),
        }
    }

    /// Build the map from a sample.
    ///
    /// A key is skewed when its estimated row count exceeds what one reducer
    /// may hold: the smaller of the configured tuple cap and the per-key
    /// memory share divided by the average row size. Reducers are assigned
    /// round-robin in key order. The result is not checked against
    /// `parallelism`; see [`crate::validate`].
    pub fn generate(sample: &KeySample, cfg: &SkewJoinConfig, parallelism: u32) -> Result<Self> {
        cfg.validate()?;
        if parallelism == 0 {
            return Err(Error::Validation(
                "skewed join requires a parallelism of at least 1".into(),
            ));
        }

        let by_memory = cfg.per_key_memory_bytes() / sample.avg_row_bytes();
        let max_rows = by_memory.min(cfg.max_tuples_per_reducer).max(1);

        let mut map = Self::new(parallelism);
        let mut cursor = 0u32;
        for (key, sampled) in sample.keys() {
            let estimated = sample.scale(sampled);
            let partitions = estimated.div_ceil(max_rows);
            if partitions <= 1 {
                continue;
            }
            let partitions = u32::try_from(partitions).unwrap_or(u32::MAX);
            debug!(
                key = ?key,
                estimated_rows = estimated,
                max_rows,
                partitions,
                first_reducer = cursor,
                "skewed key"
            );
            map.insert(PartitionEntry {
                key: key.clone(),
                partitions,
                first_reducer: cursor,
            });
            cursor = ((cursor as u64 + partitions as u64) % parallelism as u64) as u32;
        }
        debug!(
            skewed_keys = map.len(),
            max_rows, parallelism, "partition map generated"
        );
        Ok(map)
    }

    pub fn insert(&mut self, entry: PartitionEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Tuple) -> Option<&PartitionEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.entries.values()
    }

    /// Largest spread any key needs; 1 when nothing is skewed.
    pub fn max_partitions(&self) -> u32 {
        self.entries
            .values()
            .map(|e| e.partitions)
            .max()
            .unwrap_or(1)
    }

    pub(crate) fn from_parts(parallelism: u32, entries: Vec<PartitionEntry>) -> Self {
        let mut map = Self::new(parallelism);
        for e in entries {
            map.insert(e);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sampler;

    fn sample_of(keys: &[(i64, usize)]) -> KeySample {
        let mut s = Sampler::new(1);
        for (k, n) in keys {
            let key = Tuple::single(*k);
            for _ in 0..*n {
                s.observe(&key, &key);
            }
        }
        s.finish()
    }

    fn cfg(max_tuples: u64) -> SkewJoinConfig {
        SkewJoinConfig {
            max_tuples_per_reducer: max_tuples,
            max_memory_fraction: 0.1,
            ..SkewJoinConfig::default()
        }
    }

    #[test]
    fn only_keys_over_budget_are_recorded() {
        let sample = sample_of(&[(100, 12), (200, 5), (300, 6)]);
        let map = PartitionMap::generate(&sample, &cfg(5), 5).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.get(&Tuple::single(200i64)).is_none());

        let hot = map.get(&Tuple::single(100i64)).unwrap();
        assert_eq!(hot.partitions, 3);
        assert_eq!(hot.extra_partitions(), 2);
        assert_eq!(hot.first_reducer, 0);

        let warm = map.get(&Tuple::single(300i64)).unwrap();
        assert_eq!(warm.partitions, 2);
        assert_eq!(warm.first_reducer, 3);
        assert_eq!(warm.reducers(5).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(map.max_partitions(), 3);
    }

    #[test]
    fn memory_share_can_be_the_binding_limit() {
        let sample = sample_of(&[(1, 10)]);
        let row_bytes = sample.avg_row_bytes();
        let cfg = SkewJoinConfig {
            max_tuples_per_reducer: 1_000,
            max_memory_fraction: 1.0,
            reducer_heap_bytes: row_bytes * 4,
            ..SkewJoinConfig::default()
        };
        let map = PartitionMap::generate(&sample, &cfg, 8).unwrap();
        assert_eq!(map.get(&Tuple::single(1i64)).unwrap().partitions, 3);
    }

    #[test]
    fn reducer_assignment_wraps() {
        let e = PartitionEntry {
            key: Tuple::single(1i64),
            partitions: 3,
            first_reducer: 3,
        };
        assert_eq!(e.reducers(4).collect::<Vec<_>>(), vec![3, 0, 1]);
        assert_eq!(e.reducer(7, 4), e.reducer(1, 4));
    }

    #[test]
    fn reducer_of_far_first_reducer_does_not_overflow() {
        let e = PartitionEntry {
            key: Tuple::single(1i64),
            partitions: 2,
            first_reducer: u32::MAX,
        };
        // (2^32 - 1) % 5 == 0
        assert_eq!(e.reducers(5).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let err = PartitionMap::generate(&sample_of(&[(1, 1)]), &cfg(5), 0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = SkewJoinConfig {
            max_memory_fraction: 1.5,
            ..SkewJoinConfig::default()
        };
        let err = PartitionMap::generate(&sample_of(&[(1, 1)]), &bad, 2).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
