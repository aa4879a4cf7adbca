//! Shuffle-time routing for a skewed join.
//!
//! Rows of the sampled (skewed) input whose key is in the partition map are
//! spread over that key's reducers by row sequence number. Rows of the other
//! input with such a key are copied to every one of those reducers, so each
//! reducer can join its share of the skewed rows against the full probe
//! side. Every other key takes the default hash route on both sides.

use mrplan_core::error::{codes, ErrorSource, ExecError};
use mrplan_core::hash::hash_tuple;
use mrplan_core::types::Tuple;

use crate::partition::{PartitionEntry, PartitionMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    /// The input the partition map was sampled from.
    Skewed,
    /// The input streamed against it.
    Probe,
}

#[derive(Debug, Clone)]
pub struct SkewRouter {
    map: PartitionMap,
}

impl SkewRouter {
    /// Fails with the routing error code when the map cannot be honoured
    /// with its own parallelism.
    pub fn new(map: PartitionMap) -> Result<Self, ExecError> {
        let parallelism = map.parallelism();
        if parallelism == 0 {
            return Err(routing_error("partition map has zero parallelism".into()));
        }
        if let Some(bad) = map
            .entries()
            .find(|e| e.partitions == 0 || e.partitions > parallelism)
        {
            return Err(routing_error(format!(
                "key {:?} needs {} partitions but only {parallelism} reducers exist",
                bad.key, bad.partitions
            )));
        }
        if let Some(bad) = map.entries().find(|e| e.first_reducer >= parallelism) {
            return Err(routing_error(format!(
                "key {:?} starts at reducer {} but only {parallelism} reducers exist",
                bad.key, bad.first_reducer
            )));
        }
        Ok(Self { map })
    }

    pub fn parallelism(&self) -> u32 {
        self.map.parallelism()
    }

    pub fn map(&self) -> &PartitionMap {
        &self.map
    }

    /// Hash route used for keys without an entry.
    pub fn default_reducer(&self, key: &Tuple) -> u32 {
        (hash_tuple(key) % u64::from(self.parallelism())) as u32
    }

    /// Reducer for the `seq`-th row of the skewed input.
    pub fn route_skewed(&self, key: &Tuple, seq: u64) -> u32 {
        match self.map.get(key) {
            Some(e) => e.reducer(slot(e, seq), self.parallelism()),
            None => self.default_reducer(key),
        }
    }

    /// Every reducer a probe-side row must reach.
    pub fn route_probe(&self, key: &Tuple) -> Vec<u32> {
        match self.map.get(key) {
            Some(e) => e.reducers(self.parallelism()).collect(),
            None => vec![self.default_reducer(key)],
        }
    }

    pub fn route(&self, side: JoinSide, key: &Tuple, seq: u64) -> Vec<u32> {
        match side {
            JoinSide::Skewed => vec![self.route_skewed(key, seq)],
            JoinSide::Probe => self.route_probe(key),
        }
    }
}

fn slot(e: &PartitionEntry, seq: u64) -> u32 {
    (seq % u64::from(e.partitions)) as u32
}

fn routing_error(msg: String) -> ExecError {
    ExecError::new(codes::ROUTING_FAILED, ErrorSource::Bug, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn router() -> SkewRouter {
        let mut m = PartitionMap::new(5);
        m.insert(PartitionEntry {
            key: Tuple::single(100i64),
            partitions: 3,
            first_reducer: 3,
        });
        SkewRouter::new(m).unwrap()
    }

    #[test]
    fn skewed_rows_cycle_through_assigned_reducers() {
        let r = router();
        let key = Tuple::single(100i64);
        let got: Vec<u32> = (0..6).map(|seq| r.route_skewed(&key, seq)).collect();
        assert_eq!(got, vec![3, 4, 0, 3, 4, 0]);
        assert_eq!(r.route_probe(&key), vec![3, 4, 0]);
    }

    #[test]
    fn unskewed_keys_hash_route_on_both_sides() {
        let r = router();
        let key = Tuple::single(400i64);
        let expected = r.default_reducer(&key);
        assert!(expected < 5);
        assert_eq!(r.route(JoinSide::Skewed, &key, 17), vec![expected]);
        assert_eq!(r.route(JoinSide::Probe, &key, 0), vec![expected]);
    }

    #[test]
    fn oversized_entry_is_a_routing_error() {
        let mut m = PartitionMap::new(2);
        m.insert(PartitionEntry {
            key: Tuple::single(1i64),
            partitions: 3,
            first_reducer: 0,
        });
        let err = SkewRouter::new(m).unwrap_err();
        assert_eq!(err.code(), codes::ROUTING_FAILED);
        assert!(SkewRouter::new(PartitionMap::new(0)).is_err());
    }

    #[test]
    fn first_reducer_past_parallelism_is_a_routing_error() {
        let mut m = PartitionMap::new(5);
        m.insert(PartitionEntry {
            key: Tuple::single(1i64),
            partitions: 2,
            first_reducer: u32::MAX,
        });
        let err = SkewRouter::new(m).unwrap_err();
        assert_eq!(err.code(), codes::ROUTING_FAILED);
        assert!(err.to_string().contains("starts at reducer"), "{err}");
    }

    proptest! {
        #[test]
        fn every_skewed_row_meets_every_probe_row(
            seq in 0u64..10_000,
            first in 0u32..5,
            parts in 1u32..=5,
        ) {
            let mut m = PartitionMap::new(5);
            m.insert(PartitionEntry {
                key: Tuple::single(9i64),
                partitions: parts,
                first_reducer: first,
            });
            let r = SkewRouter::new(m).unwrap();
            let key = Tuple::single(9i64);
            let target = r.route_skewed(&key, seq);
            prop_assert!(r.route_probe(&key).contains(&target));
        }
    }
}
