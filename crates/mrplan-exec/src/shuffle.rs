//! Shuffle: assign map output rows to reducers and hand each reducer its
//! rows sorted by key.

use std::collections::BTreeMap;

use mrplan_core::config::SkewJoinConfig;
use mrplan_core::error::{codes, Error, ErrorSource, ExecError, Result};
use mrplan_core::hash::hash_tuple;
use mrplan_core::types::Tuple;
use mrplan_planner::job::JobNode;
use mrplan_skew::router::{JoinSide, SkewRouter};
use mrplan_skew::store::{read_partition_file, Storage};
use mrplan_skew::validate::validate_parallelism;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Reducers a row is sent to.
pub type Routed = std::result::Result<Vec<u32>, ExecError>;

/// Decides which reducers a row goes to. `seq` is the row's position within
/// its input.
pub trait Partitioner: Send + Sync {
    fn parallelism(&self) -> u32;

    fn partitions(&self, input: u8, key: &Tuple, seq: u64) -> Routed;
}

#[derive(Debug, Clone)]
pub struct HashPartitioner {
    parallelism: u32,
}

impl HashPartitioner {
    pub fn new(parallelism: u32) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }
}

impl Partitioner for HashPartitioner {
    fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn partitions(&self, _input: u8, key: &Tuple, _seq: u64) -> Routed {
        Ok(vec![(hash_tuple(key) % u64::from(self.parallelism)) as u32])
    }
}

/// Skewed-join routing. Input 0 is the sampled (skewed) side, input 1 the
/// probe side.
#[derive(Debug, Clone)]
pub struct SkewPartitioner {
    router: SkewRouter,
}

impl SkewPartitioner {
    pub fn new(router: SkewRouter) -> Self {
        Self { router }
    }
}

impl Partitioner for SkewPartitioner {
    fn parallelism(&self) -> u32 {
        self.router.parallelism()
    }

    fn partitions(&self, input: u8, key: &Tuple, seq: u64) -> Routed {
        let side = match input {
            0 => JoinSide::Skewed,
            1 => JoinSide::Probe,
            other => {
                return Err(ExecError::new(
                    codes::ROUTING_FAILED,
                    ErrorSource::Bug,
                    format!("skewed join has two inputs, got input index {other}"),
                ))
            }
        };
        Ok(self.router.route(side, key, seq))
    }
}

/// Reducer range boundaries for a total-order sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileFile {
    /// `parallelism - 1` ascending upper bounds.
    pub boundaries: Vec<Tuple>,
}

impl QuantileFile {
    pub fn read(storage: &dyn Storage, path: &str) -> Result<Self> {
        Ok(serde_json::from_slice(&storage.read(path)?)?)
    }

    pub fn write(&self, storage: &dyn Storage, path: &str) -> Result<()> {
        storage.write(path, &serde_json::to_vec(self)?)
    }
}

/// Range partitioning for global sort: reducer `i` receives keys in
/// `(boundaries[i-1], boundaries[i]]`. For a descending first column the
/// reducer order is reversed so reducer 0 holds the largest keys.
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    boundaries: Vec<Tuple>,
    ascending: bool,
}

impl RangePartitioner {
    pub fn new(quantiles: QuantileFile, ascending: bool) -> std::result::Result<Self, ExecError> {
        if quantiles.boundaries.windows(2).any(|w| w[0] > w[1]) {
            return Err(ExecError::new(
                codes::ROUTING_FAILED,
                ErrorSource::Input,
                "quantile boundaries are not sorted",
            ));
        }
        Ok(Self {
            boundaries: quantiles.boundaries,
            ascending,
        })
    }
}

impl Partitioner for RangePartitioner {
    fn parallelism(&self) -> u32 {
        self.boundaries.len() as u32 + 1
    }

    fn partitions(&self, _input: u8, key: &Tuple, _seq: u64) -> Routed {
        let idx = self.boundaries.partition_point(|b| b < key) as u32;
        let reducer = if self.ascending {
            idx
        } else {
            self.parallelism() - 1 - idx
        };
        Ok(vec![reducer])
    }
}

/// Partitioner for a frozen job: skew routing for skewed joins, range
/// routing for global sorts, hash routing otherwise.
pub fn partitioner_for(
    job: &JobNode,
    storage: &dyn Storage,
    cfg: &SkewJoinConfig,
) -> Result<Box<dyn Partitioner>> {
    let ann = job.annotations();
    if let Some(path) = ann.skewed_join_partition_file.as_deref() {
        let map = read_partition_file(storage, path)?;
        let requested = job
            .requested_parallelism()
            .unwrap_or(cfg.default_parallelism);
        if map.parallelism() != requested {
            let msg = format!(
                "{}: partition file {path} was planned for {} reducers, job requests {requested}",
                job.key(),
                map.parallelism()
            );
            warn!(job = %job.key(), "{msg}");
            return Err(Error::Validation(msg));
        }
        validate_parallelism(&map, requested)?;
        debug!(job = %job.key(), path, skewed_keys = map.len(), "skew partitioner");
        return Ok(Box::new(SkewPartitioner::new(SkewRouter::new(map)?)));
    }
    if ann.global_sort {
        let path = ann.quant_file.as_deref().ok_or_else(|| {
            Error::Validation(format!("{}: global sort without quantile file", job.key()))
        })?;
        let ascending = job
            .sort_order()
            .and_then(|o| o.first().copied())
            .unwrap_or(true);
        let quantiles = QuantileFile::read(storage, path)?;
        debug!(
            job = %job.key(),
            path,
            ranges = quantiles.boundaries.len() + 1,
            ascending,
            "range partitioner"
        );
        return Ok(Box::new(RangePartitioner::new(quantiles, ascending)?));
    }
    let parallelism = job
        .requested_parallelism()
        .unwrap_or(cfg.default_parallelism);
    Ok(Box::new(HashPartitioner::new(parallelism)))
}

/// One row as seen by a reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct ShuffledRow {
    pub key: Tuple,
    pub input: u8,
    pub value: Tuple,
}

/// Map-side collector of routed rows.
pub struct Shuffle<'a> {
    partitioner: &'a dyn Partitioner,
    seq: BTreeMap<u8, u64>,
    buckets: BTreeMap<u32, Vec<ShuffledRow>>,
}

impl<'a> Shuffle<'a> {
    pub fn new(partitioner: &'a dyn Partitioner) -> Self {
        Self {
            partitioner,
            seq: BTreeMap::new(),
            buckets: BTreeMap::new(),
        }
    }

    pub fn push(
        &mut self,
        input: u8,
        key: Tuple,
        value: Tuple,
    ) -> std::result::Result<(), ExecError> {
        let seq = self.seq.entry(input).or_insert(0);
        let targets = self.partitioner.partitions(input, &key, *seq)?;
        *seq += 1;
        let parallelism = self.partitioner.parallelism();
        if let Some(bad) = targets.iter().find(|r| **r >= parallelism) {
            return Err(ExecError::new(
                codes::ROUTING_FAILED,
                ErrorSource::Bug,
                format!("reducer {bad} out of range for parallelism {parallelism}"),
            ));
        }
        for r in targets {
            self.buckets.entry(r).or_default().push(ShuffledRow {
                key: key.clone(),
                input,
                value: value.clone(),
            });
        }
        Ok(())
    }

    /// Per-reducer rows, sorted by key then input (stable within an input).
    pub fn finish(self) -> BTreeMap<u32, Vec<ShuffledRow>> {
        let mut buckets = self.buckets;
        for rows in buckets.values_mut() {
            rows.sort_by(|a, b| a.key.cmp(&b.key).then(a.input.cmp(&b.input)));
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrplan_skew::partition::{PartitionEntry, PartitionMap};
    use mrplan_skew::store::MemoryStorage;

    fn key(k: i64) -> Tuple {
        Tuple::single(k)
    }

    #[test]
    fn hash_partitioner_is_stable() {
        let p = HashPartitioner::new(4);
        let a = p.partitions(0, &key(17), 0).unwrap();
        let b = p.partitions(1, &key(17), 99).unwrap();
        assert_eq!(a, b);
        assert!(a[0] < 4);
    }

    #[test]
    fn range_partitioner_honours_direction() {
        let q = QuantileFile {
            boundaries: vec![key(10), key(20)],
        };
        let asc = RangePartitioner::new(q.clone(), true).unwrap();
        assert_eq!(asc.parallelism(), 3);
        let got: Vec<u32> = [5, 10, 11, 20, 21]
            .iter()
            .map(|k| asc.partitions(0, &key(*k), 0).unwrap()[0])
            .collect();
        assert_eq!(got, vec![0, 0, 1, 1, 2]);

        let desc = RangePartitioner::new(q, false).unwrap();
        assert_eq!(desc.partitions(0, &key(5), 0).unwrap(), vec![2]);
        assert_eq!(desc.partitions(0, &key(25), 0).unwrap(), vec![0]);
    }

    #[test]
    fn unsorted_quantiles_are_rejected() {
        let q = QuantileFile {
            boundaries: vec![key(20), key(10)],
        };
        assert_eq!(
            RangePartitioner::new(q, true).unwrap_err().code(),
            codes::ROUTING_FAILED
        );
    }

    #[test]
    fn quantile_file_round_trip() {
        let storage = MemoryStorage::new();
        let q = QuantileFile {
            boundaries: vec![key(3), key(8)],
        };
        q.write(&storage, "q.json").unwrap();
        assert_eq!(QuantileFile::read(&storage, "q.json").unwrap(), q);
    }

    #[test]
    fn shuffle_spreads_skewed_rows_and_replicates_probe_rows() {
        let mut map = PartitionMap::new(3);
        map.insert(PartitionEntry {
            key: key(1),
            partitions: 2,
            first_reducer: 1,
        });
        let p = SkewPartitioner::new(SkewRouter::new(map).unwrap());
        let mut s = Shuffle::new(&p);
        for i in 0..4 {
            s.push(0, key(1), Tuple::single(i as i64)).unwrap();
        }
        s.push(1, key(1), Tuple::single("probe")).unwrap();
        assert!(s.push(2, key(1), Tuple::single(0i64)).is_err());

        let buckets = s.finish();
        for r in [1u32, 2] {
            let rows = &buckets[&r];
            assert_eq!(rows.iter().filter(|x| x.input == 0).count(), 2);
            assert_eq!(rows.last().unwrap().input, 1);
        }
        assert!(!buckets.contains_key(&0));
    }
}
