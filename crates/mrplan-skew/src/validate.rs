//! Plan-time checks for skewed joins, run before any job is submitted.

use mrplan_core::config::SkewJoinConfig;
use mrplan_core::error::{Error, Result};
use tracing::warn;

use crate::partition::PartitionMap;
use crate::sample::KeySample;

/// Skewed joins are two-way only.
pub fn validate_inputs(inputs: usize) -> Result<()> {
    if inputs > 2 {
        let msg = format!(
            "{inputs}-way skewed join is unsupported: skewed join takes exactly two inputs"
        );
        warn!(inputs, "{msg}");
        return Err(Error::Validation(msg));
    }
    if inputs < 2 {
        let msg = format!("skewed join needs two inputs, got {inputs}");
        warn!(inputs, "{msg}");
        return Err(Error::Validation(msg));
    }
    Ok(())
}

/// Every skewed key must fit its spread into the requested reducers.
pub fn validate_parallelism(map: &PartitionMap, requested: u32) -> Result<()> {
    if let Some(e) = map.entries().find(|e| e.partitions > requested) {
        let msg = format!(
            "not enough reducers for skewed join: key {:?} needs {} partitions, \
             parallelism is {requested}",
            e.key, e.partitions
        );
        warn!(requested, needed = e.partitions, "{msg}");
        return Err(Error::Validation(msg));
    }
    Ok(())
}

/// Build and validate the partition map for a skewed join over `inputs`
/// inputs at the requested parallelism.
pub fn plan_skewed_join(
    sample: &KeySample,
    cfg: &SkewJoinConfig,
    inputs: usize,
    parallelism: u32,
) -> Result<PartitionMap> {
    validate_inputs(inputs)?;
    let map = PartitionMap::generate(sample, cfg, parallelism)?;
    validate_parallelism(&map, parallelism)?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sampler;
    use mrplan_core::types::Tuple;

    fn hot_sample() -> KeySample {
        let mut s = Sampler::new(1);
        let key = Tuple::single(100i64);
        for _ in 0..12 {
            s.observe(&key, &key);
        }
        s.finish()
    }

    fn cfg() -> SkewJoinConfig {
        SkewJoinConfig {
            max_tuples_per_reducer: 5,
            max_memory_fraction: 0.1,
            ..SkewJoinConfig::default()
        }
    }

    #[test]
    fn single_reducer_cannot_host_a_skewed_key() {
        let err = plan_skewed_join(&hot_sample(), &cfg(), 2, 1).unwrap_err();
        match err {
            Error::Validation(m) => assert!(m.contains("not enough reducers"), "{m}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn three_way_is_unsupported() {
        let err = plan_skewed_join(&hot_sample(), &cfg(), 3, 5).unwrap_err();
        match err {
            Error::Validation(m) => assert!(m.contains("unsupported"), "{m}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn enough_reducers_passes() {
        let map = plan_skewed_join(&hot_sample(), &cfg(), 2, 3).unwrap();
        assert_eq!(map.max_partitions(), 3);
        assert!(validate_inputs(1).is_err());
    }
}
