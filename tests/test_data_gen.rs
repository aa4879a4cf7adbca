//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

use mrplan_core::config::{SkewJoinConfig, PROP_REDUCE_MAXTUPLE, PROP_REDUCE_MEMUSAGE};
use mrplan_core::types::{Scalar, Tuple};

/// Skewed side: 12 rows for each of the keys 100, 200 and 300.
pub fn skewed_input() -> Vec<(Tuple, Tuple)> {
    let mut rows = Vec::new();
    for key in [100i64, 200, 300] {
        for i in 0..12i64 {
            let value = Tuple::new(vec![
                Scalar::from(key),
                Scalar::from(format!("row{i}").as_str()),
            ]);
            rows.push((Tuple::single(key), value));
        }
    }
    rows
}

/// Probe side: a few matching keys plus some that match nothing.
pub fn probe_input() -> Vec<(Tuple, Tuple)> {
    [100i64, 200, 200, 400, 300, 500, 100]
        .iter()
        .enumerate()
        .map(|(i, k)| {
            let value = Tuple::new(vec![Scalar::from(*k), Scalar::from(i as i64)]);
            (Tuple::single(*k), value)
        })
        .collect()
}

/// `maxtuple=5`, `memusage=0.1`.
pub fn small_reducer_config() -> SkewJoinConfig {
    let props = BTreeMap::from([
        (PROP_REDUCE_MAXTUPLE.to_string(), "5".to_string()),
        (PROP_REDUCE_MEMUSAGE.to_string(), "0.1".to_string()),
    ]);
    SkewJoinConfig::from_properties(&props).expect("valid properties")
}

/// Nested-loop join used as the reference result.
pub fn plain_join(left: &[(Tuple, Tuple)], right: &[(Tuple, Tuple)]) -> Vec<(Tuple, Tuple)> {
    let mut out = Vec::new();
    for (lk, lv) in left {
        for (rk, rv) in right {
            if lk == rk {
                out.push((lv.clone(), rv.clone()));
            }
        }
    }
    out.sort();
    out
}
