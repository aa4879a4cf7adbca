//! Sampling pass over one join input.
//!
//! The sampler sees every row (so it knows the input size) but only records
//! every `stride`-th one into the key histogram.

use std::collections::BTreeMap;

use mrplan_core::types::Tuple;

#[derive(Debug, Clone)]
pub struct Sampler {
    stride: u64,
    seen: u64,
    sample: KeySample,
}

impl Sampler {
    /// `stride` of 0 is treated as 1 (sample every row).
    pub fn new(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
            seen: 0,
            sample: KeySample::default(),
        }
    }

    /// Observe one input row with its join key.
    pub fn observe(&mut self, key: &Tuple, row: &Tuple) {
        let take = self.seen % self.stride == 0;
        self.seen += 1;
        self.sample.total_rows += 1;
        if take {
            self.sample.record(key.clone(), row.estimated_bytes());
        }
    }

    pub fn finish(self) -> KeySample {
        self.sample
    }
}

/// Per-key row counts over the sampled rows of one input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySample {
    counts: BTreeMap<Tuple, u64>,
    sampled_rows: u64,
    sampled_bytes: u64,
    total_rows: u64,
}

impl KeySample {
    fn record(&mut self, key: Tuple, row_bytes: u64) {
        *self.counts.entry(key).or_insert(0) += 1;
        self.sampled_rows += 1;
        self.sampled_bytes += row_bytes;
    }

    /// Fold another input's sample into this one (outer-join style sampling
    /// over both sides).
    pub fn merge(&mut self, other: KeySample) {
        for (k, c) in other.counts {
            *self.counts.entry(k).or_insert(0) += c;
        }
        self.sampled_rows += other.sampled_rows;
        self.sampled_bytes += other.sampled_bytes;
        self.total_rows += other.total_rows;
    }

    pub fn is_empty(&self) -> bool {
        self.sampled_rows == 0
    }

    pub fn sampled_rows(&self) -> u64 {
        self.sampled_rows
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn keys(&self) -> impl Iterator<Item = (&Tuple, u64)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }

    /// Average estimated row size over the sample, at least one byte.
    pub fn avg_row_bytes(&self) -> u64 {
        if self.sampled_rows == 0 {
            return 1;
        }
        (self.sampled_bytes / self.sampled_rows).max(1)
    }

    /// Estimated number of rows carrying `key` in the whole input.
    pub fn estimated_rows(&self, key: &Tuple) -> u64 {
        self.counts
            .get(key)
            .map(|c| self.scale(*c))
            .unwrap_or(0)
    }

    pub(crate) fn scale(&self, sampled: u64) -> u64 {
        if self.sampled_rows == 0 {
            return 0;
        }
        let scaled = sampled as u128 * self.total_rows as u128;
        scaled.div_ceil(self.sampled_rows as u128) as u64
    }
}
