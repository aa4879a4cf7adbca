//! Name-to-constructor table tasks use to instantiate aggregates.

use std::collections::BTreeMap;

use tracing::trace;

use super::function::{
    DoubleMax, DoubleMin, DoubleSum, FloatMax, IntMax, IntMin, LongMax, LongMin, LongSum,
};
use crate::traits::AggregateFunction;

pub type AggregateCtor = fn() -> Box<dyn AggregateFunction>;

#[derive(Clone)]
pub struct AggregateRegistry {
    ctors: BTreeMap<String, AggregateCtor>,
}

impl AggregateRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            ctors: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in numeric aggregate.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register("IntMax", || Box::new(IntMax::new()));
        r.register("IntMin", || Box::new(IntMin::new()));
        r.register("LongMax", || Box::new(LongMax::new()));
        r.register("LongMin", || Box::new(LongMin::new()));
        r.register("LongSum", || Box::new(LongSum::new()));
        r.register("FloatMax", || Box::new(FloatMax::new()));
        r.register("DoubleMax", || Box::new(DoubleMax::new()));
        r.register("DoubleMin", || Box::new(DoubleMin::new()));
        r.register("DoubleSum", || Box::new(DoubleSum::new()));
        r
    }

    /// Register (or replace) a constructor under `name`.
    pub fn register(&mut self, name: impl Into<String>, ctor: AggregateCtor) {
        self.ctors.insert(name.into(), ctor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }

    /// Fresh instance with empty accumulator state.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn AggregateFunction>> {
        let ctor = self.ctors.get(name)?;
        trace!(aggregate = name, "instantiate");
        Some(ctor())
    }
}

impl Default for AggregateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for AggregateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ctors.keys()).finish()
    }
}
