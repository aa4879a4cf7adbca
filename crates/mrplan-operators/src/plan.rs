//! `PhasePlan`: the operator DAG executed within one phase (map, combine or
//! reduce) of a single job.
//!
//! Edges point from producer to consumer. Roots have no predecessors (loads),
//! leaves have no successors (stores, rearranges, the synthetic union).
//! Every mutation keeps the graph acyclic; a failed mutation leaves the plan
//! unchanged.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use mrplan_core::error::{Error, Result};
use mrplan_core::id::OperatorKey;

use crate::physical::PhysicalOperator;

/// Indentation unit used when nesting explain text.
pub const EXPLAIN_INDENT: &str = "|   ";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhasePlan {
    ops: BTreeMap<OperatorKey, PhysicalOperator>,
    succs: BTreeMap<OperatorKey, BTreeSet<OperatorKey>>,
    preds: BTreeMap<OperatorKey, BTreeSet<OperatorKey>>,
}

impl PhasePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the plan has no operators.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn get(&self, key: &OperatorKey) -> Option<&PhysicalOperator> {
        self.ops.get(key)
    }

    pub fn operators(&self) -> impl Iterator<Item = &PhysicalOperator> {
        self.ops.values()
    }

    /// Insert a disconnected operator.
    pub fn add(&mut self, op: PhysicalOperator) -> Result<()> {
        if self.ops.contains_key(&op.key) {
            return Err(Error::Construction(format!(
                "operator {} already in plan",
                op.key
            )));
        }
        self.succs.entry(op.key.clone()).or_default();
        self.preds.entry(op.key.clone()).or_default();
        self.ops.insert(op.key.clone(), op);
        Ok(())
    }

    /// Add an edge `from -> to`. Fails if either end is missing or the edge
    /// would close a cycle.
    pub fn connect(&mut self, from: &OperatorKey, to: &OperatorKey) -> Result<()> {
        for k in [from, to] {
            if !self.ops.contains_key(k) {
                return Err(Error::Construction(format!(
                    "cannot connect {from} -> {to}: {k} is not in the plan"
                )));
            }
        }
        if from == to || self.reaches(to, from) {
            return Err(Error::Construction(format!(
                "connecting {from} -> {to} would create a cycle"
            )));
        }
        self.succs.entry(from.clone()).or_default().insert(to.clone());
        self.preds.entry(to.clone()).or_default().insert(from.clone());
        Ok(())
    }

    /// Remove the edge `from -> to`; returns whether it existed.
    pub fn disconnect(&mut self, from: &OperatorKey, to: &OperatorKey) -> bool {
        let had = self
            .succs
            .get_mut(from)
            .map(|s| s.remove(to))
            .unwrap_or(false);
        if let Some(p) = self.preds.get_mut(to) {
            p.remove(from);
        }
        had
    }

    /// Remove an operator and all its edges.
    pub fn remove(&mut self, key: &OperatorKey) -> Option<PhysicalOperator> {
        let op = self.ops.remove(key)?;
        for s in self.succs.remove(key).unwrap_or_default() {
            if let Some(p) = self.preds.get_mut(&s) {
                p.remove(key);
            }
        }
        for p in self.preds.remove(key).unwrap_or_default() {
            if let Some(s) = self.succs.get_mut(&p) {
                s.remove(key);
            }
        }
        Some(op)
    }

    pub fn successors(&self, key: &OperatorKey) -> Vec<&OperatorKey> {
        self.succs
            .get(key)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }

    pub fn predecessors(&self, key: &OperatorKey) -> Vec<&OperatorKey> {
        self.preds
            .get(key)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }

    /// Operators with no predecessors, in key order.
    pub fn roots(&self) -> Vec<&PhysicalOperator> {
        self.ops
            .values()
            .filter(|op| self.preds.get(&op.key).map_or(true, |p| p.is_empty()))
            .collect()
    }

    /// Operators with no successors, in key order.
    pub fn leaves(&self) -> Vec<&PhysicalOperator> {
        self.ops
            .values()
            .filter(|op| self.succs.get(&op.key).map_or(true, |s| s.is_empty()))
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Append `op` as the new unique leaf: every current leaf feeds it.
    ///
    /// The edges are checked for consistency first; on any error the plan is
    /// left untouched. Disconnected roots are fine here, the new leaf joins
    /// them.
    pub fn add_as_leaf(&mut self, op: PhysicalOperator) -> Result<()> {
        self.check_edges()?;
        let leaves: Vec<OperatorKey> = self.leaves().into_iter().map(|l| l.key.clone()).collect();
        let key = op.key.clone();
        self.add(op)?;
        for leaf in &leaves {
            if let Err(e) = self.connect(leaf, &key) {
                self.remove(&key);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Check structural consistency: no dangling edges, no cycles, and a
    /// single connected component.
    pub fn validate(&self) -> Result<()> {
        self.check_edges()?;
        if !self.is_connected() {
            return Err(Error::Construction(format!(
                "phase plan is not connected: {} operators, {} roots",
                self.ops.len(),
                self.roots().len()
            )));
        }
        Ok(())
    }

    fn check_edges(&self) -> Result<()> {
        for (from, tos) in &self.succs {
            if !self.ops.contains_key(from) {
                return Err(Error::Construction(format!(
                    "dangling edge source {from}"
                )));
            }
            for to in tos {
                if !self.ops.contains_key(to) {
                    return Err(Error::Construction(format!(
                        "dangling edge {from} -> {to}"
                    )));
                }
                let mirrored = self.preds.get(to).map_or(false, |p| p.contains(from));
                if !mirrored {
                    return Err(Error::Construction(format!(
                        "edge {from} -> {to} missing from predecessor index"
                    )));
                }
            }
        }
        if self.topological_order().len() != self.ops.len() {
            return Err(Error::Construction("phase plan contains a cycle".into()));
        }
        Ok(())
    }

    /// True when every operator belongs to one weakly connected component.
    pub fn is_connected(&self) -> bool {
        let Some(start) = self.ops.keys().next() else {
            return true;
        };
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(k) = queue.pop_front() {
            if !seen.insert(k) {
                continue;
            }
            let next = self
                .succs
                .get(k)
                .into_iter()
                .flatten()
                .chain(self.preds.get(k).into_iter().flatten());
            queue.extend(next);
        }
        seen.len() == self.ops.len()
    }

    /// Kahn order from roots to leaves, ties broken by key. Shorter than
    /// `len()` iff the graph has a cycle.
    pub fn topological_order(&self) -> Vec<&OperatorKey> {
        let mut in_degree: BTreeMap<&OperatorKey, usize> = self
            .ops
            .keys()
            .map(|k| (k, self.preds.get(k).map_or(0, |p| p.len())))
            .collect();
        let mut ready: BTreeSet<&OperatorKey> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut order = Vec::with_capacity(self.ops.len());
        while let Some(k) = ready.pop_first() {
            order.push(k);
            for s in self.succs.get(k).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(s) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(s);
                    }
                }
            }
        }
        order
    }

    /// Deterministic textual rendering. Each leaf is printed followed by its
    /// inputs, one nesting level (`|   `) deeper per hop towards the roots.
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();
        for leaf in self.leaves() {
            self.explain_from(&leaf.key, 0, &mut lines);
        }
        lines.join("\n")
    }

    fn explain_from(&self, key: &OperatorKey, depth: usize, out: &mut Vec<String>) {
        let Some(op) = self.ops.get(key) else {
            return;
        };
        out.push(format!("{}{}", EXPLAIN_INDENT.repeat(depth), op.name()));
        for p in self.preds.get(key).into_iter().flatten() {
            self.explain_from(p, depth + 1, out);
        }
    }

    fn reaches(&self, from: &OperatorKey, target: &OperatorKey) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(k) = stack.pop() {
            if k == target {
                return true;
            }
            if seen.insert(k) {
                stack.extend(self.succs.get(k).into_iter().flatten());
            }
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn inject_dangling_edge(&mut self, from: OperatorKey, to: OperatorKey) {
        self.succs.entry(from).or_default().insert(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::{FileSpec, OpKind};

    fn key(id: u64) -> OperatorKey {
        OperatorKey::new("t", id)
    }

    fn load(id: u64) -> PhysicalOperator {
        PhysicalOperator::new(
            key(id),
            OpKind::Load {
                file: FileSpec::new(format!("in{id}"), "PigStorage"),
            },
        )
    }

    fn filter(id: u64) -> PhysicalOperator {
        PhysicalOperator::new(
            key(id),
            OpKind::Filter {
                predicate: "$0 > 1".into(),
            },
        )
    }

    #[test]
    fn empty_plan_shape() {
        let p = PhasePlan::new();
        assert!(p.is_empty());
        assert_eq!(p.leaf_count(), 0);
        assert_eq!(p.explain(), "");
        assert!(p.is_connected());
    }

    #[test]
    fn connect_rejects_cycles_and_unknown_ends() {
        let mut p = PhasePlan::new();
        p.add(load(1)).unwrap();
        p.add(filter(2)).unwrap();
        p.connect(&key(1), &key(2)).unwrap();
        assert!(matches!(
            p.connect(&key(2), &key(1)),
            Err(Error::Construction(_))
        ));
        assert!(matches!(
            p.connect(&key(1), &key(7)),
            Err(Error::Construction(_))
        ));
        assert!(matches!(p.add(load(1)), Err(Error::Construction(_))));
        assert_eq!(p.leaf_count(), 1);
    }

    #[test]
    fn add_as_leaf_unions_all_leaves() {
        let mut p = PhasePlan::new();
        for id in 1..=3 {
            p.add(load(id)).unwrap();
        }
        assert_eq!(p.leaf_count(), 3);
        assert!(!p.is_connected());
        p.add_as_leaf(PhysicalOperator::union(key(10))).unwrap();
        let leaves = p.leaves();
        assert_eq!(leaves.len(), 1);
        assert!(leaves[0].is_union());
        assert_eq!(p.predecessors(&key(10)).len(), 3);
        assert!(p.is_connected());
    }

    #[test]
    fn validate_requires_one_component() {
        let mut p = PhasePlan::new();
        p.add(load(1)).unwrap();
        p.add(load(2)).unwrap();
        let err = p.validate().unwrap_err();
        assert!(matches!(err, Error::Construction(ref m) if m.contains("not connected")));
        p.add_as_leaf(PhysicalOperator::union(key(3))).unwrap();
        p.validate().unwrap();
    }

    #[test]
    fn add_as_leaf_refuses_inconsistent_plan() {
        let mut p = PhasePlan::new();
        p.add(load(1)).unwrap();
        p.inject_dangling_edge(key(1), key(99));
        let err = p.add_as_leaf(PhysicalOperator::union(key(10))).unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
        assert!(p.get(&key(10)).is_none());
    }

    #[test]
    fn explain_nests_inputs_under_leaves() {
        let mut p = PhasePlan::new();
        p.add(load(1)).unwrap();
        p.add(filter(2)).unwrap();
        p.connect(&key(1), &key(2)).unwrap();
        assert_eq!(
            p.explain(),
            "Filter[$0 > 1] - t-2\n|   Load(in1:PigStorage) - t-1"
        );
    }

    #[test]
    fn remove_drops_edges() {
        let mut p = PhasePlan::new();
        p.add(load(1)).unwrap();
        p.add(filter(2)).unwrap();
        p.connect(&key(1), &key(2)).unwrap();
        assert!(p.remove(&key(2)).is_some());
        assert!(p.successors(&key(1)).is_empty());
        assert_eq!(p.leaf_count(), 1);
        p.validate().unwrap();
    }

    #[test]
    fn topological_order_is_root_first() {
        let mut p = PhasePlan::new();
        p.add(filter(1)).unwrap();
        p.add(load(2)).unwrap();
        p.connect(&key(2), &key(1)).unwrap();
        let order: Vec<u64> = p.topological_order().iter().map(|k| k.id()).collect();
        assert_eq!(order, vec![2, 1]);
    }
}
