//! The job DAG handed to the submission layer.
//!
//! An edge `a -> b` means job `b` reads what job `a` writes, so `a` must
//! finish before `b` is submitted.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use mrplan_core::error::{Error, Result};
use mrplan_core::id::OperatorKey;

use crate::job::JobNode;
use crate::visitor::{JobVisitor, WalkOrder};

#[derive(Debug, Clone, Default)]
pub struct OperatorPlan {
    jobs: BTreeMap<OperatorKey, JobNode>,
    succs: BTreeMap<OperatorKey, BTreeSet<OperatorKey>>,
    preds: BTreeMap<OperatorKey, BTreeSet<OperatorKey>>,
}

impl OperatorPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, key: &OperatorKey) -> Option<&JobNode> {
        self.jobs.get(key)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobNode> {
        self.jobs.values()
    }

    pub fn add(&mut self, job: JobNode) -> Result<()> {
        let key = job.key().clone();
        if self.jobs.contains_key(&key) {
            return Err(Error::Construction(format!("duplicate job {key}")));
        }
        self.jobs.insert(key, job);
        Ok(())
    }

    /// `to` depends on `from`.
    pub fn connect(&mut self, from: &OperatorKey, to: &OperatorKey) -> Result<()> {
        for k in [from, to] {
            if !self.jobs.contains_key(k) {
                return Err(Error::Construction(format!("unknown job {k}")));
            }
        }
        if from == to || self.reaches(to, from) {
            return Err(Error::Construction(format!(
                "edge {from} -> {to} would create a cycle"
            )));
        }
        if !JobNode::SUPPORTS_MULTIPLE_INPUTS && self.preds.get(to).is_some_and(|p| !p.is_empty())
        {
            return Err(Error::Construction(format!("{to} takes a single input")));
        }
        if !JobNode::SUPPORTS_MULTIPLE_OUTPUTS
            && self.succs.get(from).is_some_and(|s| !s.is_empty())
        {
            return Err(Error::Construction(format!("{from} has a single output")));
        }
        self.succs.entry(from.clone()).or_default().insert(to.clone());
        self.preds.entry(to.clone()).or_default().insert(from.clone());
        Ok(())
    }

    pub fn predecessors(&self, key: &OperatorKey) -> Vec<&OperatorKey> {
        self.preds.get(key).into_iter().flatten().collect()
    }

    pub fn successors(&self, key: &OperatorKey) -> Vec<&OperatorKey> {
        self.succs.get(key).into_iter().flatten().collect()
    }

    /// Jobs with no producers.
    pub fn roots(&self) -> Vec<&OperatorKey> {
        self.jobs
            .keys()
            .filter(|k| self.preds.get(*k).map_or(true, BTreeSet::is_empty))
            .collect()
    }

    /// Jobs nothing else reads from.
    pub fn leaves(&self) -> Vec<&OperatorKey> {
        self.jobs
            .keys()
            .filter(|k| self.succs.get(*k).map_or(true, BTreeSet::is_empty))
            .collect()
    }

    /// Producers before consumers; ties broken by key.
    pub fn submission_order(&self) -> Result<Vec<&OperatorKey>> {
        let mut in_degree: BTreeMap<&OperatorKey, usize> = self
            .jobs
            .keys()
            .map(|k| (k, self.preds.get(k).map_or(0, BTreeSet::len)))
            .collect();
        let mut ready: BTreeSet<&OperatorKey> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();

        let mut order = Vec::with_capacity(self.jobs.len());
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
        if order.len() != self.jobs.len() {
            return Err(Error::Invariant("job plan contains a cycle".into()));
        }
        Ok(order)
    }

    /// Every job that transitively depends on `key`, excluding `key`.
    pub fn dependents(&self, key: &OperatorKey) -> BTreeSet<OperatorKey> {
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<&OperatorKey> = self.succs.get(key).into_iter().flatten().collect();
        while let Some(k) = queue.pop_front() {
            if out.insert(k.clone()) {
                queue.extend(self.succs.get(k).into_iter().flatten());
            }
        }
        out
    }

    /// Present every job to `visitor` once, in `order`.
    pub fn walk(&self, visitor: &mut dyn JobVisitor, order: WalkOrder) -> Result<()> {
        let mut keys = self.submission_order()?;
        if order == WalkOrder::ReverseDependency {
            keys.reverse();
        }
        for k in keys {
            if let Some(job) = self.jobs.get(k) {
                job.visit(visitor)?;
            }
        }
        Ok(())
    }

    /// Names of all jobs in submission order, blank-line separated.
    pub fn explain(&self) -> Result<String> {
        let mut names = Vec::with_capacity(self.jobs.len());
        self.walk(
            &mut |job: &JobNode| -> Result<()> {
                names.push(job.name());
                Ok(())
            },
            WalkOrder::Dependency,
        )?;
        Ok(names.join("\n\n"))
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
}
