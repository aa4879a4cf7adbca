//! Job nodes: the unit of distributed execution.
//!
//! Optimizer passes work on a mutable [`JobNodeBuilder`]. Once both phase
//! latches are set the builder is frozen into a validated, immutable
//! [`JobNode`], which is what explanation, manifests and submission see.

use mrplan_core::error::{Error, Result};
use mrplan_core::id::{NodeIdGenerator, OperatorKey};
use mrplan_core::schema::DataType;
use mrplan_operators::physical::{FileSpec, PhysicalOperator};
use mrplan_operators::plan::{PhasePlan, EXPLAIN_INDENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::visitor::JobVisitor;

/// Rendered in place of an empty map plan.
pub const MAP_PLAN_EMPTY: &str = "Map Plan Empty";
/// Rendered in place of an empty reduce plan.
pub const REDUCE_PLAN_EMPTY: &str = "Reduce Plan Empty";

/// Optimizer-assigned execution strategy metadata of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobAnnotations {
    /// How an absent map key is materialized for the shuffle.
    pub map_key_type: DataType,

    pub global_sort: bool,
    pub limit_after_sort: bool,
    pub limit_only: bool,
    pub needs_distinct_combiner: bool,
    pub use_secondary_key: bool,
    pub frjoin: bool,
    /// Set by the join compiler; must agree with `skewed_join_partition_file`.
    pub skewed_join: bool,
    /// The job ends at a multi-way split.
    pub splitter: bool,
    pub end_of_all_input_in_map: bool,
    pub end_of_all_input_in_reduce: bool,

    pub sort_order: Option<Vec<bool>>,
    pub secondary_sort_order: Option<Vec<bool>>,
    /// Arity of the shuffle key, when known.
    pub key_arity: Option<usize>,
    pub secondary_key_arity: Option<usize>,

    pub quant_file: Option<String>,
    pub skewed_join_partition_file: Option<String>,

    /// Replicated inputs of a fragment-replicate join; the fragment's own
    /// slot is empty.
    pub repl_files: Vec<Option<FileSpec>>,
    pub fragment: Option<usize>,

    pub requested_parallelism: Option<u32>,
    pub limit: Option<u64>,

    /// Fully qualified user function names, in first-reference order.
    pub udfs: Vec<String>,
}

impl JobAnnotations {
    pub fn is_skewed_join(&self) -> bool {
        self.skewed_join_partition_file.is_some()
    }

    /// Short UDF names: last `.` segment, de-duplicated, first occurrence wins.
    pub fn udf_short_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for udf in &self.udfs {
            let short = udf.rsplit('.').next().unwrap_or(udf.as_str());
            if !out.contains(&short) {
                out.push(short);
            }
        }
        out
    }

    /// Static consistency checks run when a job is frozen.
    pub fn validate(&self) -> Result<()> {
        if self.skewed_join != self.is_skewed_join() {
            return Err(Error::Validation(format!(
                "skewed join flag is {} but partition file is {}",
                self.skewed_join,
                if self.is_skewed_join() { "set" } else { "unset" }
            )));
        }
        if self.global_sort && self.quant_file.is_none() {
            return Err(Error::Validation(
                "global sort requires a quantile file".into(),
            ));
        }
        check_order_arity("sort order", self.sort_order.as_deref(), self.key_arity)?;
        if self.secondary_sort_order.is_some() && !self.use_secondary_key {
            return Err(Error::Validation(
                "secondary sort order set without a secondary key".into(),
            ));
        }
        check_order_arity(
            "secondary sort order",
            self.secondary_sort_order.as_deref(),
            self.secondary_key_arity,
        )?;
        if self.frjoin {
            let Some(fragment) = self.fragment else {
                return Err(Error::Validation(
                    "fragment-replicate join without a fragment index".into(),
                ));
            };
            match self.repl_files.get(fragment) {
                None => {
                    return Err(Error::Validation(format!(
                        "fragment {fragment} out of range for {} join inputs",
                        self.repl_files.len()
                    )))
                }
                Some(Some(f)) => {
                    return Err(Error::Validation(format!(
                        "fragment {fragment} must not be replicated, found {f}"
                    )))
                }
                Some(None) => {}
            }
        }
        if self.requested_parallelism == Some(0) {
            return Err(Error::Validation(
                "requested parallelism must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn check_order_arity(what: &str, order: Option<&[bool]>, arity: Option<usize>) -> Result<()> {
    if let (Some(order), Some(arity)) = (order, arity) {
        if order.len() != arity {
            return Err(Error::Validation(format!(
                "{what} has {} columns but the key has {arity}",
                order.len()
            )));
        }
    }
    Ok(())
}

/// Mutable job node used while optimizer passes run.
#[derive(Debug, Clone)]
pub struct JobNodeBuilder {
    key: OperatorKey,
    map_plan: PhasePlan,
    combine_plan: PhasePlan,
    reduce_plan: PhasePlan,
    map_done: bool,
    reduce_done: bool,
    annotations: JobAnnotations,
}

impl JobNodeBuilder {
    pub fn new(key: OperatorKey) -> Self {
        Self {
            key,
            map_plan: PhasePlan::new(),
            combine_plan: PhasePlan::new(),
            reduce_plan: PhasePlan::new(),
            map_done: false,
            reduce_done: false,
            annotations: JobAnnotations::default(),
        }
    }

    pub fn key(&self) -> &OperatorKey {
        &self.key
    }

    pub fn map_plan(&self) -> &PhasePlan {
        &self.map_plan
    }

    pub fn combine_plan(&self) -> &PhasePlan {
        &self.combine_plan
    }

    pub fn reduce_plan(&self) -> &PhasePlan {
        &self.reduce_plan
    }

    /// Mutable map plan; refused once the map latch is set.
    pub fn map_plan_mut(&mut self) -> Result<&mut PhasePlan> {
        if self.map_done {
            return Err(Error::Construction(format!(
                "{}: map plan is sealed",
                self.key
            )));
        }
        Ok(&mut self.map_plan)
    }

    /// Mutable combine plan; refused once the reduce latch is set.
    pub fn combine_plan_mut(&mut self) -> Result<&mut PhasePlan> {
        if self.reduce_done {
            return Err(Error::Construction(format!(
                "{}: combine plan is sealed",
                self.key
            )));
        }
        Ok(&mut self.combine_plan)
    }

    /// Mutable reduce plan; refused once the reduce latch is set.
    pub fn reduce_plan_mut(&mut self) -> Result<&mut PhasePlan> {
        if self.reduce_done {
            return Err(Error::Construction(format!(
                "{}: reduce plan is sealed",
                self.key
            )));
        }
        Ok(&mut self.reduce_plan)
    }

    pub fn annotations(&self) -> &JobAnnotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut JobAnnotations {
        &mut self.annotations
    }

    pub fn is_map_done(&self) -> bool {
        self.map_done
    }

    pub fn is_reduce_done(&self) -> bool {
        self.reduce_done
    }

    /// Set the map latch without touching the plan.
    pub fn set_map_done(&mut self, done: bool) -> Result<()> {
        self.check_latch("map", self.map_done, done)?;
        self.map_done = done;
        Ok(())
    }

    /// Seal the map phase, merging more than one leaf under a union.
    pub fn set_map_done_single(&mut self, done: bool, ids: &mut NodeIdGenerator) -> Result<()> {
        self.seal_map(done, 2, ids)
    }

    /// Seal the map phase, placing a union under any existing leaves. Used
    /// when the job has several inputs whose streams are always merged.
    pub fn set_map_done_multiple(&mut self, done: bool, ids: &mut NodeIdGenerator) -> Result<()> {
        self.seal_map(done, 1, ids)
    }

    /// Seal the reduce phase, merging more than one leaf under a union.
    pub fn set_reduce_done(&mut self, done: bool, ids: &mut NodeIdGenerator) -> Result<()> {
        self.check_latch("reduce", self.reduce_done, done)?;
        if !done || self.reduce_done {
            return Ok(());
        }
        if self.reduce_plan.leaf_count() > 1 {
            let key = self.key.clone();
            append_union(&mut self.reduce_plan, &key, ids)?;
        }
        self.reduce_done = true;
        Ok(())
    }

    fn seal_map(&mut self, done: bool, union_at: usize, ids: &mut NodeIdGenerator) -> Result<()> {
        self.check_latch("map", self.map_done, done)?;
        if !done || self.map_done {
            return Ok(());
        }
        if self.map_plan.leaf_count() >= union_at {
            let key = self.key.clone();
            append_union(&mut self.map_plan, &key, ids)?;
        }
        self.map_done = true;
        Ok(())
    }

    fn check_latch(&self, phase: &str, current: bool, requested: bool) -> Result<()> {
        if current && !requested {
            return Err(Error::Construction(format!(
                "{}: {phase} phase is already done and cannot be reopened",
                self.key
            )));
        }
        Ok(())
    }

    pub fn is_global_sort(&self) -> bool {
        self.annotations.global_sort
    }

    pub fn set_global_sort(&mut self, global_sort: bool) {
        self.annotations.global_sort = global_sort;
    }

    pub fn is_skewed_join(&self) -> bool {
        self.annotations.is_skewed_join()
    }

    pub fn set_skewed_join(&mut self, skewed_join: bool) {
        self.annotations.skewed_join = skewed_join;
    }

    pub fn set_skewed_join_partition_file(&mut self, path: Option<String>) {
        self.annotations.skewed_join_partition_file = path;
    }

    pub fn is_frjoin(&self) -> bool {
        self.annotations.frjoin
    }

    /// Mark the job as a fragment-replicate join. `repl_files` holds one slot
    /// per join input with the streamed `fragment` slot left empty.
    pub fn set_frjoin(&mut self, repl_files: Vec<Option<FileSpec>>, fragment: usize) {
        self.annotations.frjoin = true;
        self.annotations.repl_files = repl_files;
        self.annotations.fragment = Some(fragment);
    }

    pub fn set_quant_file(&mut self, path: impl Into<String>) {
        self.annotations.quant_file = Some(path.into());
    }

    /// Store a copy of `order`. `None` leaves the current order untouched.
    pub fn set_sort_order(&mut self, order: Option<&[bool]>) {
        if let Some(order) = order {
            self.annotations.sort_order = Some(order.to_vec());
        }
    }

    /// Store a copy of `order`. `None` leaves the current order untouched.
    pub fn set_secondary_sort_order(&mut self, order: Option<&[bool]>) {
        if let Some(order) = order {
            self.annotations.secondary_sort_order = Some(order.to_vec());
        }
    }

    pub fn sort_order(&self) -> Option<&[bool]> {
        self.annotations.sort_order.as_deref()
    }

    pub fn secondary_sort_order(&self) -> Option<&[bool]> {
        self.annotations.secondary_sort_order.as_deref()
    }

    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.annotations.limit = limit;
    }

    pub fn set_requested_parallelism(&mut self, parallelism: Option<u32>) {
        self.annotations.requested_parallelism = parallelism;
    }

    /// Record a user function reference; repeats are ignored.
    pub fn add_udf(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.annotations.udfs.contains(&name) {
            self.annotations.udfs.push(name);
        }
    }

    /// Record every user function referenced by operators of the three phases.
    pub fn collect_plan_udfs(&mut self) {
        let found: Vec<String> = [&self.map_plan, &self.combine_plan, &self.reduce_plan]
            .into_iter()
            .flat_map(|p| p.operators())
            .flat_map(PhysicalOperator::udfs)
            .cloned()
            .collect();
        for udf in found {
            self.add_udf(udf);
        }
    }

    pub fn name(&self) -> String {
        render_name(&self.key, &self.annotations, &self.map_plan, &self.reduce_plan)
    }

    /// Validate and seal the job.
    pub fn freeze(self) -> Result<JobNode> {
        if !self.map_done || !self.reduce_done {
            return Err(self.rejected(Error::Validation(format!(
                "{}: both phases must be done before freezing (map={}, reduce={})",
                self.key, self.map_done, self.reduce_done
            ))));
        }
        for (phase, plan) in [
            ("map", &self.map_plan),
            ("combine", &self.combine_plan),
            ("reduce", &self.reduce_plan),
        ] {
            if phase != "combine" && plan.leaf_count() > 1 {
                return Err(self.rejected(Error::Validation(format!(
                    "{}: {phase} plan has {} leaves, expected at most one",
                    self.key,
                    plan.leaf_count()
                ))));
            }
            if let Err(e) = plan.validate() {
                warn!(job = %self.key, phase, "phase plan failed validation");
                return Err(self.rejected(e));
            }
        }
        if let Err(e) = self.annotations.validate() {
            return Err(self.rejected(e));
        }
        debug!(
            job = %self.key,
            map_ops = self.map_plan.len(),
            combine_ops = self.combine_plan.len(),
            reduce_ops = self.reduce_plan.len(),
            skewed_join = self.annotations.is_skewed_join(),
            global_sort = self.annotations.global_sort,
            "job frozen"
        );
        Ok(JobNode {
            key: self.key,
            map_plan: self.map_plan,
            combine_plan: self.combine_plan,
            reduce_plan: self.reduce_plan,
            annotations: self.annotations,
        })
    }

    fn rejected(&self, e: Error) -> Error {
        warn!(job = %self.key, error = %e, "job rejected");
        e
    }
}

fn append_union(plan: &mut PhasePlan, job: &OperatorKey, ids: &mut NodeIdGenerator) -> Result<()> {
    let union = PhysicalOperator::union(ids.next_key(job.scope()));
    debug!(
        job = %job,
        union = %union.key,
        leaves = plan.leaf_count(),
        "inserting union leaf"
    );
    plan.add_as_leaf(union)
}

/// Validated, immutable job node.
#[derive(Debug, Clone, PartialEq)]
pub struct JobNode {
    key: OperatorKey,
    map_plan: PhasePlan,
    combine_plan: PhasePlan,
    reduce_plan: PhasePlan,
    annotations: JobAnnotations,
}

impl JobNode {
    /// Several jobs may feed this one.
    pub const SUPPORTS_MULTIPLE_INPUTS: bool = true;
    /// This job may feed several others.
    pub const SUPPORTS_MULTIPLE_OUTPUTS: bool = true;

    pub fn key(&self) -> &OperatorKey {
        &self.key
    }

    pub fn map_plan(&self) -> &PhasePlan {
        &self.map_plan
    }

    pub fn combine_plan(&self) -> &PhasePlan {
        &self.combine_plan
    }

    pub fn reduce_plan(&self) -> &PhasePlan {
        &self.reduce_plan
    }

    pub fn annotations(&self) -> &JobAnnotations {
        &self.annotations
    }

    pub fn has_combiner(&self) -> bool {
        !self.combine_plan.is_empty()
    }

    pub fn is_global_sort(&self) -> bool {
        self.annotations.global_sort
    }

    pub fn is_skewed_join(&self) -> bool {
        self.annotations.is_skewed_join()
    }

    pub fn is_frjoin(&self) -> bool {
        self.annotations.frjoin
    }

    pub fn sort_order(&self) -> Option<&[bool]> {
        self.annotations.sort_order.as_deref()
    }

    pub fn requested_parallelism(&self) -> Option<u32> {
        self.annotations.requested_parallelism
    }

    pub fn name(&self) -> String {
        render_name(&self.key, &self.annotations, &self.map_plan, &self.reduce_plan)
    }

    /// Hand this node to `visitor`. Exactly one call, no traversal.
    pub fn visit(&self, visitor: &mut dyn JobVisitor) -> Result<()> {
        visitor.visit_job(self)
    }
}

/// `MapReduce(<parallelism>[,<udfs>]) - <key>:` followed by the reduce plan
/// and then the map plan, each indented one level.
fn render_name(
    key: &OperatorKey,
    ann: &JobAnnotations,
    map: &PhasePlan,
    reduce: &PhasePlan,
) -> String {
    let parallelism = ann
        .requested_parallelism
        .map_or_else(|| "-1".to_string(), |p| p.to_string());
    let udfs = ann.udf_short_names();
    let mut out = format!("MapReduce({parallelism}");
    if !udfs.is_empty() {
        out.push(',');
        out.push_str(&udfs.join(","));
    }
    out.push_str(&format!(") - {key}:\n"));
    out.push_str(&shifted_explain(reduce, REDUCE_PLAN_EMPTY));
    out.push('\n');
    out.push_str(&shifted_explain(map, MAP_PLAN_EMPTY));
    out
}

fn shifted_explain(plan: &PhasePlan, placeholder: &str) -> String {
    if plan.is_empty() {
        return placeholder.to_string();
    }
    plan.explain()
        .lines()
        .map(|l| format!("{EXPLAIN_INDENT}{l}"))
        .collect::<Vec<_>>()
        .join("\n")
}
