//! Serialized form of a frozen job, as handed to the submission layer.
//!
//! The digest covers the phase plans and annotations; two jobs with the
//! same digest run the same work.

use mrplan_core::error::Result;
use mrplan_core::hash::{hash_serde, Hash256};
use mrplan_core::id::OperatorKey;
use mrplan_operators::physical::PhysicalOperator;
use mrplan_operators::plan::PhasePlan;
use serde::{Deserialize, Serialize};

use crate::job::{JobAnnotations, JobNode};

/// Operators of one phase in topological order plus the edge list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseManifest {
    pub operators: Vec<PhysicalOperator>,
    pub edges: Vec<(OperatorKey, OperatorKey)>,
}

impl PhaseManifest {
    pub fn of(plan: &PhasePlan) -> Self {
        let order = plan.topological_order();
        let operators = order.iter().filter_map(|k| plan.get(k)).cloned().collect();
        let edges = order
            .iter()
            .flat_map(|from| {
                plan.successors(from)
                    .into_iter()
                    .map(move |to| ((*from).clone(), to.clone()))
            })
            .collect();
        Self { operators, edges }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub key: OperatorKey,
    pub name: String,
    pub engine_version: String,
    pub annotations: JobAnnotations,
    pub map: PhaseManifest,
    pub combine: PhaseManifest,
    pub reduce: PhaseManifest,
    pub digest: Hash256,
}

#[derive(Serialize)]
struct DigestInput<'a> {
    annotations: &'a JobAnnotations,
    map: &'a PhaseManifest,
    combine: &'a PhaseManifest,
    reduce: &'a PhaseManifest,
}

impl JobManifest {
    pub fn of(job: &JobNode) -> Result<Self> {
        let map = PhaseManifest::of(job.map_plan());
        let combine = PhaseManifest::of(job.combine_plan());
        let reduce = PhaseManifest::of(job.reduce_plan());
        let digest = hash_serde(&DigestInput {
            annotations: job.annotations(),
            map: &map,
            combine: &combine,
            reduce: &reduce,
        })?;
        Ok(Self {
            key: job.key().clone(),
            name: job.name(),
            engine_version: mrplan_core::VERSION.to_string(),
            annotations: job.annotations().clone(),
            map,
            combine,
            reduce,
            digest,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
