//! Dependency-ordered job submission.
//!
//! Jobs are submitted in [`OperatorPlan::submission_order`]. When a job
//! fails, every job that transitively depends on it is marked skipped and
//! never submitted; unrelated jobs still run.

use std::collections::BTreeMap;

use mrplan_core::error::{Error, ErrorSource, Result};
use mrplan_core::id::OperatorKey;
use mrplan_planner::job::JobNode;
use mrplan_planner::manifest::JobManifest;
use mrplan_planner::plan::OperatorPlan;
use tracing::{debug, warn};

use crate::failpoints;
use crate::metrics::emit_span;

/// The external execution engine.
pub trait JobSubmitter {
    /// Run `job` to completion.
    fn submit(&mut self, job: &JobNode, manifest: &JobManifest) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { attempts: u32 },
    Failed { error: String, attempts: u32 },
    /// Not submitted because `cause` (a producer) did not succeed.
    Skipped { cause: OperatorKey },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Attempts per job for remote (engine-side) failures.
    pub max_attempts: u32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    /// Outcome per job, in submission order.
    pub outcomes: Vec<(OperatorKey, JobOutcome)>,
}

impl LaunchReport {
    pub fn outcome(&self, key: &OperatorKey) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &OperatorKey> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, JobOutcome::Failed { .. }))
            .map(|(k, _)| k)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobLauncher {
    cfg: LaunchConfig,
}

impl JobLauncher {
    pub fn new(cfg: LaunchConfig) -> Self {
        Self { cfg }
    }

    /// Submit every job of `plan`. Errors only when the plan itself is
    /// inconsistent; job failures are reported in the [`LaunchReport`].
    pub fn launch(
        &self,
        plan: &OperatorPlan,
        submitter: &mut dyn JobSubmitter,
    ) -> Result<LaunchReport> {
        let order = plan.submission_order()?;
        let mut blocked: BTreeMap<OperatorKey, OperatorKey> = BTreeMap::new();
        let mut report = LaunchReport::default();

        for key in order {
            if let Some(cause) = blocked.get(key) {
                debug!(job = %key, cause = %cause, "skipping job");
                report.outcomes.push((
                    key.clone(),
                    JobOutcome::Skipped {
                        cause: cause.clone(),
                    },
                ));
                continue;
            }
            let Some(job) = plan.get(key) else {
                return Err(Error::Invariant(format!("job {key} missing from plan")));
            };

            let outcome = self.run_job(job, submitter)?;
            if !outcome.is_success() {
                for dep in plan.dependents(key) {
                    blocked.entry(dep).or_insert_with(|| key.clone());
                }
            }
            report.outcomes.push((key.clone(), outcome));
        }

        let failed = report.failed().count();
        let skipped = report
            .outcomes
            .iter()
            .filter(|(_, o)| matches!(o, JobOutcome::Skipped { .. }))
            .count();
        emit_span(
            "launch",
            &[
                ("jobs", report.outcomes.len().to_string()),
                ("failed", failed.to_string()),
                ("skipped", skipped.to_string()),
            ],
        );
        Ok(report)
    }

    fn run_job(&self, job: &JobNode, submitter: &mut dyn JobSubmitter) -> Result<JobOutcome> {
        let manifest = JobManifest::of(job)?;
        let max_attempts = self.cfg.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!(
                job = %job.key(),
                attempt = attempts,
                digest = %manifest.digest,
                "submitting job"
            );
            let result = failpoints::check(&format!("submit:{}", job.key()))
                .map_err(Error::from)
                .and_then(|()| submitter.submit(job, &manifest));
            match result {
                Ok(()) => {
                    debug!(job = %job.key(), attempts, "job succeeded");
                    return Ok(JobOutcome::Succeeded { attempts });
                }
                Err(e) if is_retryable(&e) && attempts < max_attempts => {
                    warn!(job = %job.key(), attempt = attempts, error = %e, "job failed, retrying");
                }
                Err(e) => {
                    warn!(job = %job.key(), attempts, error = %e, "job failed");
                    return Ok(JobOutcome::Failed {
                        error: e.to_string(),
                        attempts,
                    });
                }
            }
        }
    }
}

/// Only engine-side failures are retried; plan errors never are.
fn is_retryable(e: &Error) -> bool {
    matches!(e, Error::Exec(x) if x.source_kind() == ErrorSource::Remote)
}
