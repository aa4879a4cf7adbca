//! Traversal hooks over job nodes.

use mrplan_core::error::Result;

use crate::job::JobNode;

/// Anything that wants to look at job nodes during a plan walk.
pub trait JobVisitor {
    fn visit_job(&mut self, job: &JobNode) -> Result<()>;
}

impl<F> JobVisitor for F
where
    F: FnMut(&JobNode) -> Result<()>,
{
    fn visit_job(&mut self, job: &JobNode) -> Result<()> {
        self(job)
    }
}

/// Order in which [`crate::plan::OperatorPlan::walk`] presents nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// Producers before consumers (submission order).
    #[default]
    Dependency,
    /// Consumers before producers.
    ReverseDependency,
}
