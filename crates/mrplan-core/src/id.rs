//! Strongly-typed operator identities and the allocator that mints them.
//!
//! Every operator (physical operator inside a phase plan, or a job node in the
//! job graph) is identified by a scope-qualified key. Keys are minted by a
//! [`NodeIdGenerator`] owned by the compile context and threaded to whatever
//! synthesizes new operators, so id sequences are reproducible per compile.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique, scope-qualified operator key. Renders as `scope-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorKey {
    scope: String,
    id: u64,
}

impl OperatorKey {
    pub fn new(scope: impl Into<String>, id: u64) -> Self {
        Self {
            scope: scope.into(),
            id,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scope, self.id)
    }
}

/// Per-scope monotonic id allocator.
///
/// Not a singleton: create one per compilation and pass it by `&mut`.
#[derive(Debug, Clone, Default)]
pub struct NodeIdGenerator {
    next: BTreeMap<String, u64>,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused id in `scope`. Ids start at 1.
    pub fn next_node_id(&mut self, scope: &str) -> u64 {
        let slot = self.next.entry(scope.to_string()).or_insert(1);
        let id = *slot;
        *slot += 1;
        id
    }

    /// Mint a fresh key in `scope`.
    pub fn next_key(&mut self, scope: &str) -> OperatorKey {
        let id = self.next_node_id(scope);
        OperatorKey::new(scope, id)
    }

    /// Make sure ids handed out later in `scope` stay above `id`
    /// (used when keys were assigned elsewhere, e.g. by the plan builder).
    pub fn reserve_through(&mut self, scope: &str, id: u64) {
        let slot = self.next.entry(scope.to_string()).or_insert(1);
        if *slot <= id {
            *slot = id + 1;
        }
    }
}
