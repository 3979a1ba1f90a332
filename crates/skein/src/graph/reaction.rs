//! Group reactions: parent/child trees of issues.

use petgraph::Direction;
use std::sync::Arc;

use super::{check_endpoints, CyclePolicy, EdgeSet, Verdict};
use crate::domain::{Issue, ReactionEdge, UserId};
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::store::{EdgeStore, PairKind};

/// Service for group-reaction edges.
#[derive(Clone)]
pub struct ReactionTree {
    edges: EdgeSet,
}

impl std::fmt::Debug for ReactionTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionTree")
            .field("policy", &self.edges.policy)
            .finish_non_exhaustive()
    }
}

impl ReactionTree {
    /// Create a reaction service over `store`, using the direct cycle policy.
    #[must_use]
    pub fn new(store: Arc<EdgeStore>, platform: &Platform) -> Self {
        Self {
            edges: EdgeSet {
                kind: PairKind::GroupReaction,
                store,
                issues: Arc::clone(&platform.issues),
                policy: CyclePolicy::default(),
            },
        }
    }

    /// Use `policy` for cycle detection.
    #[must_use]
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.edges.policy = policy;
        self
    }

    /// Make `child` a child of `issue`.
    ///
    /// # Errors
    ///
    /// - `CrossRepository` / `SameIssue` for invalid endpoints
    /// - `GroupReactionExists` if the edge is already stored
    /// - `CircularGroupReaction` if `child` already leads back to `issue`
    pub fn add_reaction(&self, actor: UserId, issue: &Issue, child: &Issue) -> Result<ReactionEdge> {
        check_endpoints(issue, child)?;

        let (issue_id, child_id) = (issue.id, child.id);
        let edge = self
            .edges
            .insert(actor, issue_id, child_id, |verdict| match verdict {
                Verdict::Cycle => Error::CircularGroupReaction {
                    issue: issue_id,
                    child: child_id,
                },
                Verdict::Accept | Verdict::Duplicate => Error::GroupReactionExists {
                    issue: issue_id,
                    child: child_id,
                },
            })?;
        Ok(edge.into())
    }

    /// Detach `child` from `issue`.
    ///
    /// # Errors
    ///
    /// Returns `GroupReactionNotExists` if `child` is not a child of `issue`.
    pub fn remove_reaction(&self, actor: UserId, issue: &Issue, child: &Issue) -> Result<()> {
        let (issue_id, child_id) = (issue.id, child.id);
        self.edges.delete(actor, issue_id, child_id, || Error::GroupReactionNotExists {
            issue: issue_id,
            child: child_id,
        })
    }

    /// Children of `issue`, oldest edge first.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if a stored edge points at a missing issue.
    pub async fn list_children(&self, issue: &Issue) -> Result<Vec<Issue>> {
        self.edges.related(issue.id, Direction::Outgoing).await
    }

    /// Parents of `issue`, oldest edge first.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if a stored edge points at a missing issue.
    pub async fn list_parents(&self, issue: &Issue) -> Result<Vec<Issue>> {
        self.edges.related(issue.id, Direction::Incoming).await
    }
}
