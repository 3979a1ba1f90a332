//! Blocking dependencies between issues.
//!
//! A dependency row `(issue, depends_on)` reads "issue is blocked by
//! depends_on". Listings are anchored on one issue:
//!
//! - `list_blocked_by(A)`: every `B` with a row `(A, B)`
//! - `list_blocking(A)`: every `B` with a row `(B, A)`

use petgraph::Direction;
use std::sync::Arc;

use super::{check_endpoints, CyclePolicy, EdgeSet, Verdict};
use crate::domain::{DependencyDirection, DependencyEdge, Issue, UserId};
use crate::error::{Error, Result};
use crate::platform::{AuthorizationGate, Platform};
use crate::store::{EdgeStore, PairKind};

/// Service for blocking dependencies.
#[derive(Clone)]
pub struct DependencyGraph {
    edges: EdgeSet,
    gate: Arc<dyn AuthorizationGate>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("policy", &self.edges.policy)
            .finish_non_exhaustive()
    }
}

impl DependencyGraph {
    /// Create a dependency service over `store`, using the direct cycle policy.
    #[must_use]
    pub fn new(store: Arc<EdgeStore>, platform: &Platform) -> Self {
        Self {
            edges: EdgeSet {
                kind: PairKind::Dependency,
                store,
                issues: Arc::clone(&platform.issues),
                policy: CyclePolicy::default(),
            },
            gate: Arc::clone(&platform.gate),
        }
    }

    /// Use `policy` for cycle detection.
    #[must_use]
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.edges.policy = policy;
        self
    }

    async fn authorize(&self, actor: UserId, issue: &Issue) -> Result<()> {
        if self.gate.can_manage_dependencies(issue.repo_id, actor).await {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                actor,
                repo: issue.repo_id,
                action: "manage dependencies",
            })
        }
    }

    /// Record that `issue` is blocked by `depends_on`.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied` if the gate refuses the actor
    /// - `CrossRepository` / `SameIssue` for invalid endpoints
    /// - `DependencyExists` if the edge is already stored
    /// - `CircularDependency` if `depends_on` already leads back to `issue`
    pub async fn add_dependency(
        &self,
        actor: UserId,
        issue: &Issue,
        depends_on: &Issue,
    ) -> Result<DependencyEdge> {
        self.authorize(actor, issue).await?;
        check_endpoints(issue, depends_on)?;

        let (issue_id, depends_on_id) = (issue.id, depends_on.id);
        let edge = self
            .edges
            .insert(actor, issue_id, depends_on_id, |verdict| match verdict {
                Verdict::Cycle => Error::CircularDependency {
                    issue: issue_id,
                    depends_on: depends_on_id,
                },
                Verdict::Accept | Verdict::Duplicate => Error::DependencyExists {
                    issue: issue_id,
                    depends_on: depends_on_id,
                },
            })?;
        Ok(edge.into())
    }

    /// Remove a dependency between `issue` and `other`.
    ///
    /// With [`DependencyDirection::BlockedBy`] the row `(issue, other)` is
    /// removed; with [`DependencyDirection::Blocking`] the row `(other, issue)`.
    ///
    /// # Errors
    ///
    /// Returns `DependencyNotExists` if no such row is stored.
    pub async fn remove_dependency(
        &self,
        actor: UserId,
        issue: &Issue,
        other: &Issue,
        direction: DependencyDirection,
    ) -> Result<()> {
        self.authorize(actor, issue).await?;

        let (blocked, blocker) = match direction {
            DependencyDirection::BlockedBy => (issue.id, other.id),
            DependencyDirection::Blocking => (other.id, issue.id),
        };
        self.edges.delete(actor, blocked, blocker, || Error::DependencyNotExists {
            issue: blocked,
            depends_on: blocker,
        })
    }

    /// Issues that `issue` blocks.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if a stored edge points at a missing issue.
    pub async fn list_blocking(&self, issue: &Issue) -> Result<Vec<Issue>> {
        self.edges.related(issue.id, Direction::Incoming).await
    }

    /// Issues that block `issue`.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if a stored edge points at a missing issue.
    pub async fn list_blocked_by(&self, issue: &Issue) -> Result<Vec<Issue>> {
        self.edges.related(issue.id, Direction::Outgoing).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;

    #[tokio::test]
    async fn blocked_by_and_blocking_are_mirror_images() {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        let a = host.add_issue(repo.id, "A");
        let b = host.add_issue(repo.id, "B");

        let store = Arc::new(EdgeStore::open_in_memory().unwrap());
        let graph = DependencyGraph::new(store, &host.platform());
        graph.add_dependency(UserId::new(1), &a, &b).await.unwrap();

        assert_eq!(graph.list_blocked_by(&a).await.unwrap(), vec![b.clone()]);
        assert_eq!(graph.list_blocking(&b).await.unwrap(), vec![a.clone()]);
        assert!(graph.list_blocking(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocking_direction_removes_the_reverse_row() {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        let a = host.add_issue(repo.id, "A");
        let b = host.add_issue(repo.id, "B");

        let store = Arc::new(EdgeStore::open_in_memory().unwrap());
        let graph = DependencyGraph::new(store, &host.platform());
        graph.add_dependency(UserId::new(1), &a, &b).await.unwrap();

        // From b's point of view, b is blocking a.
        graph
            .remove_dependency(UserId::new(1), &b, &a, DependencyDirection::Blocking)
            .await
            .unwrap();
        assert!(graph.list_blocked_by(&a).await.unwrap().is_empty());
    }
}
