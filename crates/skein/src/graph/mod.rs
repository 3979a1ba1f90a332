//! Issue-to-issue relations: blocking dependencies and group reactions.
//!
//! Both relations are directed edges between two issues of the same
//! repository, guarded against duplicates and cycles by the same rules. The
//! shared mechanics live in `EdgeSet`; [`DependencyGraph`] and
//! [`ReactionTree`] add the relation-specific errors and vocabulary.
//!
//! ## Module Structure
//!
//! - `cycle` - Duplicate/cycle classification and the transitive policy
//! - `dependency` - Blocking dependencies
//! - `reaction` - Group-reaction parent/child trees

pub mod cycle;
pub mod dependency;
pub mod reaction;

pub use cycle::{CyclePolicy, Verdict};
pub use dependency::DependencyGraph;
pub use reaction::ReactionTree;

use petgraph::Direction;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{Issue, IssueId, UserId};
use crate::error::{EntityRef, Error, Result};
use crate::platform::IssueLookup;
use crate::store::{EdgeStore, PairEdge, PairKind, StoreError};

/// Both ends of an issue-to-issue edge must be distinct issues of one
/// repository.
fn check_endpoints(issue: &Issue, other: &Issue) -> Result<()> {
    if issue.repo_id != other.repo_id {
        return Err(Error::CrossRepository {
            issue: issue.id,
            other: other.id,
        });
    }
    if issue.id == other.id {
        return Err(Error::SameIssue(issue.id));
    }
    Ok(())
}

/// One edge kind over the shared store.
#[derive(Clone)]
struct EdgeSet {
    kind: PairKind,
    store: Arc<EdgeStore>,
    issues: Arc<dyn IssueLookup>,
    policy: CyclePolicy,
}

impl EdgeSet {
    /// Check and insert `from -> to` in one write transaction.
    ///
    /// `refused` builds the relation's error for a duplicate or a cycle. A
    /// uniqueness conflict raised by the insert itself (a racing writer) is
    /// reported as a duplicate.
    fn insert(
        &self,
        actor: UserId,
        from: IssueId,
        to: IssueId,
        refused: impl Fn(Verdict) -> Error,
    ) -> Result<PairEdge> {
        let edge = self.store.write(|tx| -> Result<PairEdge> {
            let forward = tx.pair_exists(self.kind, from, to)?;
            let backward = !forward && self.policy.leads_back(tx, self.kind, from, to)?;

            match cycle::verdict(forward, backward) {
                Verdict::Accept => {
                    tx.insert_pair(self.kind, actor, from, to)
                        .map_err(|err| match err {
                            StoreError::Conflict => refused(Verdict::Duplicate),
                            other => Error::Store(other),
                        })
                }
                refusal => Err(refused(refusal)),
            }
        })?;

        debug!(
            kind = self.kind.as_str(),
            edge = %edge.id,
            from = %from,
            to = %to,
            actor = %actor,
            "Added edge"
        );
        Ok(edge)
    }

    /// Delete `from -> to`; `missing` builds the error when nothing matched.
    fn delete(
        &self,
        actor: UserId,
        from: IssueId,
        to: IssueId,
        missing: impl FnOnce() -> Error,
    ) -> Result<()> {
        let removed = self
            .store
            .write(|tx| tx.delete_pair(self.kind, from, to))?;
        if removed == 0 {
            return Err(missing());
        }
        debug!(
            kind = self.kind.as_str(),
            from = %from,
            to = %to,
            actor = %actor,
            "Removed edge"
        );
        Ok(())
    }

    /// Issues at the far end of the edges touching `anchor`, oldest edge first.
    async fn related(&self, anchor: IssueId, direction: Direction) -> Result<Vec<Issue>> {
        let edges = self
            .store
            .read(|tx| tx.related(self.kind, anchor, direction))?;

        let mut issues = Vec::with_capacity(edges.len());
        for edge in edges {
            let id = edge.far_end(direction);
            match self.issues.by_id(id).await? {
                Some(issue) => issues.push(issue),
                None => {
                    warn!(
                        kind = self.kind.as_str(),
                        edge = %edge.id,
                        issue = %id,
                        "Edge references a missing issue"
                    );
                    return Err(Error::DanglingReference {
                        edge: edge.id,
                        missing: EntityRef::Issue(id),
                    });
                }
            }
        }
        Ok(issues)
    }
}
