//! Cycle guard for issue-to-issue edges.
//!
//! The default policy only looks at the direct reverse edge: adding `A -> B`
//! is refused when `B -> A` is stored. Longer cycles (`A -> B -> C -> A`) slip
//! through under [`CyclePolicy::Direct`]. [`CyclePolicy::Transitive`] closes
//! that gap with a reachability query over every edge of the kind.

use petgraph::algo;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::IssueId;
use crate::store::{EdgeTx, PairKind, StoreError};

/// Outcome of checking a candidate edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The edge may be inserted
    Accept,
    /// The same edge is already stored
    Duplicate,
    /// The edge would close a cycle
    Cycle,
}

/// Classify a candidate edge `from -> to`.
///
/// `forward` is whether `from -> to` exists, `backward` whether `to` already
/// leads back to `from`. A duplicate wins over a cycle.
#[must_use]
pub fn verdict(forward: bool, backward: bool) -> Verdict {
    if forward {
        Verdict::Duplicate
    } else if backward {
        Verdict::Cycle
    } else {
        Verdict::Accept
    }
}

/// Whether inserting `from -> to` would close a cycle, given the same facts
/// as [`verdict`].
#[must_use]
pub fn would_create_cycle(forward: bool, backward: bool) -> bool {
    verdict(forward, backward) == Verdict::Cycle
}

/// How far the cycle guard looks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CyclePolicy {
    /// Reject only the direct reverse edge
    #[default]
    Direct,

    /// Reject any edge whose target already reaches its source
    Transitive,
}

impl CyclePolicy {
    /// Returns the string representation used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Transitive => "transitive",
        }
    }

    /// Whether `to` leads back to `from` under this policy.
    ///
    /// Runs inside the caller's transaction so the answer stays valid for the
    /// insert that follows.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge rows cannot be read.
    pub fn leads_back(
        self,
        tx: &EdgeTx<'_>,
        kind: PairKind,
        from: IssueId,
        to: IssueId,
    ) -> Result<bool, StoreError> {
        if tx.pair_exists(kind, to, from)? {
            return Ok(true);
        }
        match self {
            Self::Direct => Ok(false),
            Self::Transitive => Ok(reaches(&tx.pair_edges(kind)?, to, from)),
        }
    }
}

impl fmt::Display for CyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "transitive" => Ok(Self::Transitive),
            other => Err(format!(
                "invalid cycle policy '{other}': expected direct or transitive"
            )),
        }
    }
}

/// Whether a directed path `start -> ... -> goal` exists over `edges`.
fn reaches(edges: &[(IssueId, IssueId)], start: IssueId, goal: IssueId) -> bool {
    let graph: DiGraphMap<IssueId, ()> = DiGraphMap::from_edges(edges.iter().copied());
    if !graph.contains_node(start) || !graph.contains_node(goal) {
        return false;
    }
    algo::has_path_connecting(&graph, start, goal, None)
}
