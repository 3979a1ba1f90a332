//! Dependency and group-reaction edge operations.
//!
//! Both tables share a shape, `(issue_id, <other>)`, so one set of
//! operations serves both, parameterized by [`PairKind`].

use chrono::{DateTime, Utc};
use petgraph::Direction;
use rusqlite::{params, Row};
use tracing::trace;

use super::{from_unix, now_unix, EdgeTx, StoreError};
use crate::domain::{DependencyEdge, EdgeId, IssueId, ReactionEdge, UserId};

/// The issue-to-issue edge tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairKind {
    /// `issue_id` is blocked by the other issue
    Dependency,

    /// `issue_id` is the parent of the other issue
    GroupReaction,
}

impl PairKind {
    /// Returns the name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dependency => "dependency",
            Self::GroupReaction => "group-reaction",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Dependency => "issue_dependency",
            Self::GroupReaction => "issue_group_reaction",
        }
    }

    fn other_column(self) -> &'static str {
        match self {
            Self::Dependency => "dependency_id",
            Self::GroupReaction => "child_id",
        }
    }
}

/// A row of either issue-to-issue edge table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairEdge {
    /// Row identifier
    pub id: EdgeId,

    /// User who created the edge
    pub actor: UserId,

    /// Owning issue (blocked issue or parent)
    pub issue_id: IssueId,

    /// Related issue (blocker or child)
    pub other_id: IssueId,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Update time, equal to `created_at`
    pub updated_at: DateTime<Utc>,
}

impl PairEdge {
    /// The end of the edge opposite the anchor of a [`EdgeTx::related`] query.
    #[must_use]
    pub fn far_end(&self, direction: Direction) -> IssueId {
        match direction {
            Direction::Outgoing => self.other_id,
            Direction::Incoming => self.issue_id,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EdgeId::new(row.get(0)?),
            actor: UserId::new(row.get(1)?),
            issue_id: IssueId::new(row.get(2)?),
            other_id: IssueId::new(row.get(3)?),
            created_at: from_unix(row.get(4)?),
            updated_at: from_unix(row.get(5)?),
        })
    }
}

impl From<PairEdge> for DependencyEdge {
    fn from(edge: PairEdge) -> Self {
        Self {
            id: edge.id,
            actor: edge.actor,
            issue_id: edge.issue_id,
            depends_on_id: edge.other_id,
            created_at: edge.created_at,
            updated_at: edge.updated_at,
        }
    }
}

impl From<PairEdge> for ReactionEdge {
    fn from(edge: PairEdge) -> Self {
        Self {
            id: edge.id,
            actor: edge.actor,
            issue_id: edge.issue_id,
            child_id: edge.other_id,
            created_at: edge.created_at,
            updated_at: edge.updated_at,
        }
    }
}

impl EdgeTx<'_> {
    /// Whether the edge `from -> to` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pair_exists(&self, kind: PairKind, from: IssueId, to: IssueId) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE issue_id = ?1 AND {} = ?2)",
            kind.table(),
            kind.other_column()
        );
        let exists = self
            .tx
            .query_row(&sql, params![from.as_i64(), to.as_i64()], |row| row.get(0))?;
        Ok(exists)
    }

    /// Insert the edge `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the edge already exists.
    pub fn insert_pair(
        &self,
        kind: PairKind,
        actor: UserId,
        from: IssueId,
        to: IssueId,
    ) -> Result<PairEdge, StoreError> {
        trace!(kind = kind.as_str(), from = %from, to = %to, "Inserting edge");
        let now = now_unix();
        let sql = format!(
            "INSERT INTO {} (user_id, issue_id, {}, created_unix, updated_unix)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            kind.table(),
            kind.other_column()
        );
        self.tx
            .execute(
                &sql,
                params![actor.as_i64(), from.as_i64(), to.as_i64(), now],
            )
            .map_err(StoreError::from_insert)?;

        Ok(PairEdge {
            id: EdgeId::new(self.tx.last_insert_rowid()),
            actor,
            issue_id: from,
            other_id: to,
            created_at: from_unix(now),
            updated_at: from_unix(now),
        })
    }

    /// Delete the edge `from -> to`, returning the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn delete_pair(&self, kind: PairKind, from: IssueId, to: IssueId) -> Result<usize, StoreError> {
        trace!(kind = kind.as_str(), from = %from, to = %to, "Deleting edge");
        let sql = format!(
            "DELETE FROM {} WHERE issue_id = ?1 AND {} = ?2",
            kind.table(),
            kind.other_column()
        );
        Ok(self.tx.execute(&sql, params![from.as_i64(), to.as_i64()])?)
    }

    /// Edges touching `anchor`, oldest first.
    ///
    /// `Outgoing` returns edges owned by `anchor` (its blockers or children);
    /// `Incoming` returns edges pointing at it (issues it blocks, its parents).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn related(
        &self,
        kind: PairKind,
        anchor: IssueId,
        direction: Direction,
    ) -> Result<Vec<PairEdge>, StoreError> {
        let anchor_column = match direction {
            Direction::Outgoing => "issue_id",
            Direction::Incoming => kind.other_column(),
        };
        let sql = format!(
            "SELECT id, user_id, issue_id, {other}, created_unix, updated_unix
             FROM {table} WHERE {anchor_column} = ?1
             ORDER BY created_unix, id",
            other = kind.other_column(),
            table = kind.table(),
        );

        let mut stmt = self.tx.prepare(&sql)?;
        let edges = stmt
            .query_map([anchor.as_i64()], PairEdge::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Every `(issue_id, other_id)` pair of one kind.
    ///
    /// Used for reachability checks that need the whole relation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pair_edges(&self, kind: PairKind) -> Result<Vec<(IssueId, IssueId)>, StoreError> {
        let sql = format!(
            "SELECT issue_id, {} FROM {}",
            kind.other_column(),
            kind.table()
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let pairs = stmt
            .query_map([], |row| {
                Ok((IssueId::new(row.get(0)?), IssueId::new(row.get(1)?)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }
}
