//! Dispatch edge operations and cascade purges.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::trace;

use super::{from_unix, now_unix, EdgeTx, StoreError};
use crate::domain::{DispatchEdge, EdgeId, IssueId, NewDispatch, PullRequestId, RepoId, UserId};

/// Column list matching [`row_to_dispatch`].
const DISPATCH_COLUMNS: &str =
    "id, user_id, issue_id, dispatched_id, repo_id, pull_request_id, created_unix, updated_unix";

fn row_to_dispatch(row: &Row<'_>) -> rusqlite::Result<DispatchEdge> {
    Ok(DispatchEdge {
        id: EdgeId::new(row.get(0)?),
        actor: UserId::new(row.get(1)?),
        source_issue_id: IssueId::new(row.get(2)?),
        target_issue_id: IssueId::new(row.get(3)?),
        repo_id: RepoId::new(row.get(4)?),
        pull_request_id: PullRequestId::new(row.get(5)?),
        created_at: from_unix(row.get(6)?),
        updated_at: from_unix(row.get(7)?),
    })
}

/// Rows removed by a cascade purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Dependency edges removed
    pub dependencies: usize,

    /// Group-reaction edges removed
    pub reactions: usize,

    /// Dispatch edges removed
    pub dispatches: usize,
}

impl PurgeReport {
    /// Total rows removed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.dependencies + self.reactions + self.dispatches
    }
}

impl EdgeTx<'_> {
    /// Whether `source` has already been dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dispatch_exists(&self, source: IssueId) -> Result<bool, StoreError> {
        let exists = self.tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM issue_dispatch WHERE issue_id = ?1)",
            [source.as_i64()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// The dispatch edge recorded for `source`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dispatch_by_source(&self, source: IssueId) -> Result<Option<DispatchEdge>, StoreError> {
        let sql = format!("SELECT {DISPATCH_COLUMNS} FROM issue_dispatch WHERE issue_id = ?1");
        Ok(self
            .tx
            .query_row(&sql, [source.as_i64()], row_to_dispatch)
            .optional()?)
    }

    /// The dispatch edge that produced `pull_request`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dispatch_by_pull_request(
        &self,
        pull_request: PullRequestId,
    ) -> Result<Option<DispatchEdge>, StoreError> {
        let sql =
            format!("SELECT {DISPATCH_COLUMNS} FROM issue_dispatch WHERE pull_request_id = ?1");
        Ok(self
            .tx
            .query_row(&sql, [pull_request.as_i64()], row_to_dispatch)
            .optional()?)
    }

    /// The dispatch edge whose pull request carries issue `target`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dispatch_by_target(&self, target: IssueId) -> Result<Option<DispatchEdge>, StoreError> {
        let sql = format!("SELECT {DISPATCH_COLUMNS} FROM issue_dispatch WHERE dispatched_id = ?1");
        Ok(self
            .tx
            .query_row(&sql, [target.as_i64()], row_to_dispatch)
            .optional()?)
    }

    /// Record a dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the source issue, the target issue
    /// or the pull request already appear in another dispatch edge.
    pub fn insert_dispatch(&self, new: NewDispatch) -> Result<DispatchEdge, StoreError> {
        trace!(
            source = %new.source_issue_id,
            target = %new.target_issue_id,
            pull_request = %new.pull_request_id,
            "Inserting dispatch edge"
        );
        let now = now_unix();
        self.tx
            .execute(
                "INSERT INTO issue_dispatch
                 (user_id, issue_id, dispatched_id, repo_id, pull_request_id, created_unix, updated_unix)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    new.actor.as_i64(),
                    new.source_issue_id.as_i64(),
                    new.target_issue_id.as_i64(),
                    new.repo_id.as_i64(),
                    new.pull_request_id.as_i64(),
                    now
                ],
            )
            .map_err(StoreError::from_insert)?;

        Ok(DispatchEdge {
            id: EdgeId::new(self.tx.last_insert_rowid()),
            actor: new.actor,
            source_issue_id: new.source_issue_id,
            target_issue_id: new.target_issue_id,
            repo_id: new.repo_id,
            pull_request_id: new.pull_request_id,
            created_at: from_unix(now),
            updated_at: from_unix(now),
        })
    }

    /// Delete the dispatch edge binding `source` to `target` through
    /// `pull_request`, returning the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn delete_dispatch(
        &self,
        source: IssueId,
        target: IssueId,
        pull_request: PullRequestId,
    ) -> Result<usize, StoreError> {
        trace!(source = %source, target = %target, "Deleting dispatch edge");
        Ok(self.tx.execute(
            "DELETE FROM issue_dispatch
             WHERE issue_id = ?1 AND dispatched_id = ?2 AND pull_request_id = ?3",
            params![source.as_i64(), target.as_i64(), pull_request.as_i64()],
        )?)
    }

    /// Remove every edge that references `issue`.
    ///
    /// Called when the host deletes an issue, so that no edge is left
    /// pointing at it.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn purge_issue(&self, issue: IssueId) -> Result<PurgeReport, StoreError> {
        let id = issue.as_i64();
        let report = PurgeReport {
            dependencies: self.tx.execute(
                "DELETE FROM issue_dependency WHERE issue_id = ?1 OR dependency_id = ?1",
                [id],
            )?,
            reactions: self.tx.execute(
                "DELETE FROM issue_group_reaction WHERE issue_id = ?1 OR child_id = ?1",
                [id],
            )?,
            dispatches: self.tx.execute(
                "DELETE FROM issue_dispatch WHERE issue_id = ?1 OR dispatched_id = ?1",
                [id],
            )?,
        };
        trace!(issue = %issue, removed = report.total(), "Purged issue edges");
        Ok(report)
    }

    /// Remove every dispatch edge that targets `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn purge_repository(&self, repo: RepoId) -> Result<PurgeReport, StoreError> {
        let dispatches = self
            .tx
            .execute("DELETE FROM issue_dispatch WHERE repo_id = ?1", [repo.as_i64()])?;
        trace!(repo = %repo, removed = dispatches, "Purged repository dispatches");
        Ok(PurgeReport {
            dispatches,
            ..PurgeReport::default()
        })
    }
}
