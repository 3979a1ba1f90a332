//! Local host platform backed by `SQLite`.
//!
//! Skein itself never owns repositories, branches, issues or pull requests.
//! [`LocalHost`] keeps a minimal version of each in the same database file as
//! the edge tables so the command line works without a forge behind it. It
//! implements every collaborator trait in [`skein::platform`].
//!
//! There is no real version control here: a branch is a name and the commit
//! it was created from, and the default branch starts at a synthetic commit.
//!
//! Authorization is deliberately simple: the repository owner and registered
//! collaborators may create branches and manage dependencies.

mod schema;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use skein::domain::{
    Branch, Issue, IssueId, NewPullRequest, PullRequest, PullRequestId, RepoId, Repository, UserId,
};
use skein::platform::{
    AuthorizationGate, IssueLookup, Platform, PlatformError, PlatformResult, PullRequestService,
    RepositoryLookup, VersionControl,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use schema::SCHEMA;

/// How long a writer waits for the edge store's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const REPOSITORY_COLUMNS: &str = "id, owner, name, default_branch";
const ISSUE_COLUMNS: &str = "id, repo_id, idx, title, is_pull";
const PULL_REQUEST_SELECT: &str = "SELECT p.id, p.issue_id, i.repo_id, i.idx, p.head, p.base, i.title, p.body
     FROM host_pull_request p JOIN host_issue i ON i.id = p.issue_id";

/// A branch together with its protection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    /// The branch
    #[serde(flatten)]
    pub branch: Branch,

    /// Whether deleting the branch is refused
    pub protected: bool,
}

/// `SQLite` implementation of every platform trait.
pub struct LocalHost {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for LocalHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHost").finish_non_exhaustive()
    }
}

impl LocalHost {
    /// Open or create the host tables in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path = %path.display(), "Opened local host");
        Self::init(conn)
    }

    /// Create a private in-memory host.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Error::Poisoned(e.to_string()))
    }

    /// Bundle `host` as every collaborator.
    pub fn platform(host: &Arc<Self>) -> Platform {
        Platform::from_host(Arc::clone(host))
    }

    // ========== Repositories ==========

    /// Register `owner/name`, owned by `owner_id`, with its default branch.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryExists` if the name is taken.
    pub fn add_repository(
        &self,
        owner_id: UserId,
        owner: &str,
        name: &str,
        default_branch: &str,
    ) -> Result<Repository> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO host_repository (owner, name, owner_id, default_branch) VALUES (?1, ?2, ?3, ?4)",
            params![owner, name, owner_id.as_i64(), default_branch],
        );
        if is_constraint_violation(&inserted) {
            return Err(Error::RepositoryExists(format!("{owner}/{name}")));
        }
        inserted?;

        let id = RepoId::new(tx.last_insert_rowid());
        tx.execute(
            "INSERT INTO host_branch (repo_id, name, commit_id) VALUES (?1, ?2, ?3)",
            params![id.as_i64(), default_branch, initial_commit(id)],
        )?;
        tx.commit()?;

        debug!(repo = %id, owner, name, "Added repository");
        Ok(Repository {
            id,
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: default_branch.to_string(),
        })
    }

    /// All repositories, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM host_repository ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_repository)?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }

    /// Find a repository by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn repository(&self, id: RepoId) -> Result<Option<Repository>> {
        let conn = self.connection()?;
        let repo = conn
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM host_repository WHERE id = ?1"),
                [id.as_i64()],
                row_to_repository,
            )
            .optional()?;
        Ok(repo)
    }

    /// Find a repository by `owner` and `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn repository_by_name(&self, owner: &str, name: &str) -> Result<Option<Repository>> {
        let conn = self.connection()?;
        let repo = conn
            .query_row(
                &format!(
                    "SELECT {REPOSITORY_COLUMNS} FROM host_repository WHERE owner = ?1 AND name = ?2"
                ),
                params![owner, name],
                row_to_repository,
            )
            .optional()?;
        Ok(repo)
    }

    /// Delete a repository with its branches, issues and pull requests.
    ///
    /// Returns the identifiers of the deleted issues so the caller can purge
    /// the edges that referenced them. An unknown repository deletes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete_repository(&self, id: RepoId) -> Result<Vec<IssueId>> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let issues = {
            let mut stmt = tx.prepare("SELECT id FROM host_issue WHERE repo_id = ?1 ORDER BY id")?;
            let rows = stmt.query_map([id.as_i64()], |row| row.get(0).map(IssueId::new))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.execute("DELETE FROM host_repository WHERE id = ?1", [id.as_i64()])?;
        tx.commit()?;

        debug!(repo = %id, issues = issues.len(), "Deleted repository");
        Ok(issues)
    }

    /// Let `user` create branches and manage dependencies in `repo`.
    ///
    /// Returns `false` if `user` already was a collaborator.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryNotFound` for an unknown repository.
    pub fn add_collaborator(&self, repo: RepoId, user: UserId) -> Result<bool> {
        let conn = self.connection()?;
        let added = conn.execute(
            "INSERT OR IGNORE INTO host_collaborator (repo_id, user_id)
             SELECT id, ?2 FROM host_repository WHERE id = ?1",
            params![repo.as_i64(), user.as_i64()],
        )?;
        if added == 0 {
            let known: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM host_repository WHERE id = ?1)",
                [repo.as_i64()],
                |row| row.get(0),
            )?;
            if !known {
                return Err(Error::RepositoryNotFound(repo.to_string()));
            }
        }
        Ok(added == 1)
    }

    /// Whether `actor` owns `repo` or collaborates on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_authorized(&self, repo: RepoId, actor: UserId) -> Result<bool> {
        let conn = self.connection()?;
        let authorized = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM host_repository WHERE id = ?1 AND owner_id = ?2)
                 OR EXISTS(SELECT 1 FROM host_collaborator WHERE repo_id = ?1 AND user_id = ?2)",
            params![repo.as_i64(), actor.as_i64()],
            |row| row.get(0),
        )?;
        Ok(authorized)
    }

    // ========== Branches ==========

    /// Branches of `repo`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn branches(&self, repo: RepoId) -> Result<Vec<BranchInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT name, commit_id, protected FROM host_branch WHERE repo_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([repo.as_i64()], row_to_branch)?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }

    /// Look up one branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn branch(&self, repo: RepoId, name: &str) -> Result<Option<BranchInfo>> {
        let conn = self.connection()?;
        let branch = conn
            .query_row(
                "SELECT name, commit_id, protected FROM host_branch WHERE repo_id = ?1 AND name = ?2",
                params![repo.as_i64(), name],
                row_to_branch,
            )
            .optional()?;
        Ok(branch)
    }

    /// Protect a branch from deletion. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn protect_branch(&self, repo: RepoId, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        let updated = conn.execute(
            "UPDATE host_branch SET protected = 1 WHERE repo_id = ?1 AND name = ?2",
            params![repo.as_i64(), name],
        )?;
        Ok(updated == 1)
    }

    // ========== Issues ==========

    /// Open an issue in `repo` with the next free index.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryNotFound` for an unknown repository.
    pub fn add_issue(&self, repo: RepoId, title: &str) -> Result<Issue> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let issue = insert_issue(&tx, repo, title, false)?
            .ok_or_else(|| Error::RepositoryNotFound(repo.to_string()))?;
        tx.commit()?;

        debug!(issue = %issue.id, repo = %repo, index = issue.index, "Added issue");
        Ok(issue)
    }

    /// Find an issue by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issue(&self, id: IssueId) -> Result<Option<Issue>> {
        let conn = self.connection()?;
        let issue = conn
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM host_issue WHERE id = ?1"),
                [id.as_i64()],
                row_to_issue,
            )
            .optional()?;
        Ok(issue)
    }

    /// Find an issue by its index within `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issue_at(&self, repo: RepoId, index: i64) -> Result<Option<Issue>> {
        let conn = self.connection()?;
        let issue = conn
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM host_issue WHERE repo_id = ?1 AND idx = ?2"),
                params![repo.as_i64(), index],
                row_to_issue,
            )
            .optional()?;
        Ok(issue)
    }

    /// Delete an issue, and its pull request if it backs one.
    ///
    /// Returns `false` if there was no such issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete_issue(&self, id: IssueId) -> Result<bool> {
        let conn = self.connection()?;
        let deleted = conn.execute("DELETE FROM host_issue WHERE id = ?1", [id.as_i64()])?;
        if deleted == 1 {
            debug!(issue = %id, "Deleted issue");
        }
        Ok(deleted == 1)
    }

    // ========== Pull requests ==========

    /// Find a pull request by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pull_request(&self, id: PullRequestId) -> Result<Option<PullRequest>> {
        let conn = self.connection()?;
        let pull = conn
            .query_row(
                &format!("{PULL_REQUEST_SELECT} WHERE p.id = ?1"),
                [id.as_i64()],
                row_to_pull_request,
            )
            .optional()?;
        Ok(pull)
    }

    /// Pull requests opened in `repo`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pull_requests(&self, repo: RepoId) -> Result<Vec<PullRequest>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{PULL_REQUEST_SELECT} WHERE i.repo_id = ?1 ORDER BY p.id"
        ))?;
        let rows = stmt.query_map([repo.as_i64()], row_to_pull_request)?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }

    fn open_pull_request(
        &self,
        repo: &Repository,
        request: &NewPullRequest,
    ) -> PlatformResult<PullRequest> {
        let mut conn = self.connection().map_err(backend)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;

        for branch in [&request.head, &request.base] {
            if !branch_exists(&tx, repo.id, branch).map_err(backend)? {
                return Err(PlatformError::Rejected(format!(
                    "branch '{branch}' does not exist in {}",
                    repo.full_name()
                )));
            }
        }
        if request.head == request.base {
            return Err(PlatformError::Rejected(format!(
                "head and base are both '{}'",
                request.head
            )));
        }

        let issue = insert_issue(&tx, repo.id, &request.title, true)
            .map_err(backend)?
            .ok_or_else(|| PlatformError::Rejected(format!("repository {} is gone", repo.id)))?;
        tx.execute(
            "INSERT INTO host_pull_request (issue_id, head, base, body) VALUES (?1, ?2, ?3, ?4)",
            params![issue.id.as_i64(), request.head, request.base, request.body],
        )
        .map_err(backend)?;
        let id = PullRequestId::new(tx.last_insert_rowid());
        tx.commit().map_err(backend)?;

        debug!(pull_request = %id, repo = %repo.id, head = %request.head, "Opened pull request");
        Ok(PullRequest {
            id,
            issue_id: issue.id,
            repo_id: repo.id,
            index: issue.index,
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
        })
    }
}

// ========== Platform traits ==========

#[async_trait]
impl IssueLookup for LocalHost {
    async fn by_index(&self, repo: RepoId, index: i64) -> PlatformResult<Option<Issue>> {
        self.issue_at(repo, index).map_err(backend)
    }

    async fn by_id(&self, id: IssueId) -> PlatformResult<Option<Issue>> {
        self.issue(id).map_err(backend)
    }
}

#[async_trait]
impl RepositoryLookup for LocalHost {
    async fn by_id(&self, id: RepoId) -> PlatformResult<Option<Repository>> {
        self.repository(id).map_err(backend)
    }
}

#[async_trait]
impl VersionControl for LocalHost {
    async fn get_branch(&self, repo: &Repository, name: &str) -> PlatformResult<Option<Branch>> {
        let info = self.branch(repo.id, name).map_err(backend)?;
        Ok(info.map(|info| info.branch))
    }

    async fn create_branch(
        &self,
        repo: &Repository,
        actor: UserId,
        base: &str,
        new_name: &str,
    ) -> PlatformResult<()> {
        validate_branch_name(new_name)?;

        let mut conn = self.connection().map_err(backend)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;
        let commit: Option<String> = tx
            .query_row(
                "SELECT commit_id FROM host_branch WHERE repo_id = ?1 AND name = ?2",
                params![repo.id.as_i64(), base],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        let Some(commit) = commit else {
            return Err(PlatformError::Rejected(format!(
                "base branch '{base}' does not exist"
            )));
        };

        let inserted = tx.execute(
            "INSERT INTO host_branch (repo_id, name, commit_id) VALUES (?1, ?2, ?3)",
            params![repo.id.as_i64(), new_name, commit],
        );
        if is_constraint_violation(&inserted) {
            return Err(PlatformError::Rejected(format!(
                "branch '{new_name}' already exists"
            )));
        }
        inserted.map_err(backend)?;
        tx.commit().map_err(backend)?;

        debug!(repo = %repo.id, actor = %actor, base, branch = new_name, "Created branch");
        Ok(())
    }

    async fn delete_branch(&self, repo: &Repository, name: &str, _force: bool) -> PlatformResult<()> {
        let conn = self.connection().map_err(backend)?;
        let deleted = conn
            .execute(
                "DELETE FROM host_branch WHERE repo_id = ?1 AND name = ?2",
                params![repo.id.as_i64(), name],
            )
            .map_err(backend)?;
        if deleted == 0 {
            return Err(PlatformError::Rejected(format!("branch '{name}' does not exist")));
        }
        debug!(repo = %repo.id, branch = name, "Deleted branch");
        Ok(())
    }

    async fn is_protected_branch(&self, repo: &Repository, name: &str) -> PlatformResult<bool> {
        let info = self.branch(repo.id, name).map_err(backend)?;
        Ok(info.is_some_and(|info| info.protected))
    }
}

#[async_trait]
impl PullRequestService for LocalHost {
    async fn create(&self, repo: &Repository, request: NewPullRequest) -> PlatformResult<PullRequest> {
        self.open_pull_request(repo, &request)
    }

    async fn by_id(&self, id: PullRequestId) -> PlatformResult<Option<PullRequest>> {
        self.pull_request(id).map_err(backend)
    }
}

#[async_trait]
impl AuthorizationGate for LocalHost {
    async fn can_create_branch(&self, repo: RepoId, actor: UserId) -> bool {
        self.authorized_or_warn(repo, actor)
    }

    async fn can_manage_dependencies(&self, repo: RepoId, actor: UserId) -> bool {
        self.authorized_or_warn(repo, actor)
    }
}

impl LocalHost {
    fn authorized_or_warn(&self, repo: RepoId, actor: UserId) -> bool {
        self.is_authorized(repo, actor).unwrap_or_else(|err| {
            warn!(repo = %repo, actor = %actor, error = %err, "Authorization lookup failed; denying");
            false
        })
    }
}

// ========== Helpers ==========

fn backend(err: impl Into<Error>) -> PlatformError {
    PlatformError::Backend(Box::new(err.into()))
}

fn is_constraint_violation<T>(result: &rusqlite::Result<T>) -> bool {
    matches!(
        result,
        Err(rusqlite::Error::SqliteFailure(failure, _)) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// Commit a new repository's default branch starts at.
fn initial_commit(repo: RepoId) -> String {
    format!("{:040x}", repo.as_i64())
}

fn validate_branch_name(name: &str) -> PlatformResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && !name.contains("..")
        && !name.chars().any(|c| c.is_whitespace() || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(PlatformError::Rejected(format!("invalid branch name '{name}'")))
    }
}

fn branch_exists(conn: &Connection, repo: RepoId, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM host_branch WHERE repo_id = ?1 AND name = ?2)",
        params![repo.as_i64(), name],
        |row| row.get(0),
    )
}

/// Insert an issue at the repository's next index, or `None` if the
/// repository does not exist.
fn insert_issue(
    conn: &Connection,
    repo: RepoId,
    title: &str,
    is_pull: bool,
) -> rusqlite::Result<Option<Issue>> {
    let index: Option<i64> = conn
        .query_row(
            "UPDATE host_repository SET next_index = next_index + 1 WHERE id = ?1 RETURNING next_index",
            [repo.as_i64()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(index) = index else {
        return Ok(None);
    };

    conn.execute(
        "INSERT INTO host_issue (repo_id, idx, title, is_pull) VALUES (?1, ?2, ?3, ?4)",
        params![repo.as_i64(), index, title, is_pull],
    )?;
    Ok(Some(Issue {
        id: IssueId::new(conn.last_insert_rowid()),
        repo_id: repo,
        index,
        title: title.to_string(),
        is_pull,
    }))
}

fn row_to_repository(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: RepoId::new(row.get(0)?),
        owner: row.get(1)?,
        name: row.get(2)?,
        default_branch: row.get(3)?,
    })
}

fn row_to_branch(row: &Row<'_>) -> rusqlite::Result<BranchInfo> {
    Ok(BranchInfo {
        branch: Branch {
            name: row.get(0)?,
            commit_id: row.get(1)?,
        },
        protected: row.get(2)?,
    })
}

fn row_to_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: IssueId::new(row.get(0)?),
        repo_id: RepoId::new(row.get(1)?),
        index: row.get(2)?,
        title: row.get(3)?,
        is_pull: row.get(4)?,
    })
}

fn row_to_pull_request(row: &Row<'_>) -> rusqlite::Result<PullRequest> {
    Ok(PullRequest {
        id: PullRequestId::new(row.get(0)?),
        issue_id: IssueId::new(row.get(1)?),
        repo_id: RepoId::new(row.get(2)?),
        index: row.get(3)?,
        head: row.get(4)?,
        base: row.get(5)?,
        title: row.get(6)?,
        body: row.get(7)?,
    })
}
