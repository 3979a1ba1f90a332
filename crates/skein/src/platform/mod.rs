//! Collaborator interfaces provided by the host platform.
//!
//! Skein never owns issues, repositories, branches or pull requests. It reaches
//! them through the narrow traits in this module, which the host implements.
//! Lookups return `Ok(None)` for a missing entity; `Err` is reserved for the
//! collaborator itself failing.
//!
//! Timeouts and retries are the collaborator's business: skein calls each
//! method once and propagates whatever comes back.

#[cfg(any(test, feature = "test-util"))]
mod memory;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryPlatform;

use crate::domain::{
    Branch, Issue, IssueId, NewPullRequest, PullRequest, PullRequestId, RepoId, Repository, UserId,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a host collaborator.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The collaborator refused the request (validation, conflict, ...)
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or is misbehaving
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for collaborator calls.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Resolves issues.
#[async_trait]
pub trait IssueLookup: Send + Sync {
    /// Find an issue by its repository-relative index.
    async fn by_index(&self, repo: RepoId, index: i64) -> PlatformResult<Option<Issue>>;

    /// Find an issue by its global identifier.
    async fn by_id(&self, id: IssueId) -> PlatformResult<Option<Issue>>;
}

/// Resolves repositories.
#[async_trait]
pub trait RepositoryLookup: Send + Sync {
    /// Find a repository by identifier.
    async fn by_id(&self, id: RepoId) -> PlatformResult<Option<Repository>>;
}

/// Branch operations on the version-control layer.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Look up a branch by name.
    async fn get_branch(&self, repo: &Repository, name: &str) -> PlatformResult<Option<Branch>>;

    /// Create `new_name` pointing at the head of `base`.
    async fn create_branch(
        &self,
        repo: &Repository,
        actor: UserId,
        base: &str,
        new_name: &str,
    ) -> PlatformResult<()>;

    /// Delete a branch. `force` deletes even when unmerged.
    async fn delete_branch(&self, repo: &Repository, name: &str, force: bool) -> PlatformResult<()>;

    /// Whether branch protection forbids deleting `name`.
    async fn is_protected_branch(&self, repo: &Repository, name: &str) -> PlatformResult<bool>;
}

/// The pull-request workflow.
#[async_trait]
pub trait PullRequestService: Send + Sync {
    /// Open a pull request in `repo`. The host creates the backing issue.
    async fn create(&self, repo: &Repository, request: NewPullRequest) -> PlatformResult<PullRequest>;

    /// Find a pull request by identifier.
    async fn by_id(&self, id: PullRequestId) -> PlatformResult<Option<PullRequest>>;
}

/// Access-control hook points.
///
/// The policy lives in the host; skein only asks.
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Whether `actor` may create branches in `repo`.
    async fn can_create_branch(&self, repo: RepoId, actor: UserId) -> bool;

    /// Whether `actor` may add or remove dependencies between issues of `repo`.
    async fn can_manage_dependencies(&self, _repo: RepoId, _actor: UserId) -> bool {
        true
    }
}

/// The set of collaborators skein's services are built on.
#[derive(Clone)]
pub struct Platform {
    /// Issue resolution
    pub issues: Arc<dyn IssueLookup>,

    /// Repository resolution
    pub repositories: Arc<dyn RepositoryLookup>,

    /// Branch operations
    pub vcs: Arc<dyn VersionControl>,

    /// Pull-request workflow
    pub pulls: Arc<dyn PullRequestService>,

    /// Authorization hook
    pub gate: Arc<dyn AuthorizationGate>,
}

impl Platform {
    /// Use one host object for every collaborator role.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: IssueLookup
            + RepositoryLookup
            + VersionControl
            + PullRequestService
            + AuthorizationGate
            + 'static,
    {
        Self {
            issues: host.clone(),
            repositories: host.clone(),
            vcs: host.clone(),
            pulls: host.clone(),
            gate: host,
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
