//! Dispatching issues to pull requests.
//!
//! A dispatch forwards an issue to a target repository: it creates a branch
//! named after the issue, opens a pull request from that branch and records
//! a dispatch edge linking the issue to the pull request. See [`saga`] for
//! the failure semantics.
//!
//! ## Module Structure
//!
//! - `branch_name` - Deterministic branch naming
//! - `saga` - Step states, compensation policy, `DispatchError`

mod branch_name;
pub mod saga;

pub use branch_name::derive_branch_name;
pub use saga::{BranchEffect, Compensation, DispatchError, DispatchStep, SideEffects};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    Branch, Dispatch, DispatchEdge, Issue, IssueId, NewDispatch, NewPullRequest, PullRequest,
    PullRequestId, RepoId, Repository, UserId,
};
use crate::error::{EntityRef, Error, IssueLocator, Result};
use crate::platform::Platform;
use crate::store::{EdgeStore, EdgeTx, StoreError};
use saga::Saga;

/// Input to [`DispatchOrchestrator::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// User performing the dispatch
    pub actor: UserId,

    /// Repository holding the issue to dispatch
    pub source_repo: RepoId,

    /// Index of the issue within `source_repo`
    pub issue_index: i64,

    /// Repository the pull request is opened in
    pub target_repo: RepoId,

    /// Base branch in the target repository; empty means its default branch
    pub base: String,
}

/// Runs dispatches and answers questions about recorded ones.
#[derive(Clone)]
pub struct DispatchOrchestrator {
    store: Arc<EdgeStore>,
    platform: Platform,
}

impl std::fmt::Debug for DispatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOrchestrator").finish_non_exhaustive()
    }
}

impl DispatchOrchestrator {
    /// Create an orchestrator over `store` and the host collaborators.
    #[must_use]
    pub fn new(store: Arc<EdgeStore>, platform: Platform) -> Self {
        Self { store, platform }
    }

    /// Dispatch an issue.
    ///
    /// Runs every [`DispatchStep`] in order and stops at the first failure.
    /// There is no check for an earlier dispatch before the branch and pull
    /// request are created; a second dispatch of the same issue fails at
    /// [`DispatchStep::RecordDispatchEdge`] with `DispatchExists`, leaving the
    /// new pull request behind in [`DispatchError::effects`].
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] naming the failed step, the side effects
    /// already produced and the underlying [`Error`].
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<Dispatch, DispatchError> {
        self.run(request).await.map(|(dispatch, _)| dispatch)
    }

    /// Run the saga, also returning the side effects it produced.
    pub(crate) async fn run(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<(Dispatch, SideEffects), DispatchError> {
        let mut saga = Saga::default();

        let target = saga
            .run(DispatchStep::ResolveTarget, self.repository(request.target_repo))
            .await?;

        let base_name = if request.base.is_empty() {
            target.default_branch.as_str()
        } else {
            request.base.as_str()
        };
        let base = saga
            .run(DispatchStep::ResolveBaseBranch, self.branch(&target, base_name))
            .await?;

        let source = saga
            .run(
                DispatchStep::ResolveSourceIssue,
                self.issue_by_index(request.source_repo, request.issue_index),
            )
            .await?;

        let branch_name = derive_branch_name(source.index, &source.title);
        debug!(
            step = %DispatchStep::DeriveBranchName,
            issue = %source.id,
            branch = %branch_name,
            "Derived dispatch branch"
        );

        saga.run(
            DispatchStep::AuthorizeBranchCreation,
            self.authorize_branch(&target, request.actor),
        )
        .await?;

        let branch = saga
            .run(
                DispatchStep::CreateBranch,
                self.ensure_branch(&target, request.actor, &base.name, &branch_name),
            )
            .await?;
        saga.effects.branch = Some(branch);

        let pull_request = saga
            .run(
                DispatchStep::CreatePullRequest,
                self.open_pull_request(&target, &branch_name, &base.name, &source),
            )
            .await?;
        saga.effects.pull_request = Some(pull_request.clone());

        let (edge, issue) = saga
            .run(DispatchStep::RecordDispatchEdge, async {
                let issue = self.issue_by_id(pull_request.issue_id).await?;
                let edge = self.record(NewDispatch {
                    actor: request.actor,
                    source_issue_id: source.id,
                    target_issue_id: issue.id,
                    repo_id: target.id,
                    pull_request_id: pull_request.id,
                })?;
                Ok::<_, Error>((edge, issue))
            })
            .await?;

        info!(
            step = %DispatchStep::Success,
            edge = %edge.id,
            issue = %source.id,
            repo = %target.full_name(),
            pull_request = pull_request.index,
            "Dispatched issue"
        );
        let dispatch = Dispatch {
            repository: target,
            pull_request,
            issue,
        };
        Ok((dispatch, saga.effects))
    }

    /// The dispatch recorded for `issue`, with its references resolved.
    ///
    /// # Errors
    ///
    /// - `DispatchNotExists` if `issue` has not been dispatched
    /// - `DanglingReference` if the repository, pull request or dispatched
    ///   issue no longer exists
    pub async fn get_dispatch(&self, issue: IssueId) -> Result<Dispatch> {
        let edge = self.dispatch_edge(issue)?;
        self.hydrate(&edge).await
    }

    /// The stored dispatch edge of `issue`, without resolving its references.
    ///
    /// # Errors
    ///
    /// Returns `DispatchNotExists` if `issue` has not been dispatched.
    pub fn dispatch_edge(&self, issue: IssueId) -> Result<DispatchEdge> {
        self.store
            .read(|tx| tx.dispatch_by_source(issue))?
            .ok_or(Error::DispatchNotExists(issue))
    }

    /// Like [`get_dispatch`](Self::get_dispatch), but `Ok(None)` when the issue
    /// has not been dispatched.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if the edge cannot be resolved.
    pub async fn find_dispatch(&self, issue: IssueId) -> Result<Option<Dispatch>> {
        let edge = self.store.read(|tx| tx.dispatch_by_source(issue))?;
        match edge {
            Some(edge) => Ok(Some(self.hydrate(&edge).await?)),
            None => Ok(None),
        }
    }

    /// The issue that was dispatched to `pull_request`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if the source issue no longer exists.
    pub async fn source_of(&self, pull_request: PullRequestId) -> Result<Option<Issue>> {
        let Some(edge) = self
            .store
            .read(|tx| tx.dispatch_by_pull_request(pull_request))?
        else {
            return Ok(None);
        };
        let issue = self
            .platform
            .issues
            .by_id(edge.source_issue_id)
            .await?
            .ok_or_else(|| dangling(&edge, EntityRef::Issue(edge.source_issue_id)))?;
        Ok(Some(issue))
    }

    /// Delete the dispatch edge of `issue`.
    ///
    /// The branch and the pull request are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `DispatchNotExists` if no edge matches all three keys.
    pub fn remove_dispatch(
        &self,
        actor: UserId,
        issue: IssueId,
        dispatched: IssueId,
        pull_request: PullRequestId,
    ) -> Result<()> {
        let removed = self
            .store
            .write(|tx| tx.delete_dispatch(issue, dispatched, pull_request))?;
        if removed == 0 {
            return Err(Error::DispatchNotExists(issue));
        }
        debug!(issue = %issue, pull_request = %pull_request, actor = %actor, "Removed dispatch");
        Ok(())
    }

    async fn repository(&self, id: RepoId) -> Result<Repository> {
        self.platform
            .repositories
            .by_id(id)
            .await?
            .ok_or(Error::RepositoryNotFound(id))
    }

    async fn branch(&self, repo: &Repository, name: &str) -> Result<Branch> {
        self.platform
            .vcs
            .get_branch(repo, name)
            .await?
            .ok_or_else(|| Error::BranchNotFound {
                repo: repo.id,
                branch: name.to_string(),
            })
    }

    async fn issue_by_index(&self, repo: RepoId, index: i64) -> Result<Issue> {
        self.platform
            .issues
            .by_index(repo, index)
            .await?
            .ok_or(Error::IssueNotFound(IssueLocator::Index { repo, index }))
    }

    async fn issue_by_id(&self, id: IssueId) -> Result<Issue> {
        self.platform
            .issues
            .by_id(id)
            .await?
            .ok_or(Error::IssueNotFound(IssueLocator::Id(id)))
    }

    async fn authorize_branch(&self, repo: &Repository, actor: UserId) -> Result<()> {
        if self.platform.gate.can_create_branch(repo.id, actor).await {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                actor,
                repo: repo.id,
                action: "create branches",
            })
        }
    }

    async fn ensure_branch(
        &self,
        repo: &Repository,
        actor: UserId,
        base: &str,
        name: &str,
    ) -> Result<BranchEffect> {
        if self.platform.vcs.get_branch(repo, name).await?.is_some() {
            debug!(repo = %repo.full_name(), branch = name, "Reusing dispatch branch");
            return Ok(BranchEffect::Reused(name.to_string()));
        }

        if let Err(source) = self.platform.vcs.create_branch(repo, actor, base, name).await {
            // A concurrent dispatch of the same issue may have created it first.
            if self.platform.vcs.get_branch(repo, name).await?.is_some() {
                debug!(repo = %repo.full_name(), branch = name, "Dispatch branch created concurrently");
                return Ok(BranchEffect::Reused(name.to_string()));
            }
            return Err(Error::BranchCreationFailed {
                branch: name.to_string(),
                source,
            });
        }
        debug!(repo = %repo.full_name(), branch = name, base, "Created dispatch branch");
        Ok(BranchEffect::Created(name.to_string()))
    }

    async fn open_pull_request(
        &self,
        repo: &Repository,
        head: &str,
        base: &str,
        source: &Issue,
    ) -> Result<PullRequest> {
        let request = NewPullRequest {
            head: head.to_string(),
            base: base.to_string(),
            title: source.title.clone(),
            body: source.title.clone(),
        };
        self.platform
            .pulls
            .create(repo, request)
            .await
            .map_err(|source| Error::PullRequestCreationFailed {
                head: head.to_string(),
                source,
            })
    }

    /// Check and insert the dispatch edge in one write transaction.
    ///
    /// A uniqueness conflict is attributed to the end that is already taken:
    /// the source issue, the pull request or the pull request's issue.
    fn record(&self, new: NewDispatch) -> Result<DispatchEdge> {
        let source = new.source_issue_id;
        self.store.write(|tx| -> Result<DispatchEdge> {
            if tx.dispatch_exists(source)? {
                return Err(Error::DispatchExists(source));
            }
            match tx.insert_dispatch(new) {
                Ok(edge) => Ok(edge),
                Err(StoreError::Conflict) => Err(conflicting_end(tx, &new)?),
                Err(other) => Err(Error::Store(other)),
            }
        })
    }

    async fn hydrate(&self, edge: &DispatchEdge) -> Result<Dispatch> {
        let repository = self
            .platform
            .repositories
            .by_id(edge.repo_id)
            .await?
            .ok_or_else(|| dangling(edge, EntityRef::Repository(edge.repo_id)))?;
        let pull_request = self
            .platform
            .pulls
            .by_id(edge.pull_request_id)
            .await?
            .ok_or_else(|| dangling(edge, EntityRef::PullRequest(edge.pull_request_id)))?;
        let issue = self
            .platform
            .issues
            .by_id(edge.target_issue_id)
            .await?
            .ok_or_else(|| dangling(edge, EntityRef::Issue(edge.target_issue_id)))?;

        Ok(Dispatch {
            repository,
            pull_request,
            issue,
        })
    }
}

/// The error for a dispatch insert that hit a uniqueness constraint.
fn conflicting_end(tx: &EdgeTx<'_>, new: &NewDispatch) -> Result<Error> {
    if tx.dispatch_exists(new.source_issue_id)? {
        return Ok(Error::DispatchExists(new.source_issue_id));
    }
    if let Some(edge) = tx.dispatch_by_pull_request(new.pull_request_id)? {
        return Ok(Error::DispatchTargetTaken {
            target: EntityRef::PullRequest(new.pull_request_id),
            dispatched_from: edge.source_issue_id,
        });
    }
    if let Some(edge) = tx.dispatch_by_target(new.target_issue_id)? {
        return Ok(Error::DispatchTargetTaken {
            target: EntityRef::Issue(new.target_issue_id),
            dispatched_from: edge.source_issue_id,
        });
    }
    Ok(Error::Store(StoreError::Conflict))
}

fn dangling(edge: &DispatchEdge, missing: EntityRef) -> Error {
    warn!(edge = %edge.id, missing = %missing, "Dispatch edge references a missing entity");
    Error::DanglingReference {
        edge: edge.id,
        missing,
    }
}
