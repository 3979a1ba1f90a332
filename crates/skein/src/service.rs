//! The relations facade used by request handlers.
//!
//! [`Relations`] bundles the three edge services with the host collaborators.
//! Handlers address the anchor issue by repository and index, as they appear
//! in a URL, and the other end of an edge by its global identifier. Every
//! mutation answers with the anchor's refreshed [`IssueView`]; once the write
//! has committed, a relation that no longer resolves is reported in the view
//! rather than as an error.

use std::sync::Arc;
use tracing::{info, warn};

use crate::branches::BranchManager;
use crate::dispatch::{DispatchError, DispatchOrchestrator, DispatchRequest, DispatchStep};
use crate::domain::{
    DependencyDirection, Dispatch, DispatchEdge, Issue, IssueId, IssueView, PullRequestId, RepoId,
    UnresolvedRelation, UserId, ViewField,
};
use crate::error::{Error, IssueLocator, Result};
use crate::graph::{CyclePolicy, DependencyGraph, ReactionTree};
use crate::platform::Platform;
use crate::store::{EdgeStore, PurgeReport};

/// Entry point for every relation operation.
#[derive(Clone)]
pub struct Relations {
    store: Arc<EdgeStore>,
    platform: Platform,
    dependencies: DependencyGraph,
    reactions: ReactionTree,
    dispatches: DispatchOrchestrator,
    branches: BranchManager,
}

impl std::fmt::Debug for Relations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relations")
            .field("dependencies", &self.dependencies)
            .field("reactions", &self.reactions)
            .finish_non_exhaustive()
    }
}

impl Relations {
    /// Build the facade over `store` and the host collaborators.
    #[must_use]
    pub fn new(store: Arc<EdgeStore>, platform: Platform) -> Self {
        Self {
            dependencies: DependencyGraph::new(Arc::clone(&store), &platform),
            reactions: ReactionTree::new(Arc::clone(&store), &platform),
            dispatches: DispatchOrchestrator::new(Arc::clone(&store), platform.clone()),
            branches: BranchManager::new(platform.clone()),
            store,
            platform,
        }
    }

    /// Use `policy` for both dependency and reaction cycle checks.
    #[must_use]
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.dependencies = self.dependencies.with_cycle_policy(policy);
        self.reactions = self.reactions.with_cycle_policy(policy);
        self
    }

    /// The dependency service.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// The group-reaction service.
    #[must_use]
    pub fn reactions(&self) -> &ReactionTree {
        &self.reactions
    }

    /// The dispatch orchestrator.
    #[must_use]
    pub fn dispatches(&self) -> &DispatchOrchestrator {
        &self.dispatches
    }

    /// Branch management.
    #[must_use]
    pub fn branches(&self) -> &BranchManager {
        &self.branches
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

    async fn view(&self, issue: Issue) -> Result<IssueView> {
        Ok(IssueView {
            blocked_by: self.dependencies.list_blocked_by(&issue).await?,
            blocking: self.dependencies.list_blocking(&issue).await?,
            children: self.reactions.list_children(&issue).await?,
            parents: self.reactions.list_parents(&issue).await?,
            dispatch: self.dispatches.find_dispatch(issue.id).await?,
            unresolved: Vec::new(),
            issue,
        })
    }

    /// The view answered after a committed write.
    ///
    /// A relation that no longer resolves leaves its field empty and is listed
    /// in [`IssueView::unresolved`], so the caller still learns that the write
    /// went through. Store and platform failures are returned as errors.
    async fn refreshed_view(&self, issue: Issue) -> Result<IssueView> {
        let mut unresolved = Vec::new();
        let blocked_by = settle(
            self.dependencies.list_blocked_by(&issue).await,
            ViewField::BlockedBy,
            &mut unresolved,
        )?;
        let blocking = settle(
            self.dependencies.list_blocking(&issue).await,
            ViewField::Blocking,
            &mut unresolved,
        )?;
        let children = settle(
            self.reactions.list_children(&issue).await,
            ViewField::Children,
            &mut unresolved,
        )?;
        let parents = settle(
            self.reactions.list_parents(&issue).await,
            ViewField::Parents,
            &mut unresolved,
        )?;
        let dispatch = settle(
            self.dispatches.find_dispatch(issue.id).await,
            ViewField::Dispatch,
            &mut unresolved,
        )?;

        if !unresolved.is_empty() {
            warn!(
                issue = %issue.id,
                unresolved = unresolved.len(),
                "Issue view left out relations with missing references"
            );
        }
        Ok(IssueView {
            issue,
            blocked_by: blocked_by.unwrap_or_default(),
            blocking: blocking.unwrap_or_default(),
            children: children.unwrap_or_default(),
            parents: parents.unwrap_or_default(),
            dispatch: dispatch.flatten(),
            unresolved,
        })
    }

    /// Issue `index` of `repo` with all of its relations.
    ///
    /// Unlike the views answered by mutations, a relation that no longer
    /// resolves fails the whole call.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound`, or `DanglingReference` if a stored edge can no
    /// longer be resolved.
    pub async fn issue_view(&self, repo: RepoId, index: i64) -> Result<IssueView> {
        let issue = self.issue_by_index(repo, index).await?;
        self.view(issue).await
    }

    /// Record that issue `index` of `repo` is blocked by `depends_on`.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::add_dependency`]; also `IssueNotFound` for
    /// either end.
    pub async fn add_dependency(
        &self,
        actor: UserId,
        repo: RepoId,
        index: i64,
        depends_on: IssueId,
    ) -> Result<IssueView> {
        let issue = self.issue_by_index(repo, index).await?;
        let other = self.issue_by_id(depends_on).await?;
        self.dependencies.add_dependency(actor, &issue, &other).await?;
        self.refreshed_view(issue).await
    }

    /// Remove a dependency between issue `index` of `repo` and `other`.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::remove_dependency`].
    pub async fn remove_dependency(
        &self,
        actor: UserId,
        repo: RepoId,
        index: i64,
        other: IssueId,
        direction: DependencyDirection,
    ) -> Result<IssueView> {
        let issue = self.issue_by_index(repo, index).await?;
        let other = self.issue_by_id(other).await?;
        self.dependencies
            .remove_dependency(actor, &issue, &other, direction)
            .await?;
        self.refreshed_view(issue).await
    }

    /// Issues blocked by issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `DanglingReference`.
    pub async fn list_blocking(&self, repo: RepoId, index: i64) -> Result<Vec<Issue>> {
        let issue = self.issue_by_index(repo, index).await?;
        self.dependencies.list_blocking(&issue).await
    }

    /// Issues blocking issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `DanglingReference`.
    pub async fn list_blocked_by(&self, repo: RepoId, index: i64) -> Result<Vec<Issue>> {
        let issue = self.issue_by_index(repo, index).await?;
        self.dependencies.list_blocked_by(&issue).await
    }

    /// Make `child` a child of issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// See [`ReactionTree::add_reaction`]; also `IssueNotFound` for either end.
    pub async fn add_reaction(
        &self,
        actor: UserId,
        repo: RepoId,
        index: i64,
        child: IssueId,
    ) -> Result<IssueView> {
        let issue = self.issue_by_index(repo, index).await?;
        let child = self.issue_by_id(child).await?;
        self.reactions.add_reaction(actor, &issue, &child)?;
        self.refreshed_view(issue).await
    }

    /// Detach `child` from issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// See [`ReactionTree::remove_reaction`].
    pub async fn remove_reaction(
        &self,
        actor: UserId,
        repo: RepoId,
        index: i64,
        child: IssueId,
    ) -> Result<IssueView> {
        let issue = self.issue_by_index(repo, index).await?;
        let child = self.issue_by_id(child).await?;
        self.reactions.remove_reaction(actor, &issue, &child)?;
        self.refreshed_view(issue).await
    }

    /// Children of issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `DanglingReference`.
    pub async fn list_children(&self, repo: RepoId, index: i64) -> Result<Vec<Issue>> {
        let issue = self.issue_by_index(repo, index).await?;
        self.reactions.list_children(&issue).await
    }

    /// Parents of issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `DanglingReference`.
    pub async fn list_parents(&self, repo: RepoId, index: i64) -> Result<Vec<Issue>> {
        let issue = self.issue_by_index(repo, index).await?;
        self.reactions.list_parents(&issue).await
    }

    /// Dispatch an issue and return its refreshed view.
    ///
    /// Relations of the issue that no longer resolve are reported in
    /// [`IssueView::unresolved`]. If the dispatch is recorded but the view
    /// cannot be loaded at all, the error is reported at
    /// [`DispatchStep::Success`] with the complete side effects.
    ///
    /// # Errors
    ///
    /// See [`DispatchOrchestrator::dispatch`].
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<IssueView, DispatchError> {
        let (_, effects) = self.dispatches.run(request).await?;
        let refreshed = match self
            .issue_by_index(request.source_repo, request.issue_index)
            .await
        {
            Ok(issue) => self.refreshed_view(issue).await,
            Err(err) => Err(err),
        };
        match refreshed {
            Ok(view) => Ok(view),
            Err(source) => Err(DispatchError {
                step: DispatchStep::Success,
                effects,
                source,
            }),
        }
    }

    /// The dispatch of issue `index` of `repo`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound`, `DispatchNotExists` or `DanglingReference`.
    pub async fn get_dispatch(&self, repo: RepoId, index: i64) -> Result<Dispatch> {
        let issue = self.issue_by_index(repo, index).await?;
        self.dispatches.get_dispatch(issue.id).await
    }

    /// The stored dispatch edge of issue `index` of `repo`, unresolved.
    ///
    /// Unlike [`get_dispatch`](Self::get_dispatch) this succeeds when the pull
    /// request or target repository has since been deleted, which is when the
    /// edge needs removing.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `DispatchNotExists`.
    pub async fn dispatch_edge(&self, repo: RepoId, index: i64) -> Result<DispatchEdge> {
        let issue = self.issue_by_index(repo, index).await?;
        self.dispatches.dispatch_edge(issue.id)
    }

    /// Forget the dispatch of issue `index` of `repo`.
    ///
    /// The branch and pull request stay.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound`, or `DispatchNotExists` if no edge binds the
    /// issue to `dispatched` through `pull_request`.
    pub async fn remove_dispatch(
        &self,
        actor: UserId,
        repo: RepoId,
        index: i64,
        dispatched: IssueId,
        pull_request: PullRequestId,
    ) -> Result<IssueView> {
        let issue = self.issue_by_index(repo, index).await?;
        self.dispatches
            .remove_dispatch(actor, issue.id, dispatched, pull_request)?;
        self.refreshed_view(issue).await
    }

    /// The issue dispatched to `pull_request`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DanglingReference` if the source issue no longer exists.
    pub async fn source_of(&self, pull_request: PullRequestId) -> Result<Option<Issue>> {
        self.dispatches.source_of(pull_request).await
    }

    /// Drop every edge touching `issue`; call when the host deletes it.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the purge fails; nothing is removed in that case.
    pub fn on_issue_deleted(&self, issue: IssueId) -> Result<PurgeReport> {
        let report = self.store.write(|tx| tx.purge_issue(issue))?;
        info!(
            issue = %issue,
            dependencies = report.dependencies,
            reactions = report.reactions,
            dispatches = report.dispatches,
            "Purged edges of deleted issue"
        );
        Ok(report)
    }

    /// Drop every dispatch into `repo`; call when the host deletes it.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the purge fails.
    pub fn on_repository_deleted(&self, repo: RepoId) -> Result<PurgeReport> {
        let report = self.store.write(|tx| tx.purge_repository(repo))?;
        info!(repo = %repo, dispatches = report.dispatches, "Purged dispatches of deleted repository");
        Ok(report)
    }
}

/// Keep a relation's value, or record why it is missing from the view.
fn settle<T>(
    result: Result<T>,
    field: ViewField,
    unresolved: &mut Vec<UnresolvedRelation>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::DanglingReference { edge, missing }) => {
            unresolved.push(UnresolvedRelation {
                field,
                edge,
                missing,
            });
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
