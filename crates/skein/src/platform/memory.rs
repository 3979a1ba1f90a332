//! In-memory host platform for tests.
//!
//! [`MemoryPlatform`] implements every collaborator trait over a shared,
//! mutable state. Clones share that state, so a test can keep a handle for
//! setup and assertions while the services under test hold another.
//!
//! Everything is permitted by default. Refusals and failures are opted into
//! per test with the `deny_*` and `fail_*` methods.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    AuthorizationGate, IssueLookup, Platform, PlatformError, PlatformResult, PullRequestService,
    RepositoryLookup, VersionControl,
};
use crate::domain::{
    Branch, Issue, IssueId, NewPullRequest, PullRequest, PullRequestId, RepoId, Repository, UserId,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    repositories: HashMap<RepoId, Repository>,
    branches: HashMap<RepoId, BTreeMap<String, Branch>>,
    protected: HashSet<(RepoId, String)>,
    issues: HashMap<IssueId, Issue>,
    next_index: HashMap<RepoId, i64>,
    pull_requests: HashMap<PullRequestId, PullRequest>,
    denied_branch_creation: HashSet<(RepoId, UserId)>,
    denied_dependency_management: HashSet<(RepoId, UserId)>,
    fail_next_branch: Option<String>,
    fail_next_pull_request: Option<String>,
    unavailable: bool,
    branch_creations: usize,
    pull_request_creations: usize,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn allocate_index(&mut self, repo: RepoId) -> i64 {
        let index = self.next_index.entry(repo).or_insert(0);
        *index += 1;
        *index
    }

    fn commit_id(&mut self) -> String {
        format!("{:040x}", self.allocate_id())
    }

    fn insert_issue(&mut self, repo: RepoId, title: &str, is_pull: bool) -> Issue {
        let issue = Issue {
            id: IssueId::new(self.allocate_id()),
            repo_id: repo,
            index: self.allocate_index(repo),
            title: title.to_string(),
            is_pull,
        };
        self.issues.insert(issue.id, issue.clone());
        issue
    }

    fn check_available(&self) -> PlatformResult<()> {
        if self.unavailable {
            Err(PlatformError::Unavailable("memory platform offline".to_string()))
        } else {
            Ok(())
        }
    }
}

/// A stateful, in-memory implementation of every platform trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlatform {
    state: Arc<Mutex<State>>,
}

impl MemoryPlatform {
    /// Create an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bundle this platform as every collaborator.
    #[must_use]
    pub fn platform(&self) -> Platform {
        Platform::from_host(Arc::new(self.clone()))
    }

    /// Add a repository together with its default branch.
    pub fn add_repository(&self, owner: &str, name: &str, default_branch: &str) -> Repository {
        let mut state = self.lock();
        let repo = Repository {
            id: RepoId::new(state.allocate_id()),
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: default_branch.to_string(),
        };
        state.repositories.insert(repo.id, repo.clone());
        let branch = Branch {
            name: default_branch.to_string(),
            commit_id: state.commit_id(),
        };
        state
            .branches
            .entry(repo.id)
            .or_default()
            .insert(branch.name.clone(), branch);
        repo
    }

    /// Add a branch to `repo`.
    pub fn add_branch(&self, repo: RepoId, name: &str) -> Branch {
        let mut state = self.lock();
        let branch = Branch {
            name: name.to_string(),
            commit_id: state.commit_id(),
        };
        state
            .branches
            .entry(repo)
            .or_default()
            .insert(name.to_string(), branch.clone());
        branch
    }

    /// Mark `name` as protected in `repo`.
    pub fn protect_branch(&self, repo: RepoId, name: &str) {
        self.lock().protected.insert((repo, name.to_string()));
    }

    /// Whether `repo` has a branch called `name`.
    #[must_use]
    pub fn has_branch(&self, repo: RepoId, name: &str) -> bool {
        self.lock()
            .branches
            .get(&repo)
            .is_some_and(|branches| branches.contains_key(name))
    }

    /// Branch names of `repo`, sorted.
    #[must_use]
    pub fn branch_names(&self, repo: RepoId) -> Vec<String> {
        self.lock()
            .branches
            .get(&repo)
            .map(|branches| branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Open a new issue in `repo`.
    pub fn add_issue(&self, repo: RepoId, title: &str) -> Issue {
        self.lock().insert_issue(repo, title, false)
    }

    /// Delete an issue, leaving any edge that references it dangling.
    pub fn remove_issue(&self, id: IssueId) {
        self.lock().issues.remove(&id);
    }

    /// Delete a repository record.
    pub fn remove_repository(&self, id: RepoId) {
        self.lock().repositories.remove(&id);
    }

    /// Delete a pull request record.
    pub fn remove_pull_request(&self, id: PullRequestId) {
        self.lock().pull_requests.remove(&id);
    }

    /// Pull requests opened in `repo`, oldest first.
    #[must_use]
    pub fn pull_requests(&self, repo: RepoId) -> Vec<PullRequest> {
        let mut pulls: Vec<_> = self
            .lock()
            .pull_requests
            .values()
            .filter(|pr| pr.repo_id == repo)
            .cloned()
            .collect();
        pulls.sort_by_key(|pr| pr.index);
        pulls
    }

    /// Refuse branch creation for `actor` in `repo`.
    pub fn deny_branch_creation(&self, repo: RepoId, actor: UserId) {
        self.lock().denied_branch_creation.insert((repo, actor));
    }

    /// Refuse dependency management for `actor` in `repo`.
    pub fn deny_dependency_management(&self, repo: RepoId, actor: UserId) {
        self.lock().denied_dependency_management.insert((repo, actor));
    }

    /// Make the next `create_branch` call fail with `reason`.
    pub fn fail_next_branch_creation(&self, reason: &str) {
        self.lock().fail_next_branch = Some(reason.to_string());
    }

    /// Make the next pull-request creation fail with `reason`.
    pub fn fail_next_pull_request(&self, reason: &str) {
        self.lock().fail_next_pull_request = Some(reason.to_string());
    }

    /// Make every lookup fail with `PlatformError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Number of successful `create_branch` calls.
    #[must_use]
    pub fn branch_creations(&self) -> usize {
        self.lock().branch_creations
    }

    /// Number of successful pull-request creations.
    #[must_use]
    pub fn pull_request_creations(&self) -> usize {
        self.lock().pull_request_creations
    }
}

#[async_trait]
impl IssueLookup for MemoryPlatform {
    async fn by_index(&self, repo: RepoId, index: i64) -> PlatformResult<Option<Issue>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .issues
            .values()
            .find(|issue| issue.repo_id == repo && issue.index == index)
            .cloned())
    }

    async fn by_id(&self, id: IssueId) -> PlatformResult<Option<Issue>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.issues.get(&id).cloned())
    }
}

#[async_trait]
impl RepositoryLookup for MemoryPlatform {
    async fn by_id(&self, id: RepoId) -> PlatformResult<Option<Repository>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.repositories.get(&id).cloned())
    }
}

#[async_trait]
impl VersionControl for MemoryPlatform {
    async fn get_branch(&self, repo: &Repository, name: &str) -> PlatformResult<Option<Branch>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .branches
            .get(&repo.id)
            .and_then(|branches| branches.get(name))
            .cloned())
    }

    async fn create_branch(
        &self,
        repo: &Repository,
        _actor: UserId,
        base: &str,
        new_name: &str,
    ) -> PlatformResult<()> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_next_branch.take() {
            return Err(PlatformError::Rejected(reason));
        }
        let commit_id = state.commit_id();
        let branches = state.branches.entry(repo.id).or_default();
        if !branches.contains_key(base) {
            return Err(PlatformError::Rejected(format!("base branch '{base}' missing")));
        }
        if branches.contains_key(new_name) {
            return Err(PlatformError::Rejected(format!("branch '{new_name}' already exists")));
        }
        branches.insert(
            new_name.to_string(),
            Branch {
                name: new_name.to_string(),
                commit_id,
            },
        );
        state.branch_creations += 1;
        Ok(())
    }

    async fn delete_branch(&self, repo: &Repository, name: &str, _force: bool) -> PlatformResult<()> {
        let mut state = self.lock();
        let removed = state
            .branches
            .get_mut(&repo.id)
            .and_then(|branches| branches.remove(name));
        match removed {
            Some(_) => Ok(()),
            None => Err(PlatformError::Rejected(format!("branch '{name}' missing"))),
        }
    }

    async fn is_protected_branch(&self, repo: &Repository, name: &str) -> PlatformResult<bool> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.protected.contains(&(repo.id, name.to_string())))
    }
}

#[async_trait]
impl PullRequestService for MemoryPlatform {
    async fn create(&self, repo: &Repository, request: NewPullRequest) -> PlatformResult<PullRequest> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_next_pull_request.take() {
            return Err(PlatformError::Rejected(reason));
        }
        let has = |name: &str| {
            state
                .branches
                .get(&repo.id)
                .is_some_and(|branches| branches.contains_key(name))
        };
        if !has(&request.head) || !has(&request.base) {
            return Err(PlatformError::Rejected(format!(
                "cannot open pull request {} -> {}",
                request.head, request.base
            )));
        }

        let issue = state.insert_issue(repo.id, &request.title, true);
        let pull_request = PullRequest {
            id: PullRequestId::new(state.allocate_id()),
            issue_id: issue.id,
            repo_id: repo.id,
            index: issue.index,
            head: request.head,
            base: request.base,
            title: request.title,
            body: request.body,
        };
        state
            .pull_requests
            .insert(pull_request.id, pull_request.clone());
        state.pull_request_creations += 1;
        Ok(pull_request)
    }

    async fn by_id(&self, id: PullRequestId) -> PlatformResult<Option<PullRequest>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.pull_requests.get(&id).cloned())
    }
}

#[async_trait]
impl AuthorizationGate for MemoryPlatform {
    async fn can_create_branch(&self, repo: RepoId, actor: UserId) -> bool {
        !self.lock().denied_branch_creation.contains(&(repo, actor))
    }

    async fn can_manage_dependencies(&self, repo: RepoId, actor: UserId) -> bool {
        !self.lock().denied_dependency_management.contains(&(repo, actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pull_requests_share_the_issue_index_sequence() {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        host.add_branch(repo.id, "topic");
        let first = host.add_issue(repo.id, "first");

        let pr = PullRequestService::create(
            &host,
            &repo,
            NewPullRequest {
                head: "topic".to_string(),
                base: "main".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(first.index, 1);
        assert_eq!(pr.index, 2);
        let issue = IssueLookup::by_id(&host, pr.issue_id).await.unwrap().unwrap();
        assert!(issue.is_pull);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        host.fail_next_branch_creation("disk full");

        let first = VersionControl::create_branch(&host, &repo, UserId::new(1), "main", "a").await;
        let second = VersionControl::create_branch(&host, &repo, UserId::new(1), "main", "a").await;

        assert!(matches!(first, Err(PlatformError::Rejected(reason)) if reason == "disk full"));
        assert!(second.is_ok());
        assert_eq!(host.branch_creations(), 1);
    }
}
