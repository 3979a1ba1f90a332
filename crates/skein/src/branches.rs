//! Branch creation and deletion on behalf of a user.
//!
//! Thin checks in front of [`VersionControl`]: the authorization gate is
//! asked first, the source branch must exist, and protected or default
//! branches are never deleted.
//!
//! [`VersionControl`]: crate::platform::VersionControl

use tracing::debug;

use crate::domain::{Branch, RepoId, Repository, UserId};
use crate::error::{Error, Result};
use crate::platform::Platform;

/// Creates and deletes branches through the host's version-control layer.
#[derive(Clone)]
pub struct BranchManager {
    platform: Platform,
}

impl std::fmt::Debug for BranchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchManager").finish_non_exhaustive()
    }
}

impl BranchManager {
    /// Create a manager over the host collaborators.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn prepare(&self, actor: UserId, repo: RepoId) -> Result<Repository> {
        let repository = self
            .platform
            .repositories
            .by_id(repo)
            .await?
            .ok_or(Error::RepositoryNotFound(repo))?;

        if !self.platform.gate.can_create_branch(repo, actor).await {
            return Err(Error::PermissionDenied {
                actor,
                repo,
                action: "manage branches",
            });
        }
        Ok(repository)
    }

    async fn existing(&self, repository: &Repository, name: &str) -> Result<Branch> {
        self.platform
            .vcs
            .get_branch(repository, name)
            .await?
            .ok_or_else(|| Error::BranchNotFound {
                repo: repository.id,
                branch: name.to_string(),
            })
    }

    /// Create `new_name` from the head of `old_name`.
    ///
    /// # Errors
    ///
    /// - `RepositoryNotFound`, `PermissionDenied`
    /// - `BranchNotFound` if `old_name` does not exist
    /// - `BranchCreationFailed` if the version-control layer refuses
    pub async fn create_branch(
        &self,
        actor: UserId,
        repo: RepoId,
        old_name: &str,
        new_name: &str,
    ) -> Result<Branch> {
        let repository = self.prepare(actor, repo).await?;
        self.existing(&repository, old_name).await?;

        self.platform
            .vcs
            .create_branch(&repository, actor, old_name, new_name)
            .await
            .map_err(|source| Error::BranchCreationFailed {
                branch: new_name.to_string(),
                source,
            })?;

        let branch = self.existing(&repository, new_name).await?;
        debug!(
            repo = %repository.full_name(),
            branch = new_name,
            from = old_name,
            actor = %actor,
            "Created branch"
        );
        Ok(branch)
    }

    /// Delete `name`, even if unmerged.
    ///
    /// # Errors
    ///
    /// - `RepositoryNotFound`, `PermissionDenied`
    /// - `BranchNotFound` if `name` does not exist
    /// - `BranchProtected` for a protected branch or the default branch
    pub async fn delete_branch(&self, actor: UserId, repo: RepoId, name: &str) -> Result<()> {
        let repository = self.prepare(actor, repo).await?;
        self.existing(&repository, name).await?;

        let protected = name == repository.default_branch
            || self.platform.vcs.is_protected_branch(&repository, name).await?;
        if protected {
            return Err(Error::BranchProtected {
                repo,
                branch: name.to_string(),
            });
        }

        self.platform.vcs.delete_branch(&repository, name, true).await?;
        debug!(repo = %repository.full_name(), branch = name, actor = %actor, "Deleted branch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;

    #[tokio::test]
    async fn default_branch_cannot_be_deleted() {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        let manager = BranchManager::new(host.platform());

        let err = manager
            .delete_branch(UserId::new(1), repo.id, "main")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BranchProtected { .. }));
    }

    #[tokio::test]
    async fn create_then_delete() {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        let owner = UserId::new(1);
        let manager = BranchManager::new(host.platform());

        let branch = manager
            .create_branch(owner, repo.id, "main", "feature")
            .await
            .unwrap();
        assert_eq!(branch.name, "feature");

        manager.delete_branch(owner, repo.id, "feature").await.unwrap();
        assert!(!host.has_branch(repo.id, "feature"));
    }
}
