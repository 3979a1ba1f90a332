//! Application context for CLI command execution.
//!
//! [`App`] finds the `.skein/` directory, loads its configuration, opens the
//! edge store and the local host on the configured database, and wires them
//! into a [`Relations`] facade.
//!
//! # Example
//!
//! ```no_run
//! use skein_cli::app::App;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::from_directory(Path::new(".")).await?;
//!     println!("{} repositories", app.host().repositories()?.len());
//!     Ok(())
//! }
//! ```

use crate::cli::types::{IssueRef, RepoRef};
use crate::config::{CONFIG_FILE_NAME, SKEIN_DIR_NAME, SkeinConfig, find_skein_root};
use crate::error::{ConfigError, Error, Result};
use crate::host::LocalHost;
use skein::Relations;
use skein::domain::{Issue, Repository, UserId};
use skein::store::{EdgeStore, PurgeReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application context for CLI operations.
pub struct App {
    relations: Relations,
    host: Arc<LocalHost>,

    /// Path to the skein directory (.skein)
    skein_dir: PathBuf,

    config: SkeinConfig,

    /// User the current command acts as
    actor: UserId,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("skein_dir", &self.skein_dir)
            .field("config", &self.config)
            .field("actor", &self.actor)
            .field("relations", &"<Relations>")
            .finish()
    }
}

impl App {
    /// Create an App instance from the given working directory.
    ///
    /// Searches up the directory tree to find a `.skein/` directory, loads
    /// configuration, and opens the database it names.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No skein repository is found in the directory tree
    /// - Configuration cannot be loaded
    /// - The database cannot be opened
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root_dir = find_skein_root(working_dir).ok_or(ConfigError::NotInitialized)?;

        let skein_dir = root_dir.join(SKEIN_DIR_NAME);
        let config = SkeinConfig::load(&skein_dir.join(CONFIG_FILE_NAME)).await?;

        let database = config.database_path(&root_dir);
        let store = Arc::new(EdgeStore::open(&database)?);
        let host = Arc::new(LocalHost::open(&database)?);
        let relations =
            Relations::new(store, LocalHost::platform(&host)).with_cycle_policy(config.cycle_policy);

        tracing::debug!(
            database = %database.display(),
            policy = %config.cycle_policy,
            "Opened skein repository"
        );

        Ok(Self {
            relations,
            host,
            skein_dir,
            actor: config.actor,
            config,
        })
    }

    /// Act as `actor` instead of the configured user, if given.
    #[must_use]
    pub fn acting_as(mut self, actor: Option<UserId>) -> Self {
        if let Some(actor) = actor {
            self.actor = actor;
        }
        self
    }

    /// The relation services.
    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    /// The local host.
    pub fn host(&self) -> &LocalHost {
        &self.host
    }

    /// The loaded configuration.
    pub fn config(&self) -> &SkeinConfig {
        &self.config
    }

    /// Path to the skein directory.
    pub fn skein_dir(&self) -> &Path {
        &self.skein_dir
    }

    /// User the current command acts as.
    pub fn actor(&self) -> UserId {
        self.actor
    }

    /// Resolve `owner/name`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryNotFound` if no such repository exists.
    pub fn repository(&self, reference: &RepoRef) -> Result<Repository> {
        self.host
            .repository_by_name(&reference.owner, &reference.name)?
            .ok_or_else(|| Error::RepositoryNotFound(reference.to_string()))
    }

    /// Resolve `owner/name#index`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryNotFound` or `IssueNotFound`.
    pub fn issue(&self, reference: &IssueRef) -> Result<Issue> {
        let repo = self.repository(&reference.repo)?;
        self.host
            .issue_at(repo.id, reference.index)?
            .ok_or_else(|| Error::IssueNotFound(reference.to_string()))
    }

    /// Delete an issue from the host and purge every edge that touched it.
    ///
    /// # Errors
    ///
    /// Returns an error if either database operation fails.
    pub fn delete_issue(&self, issue: &Issue) -> Result<PurgeReport> {
        self.host.delete_issue(issue.id)?;
        Ok(self.relations.on_issue_deleted(issue.id)?)
    }

    /// Delete a repository from the host and purge the edges of everything
    /// that lived in it.
    ///
    /// # Errors
    ///
    /// Returns an error if either database operation fails.
    pub fn delete_repository(&self, repo: &Repository) -> Result<PurgeReport> {
        let issues = self.host.delete_repository(repo.id)?;

        let mut total = self.relations.on_repository_deleted(repo.id)?;
        for issue in issues {
            let report = self.relations.on_issue_deleted(issue)?;
            total.dependencies += report.dependencies;
            total.reactions += report.reactions;
            total.dispatches += report.dispatches;
        }
        Ok(total)
    }
}
