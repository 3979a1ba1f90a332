//! The `.skein/` directory: configuration, initialization and discovery.
//!
//! `skein init` creates `.skein/config.yaml` and the database it names.
//! Every other command finds the directory by walking up from the working
//! directory, the way git finds `.git/`.

use crate::error::{ConfigError, Result};
use crate::host::LocalHost;
use serde::{Deserialize, Serialize};
use skein::domain::UserId;
use skein::graph::CyclePolicy;
use skein::store::EdgeStore;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the skein directory
pub const SKEIN_DIR_NAME: &str = ".skein";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the database file
pub const DATABASE_FILE_NAME: &str = "skein.db";

/// Name of the gitignore file within .skein
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// User that commands act as when `--as` is not given
pub const DEFAULT_ACTOR: UserId = UserId::new(1);

/// Maximum directory depth to traverse when searching for the skein root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Configuration file structure for skein
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SkeinConfig {
    /// Database path, relative to the directory holding `.skein/`
    pub database: String,

    /// User id commands act as by default
    pub actor: UserId,

    /// How far cycle detection looks
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
}

impl SkeinConfig {
    /// Create a configuration for `actor` with the default database location.
    pub fn new(actor: UserId, cycle_policy: CyclePolicy) -> Self {
        Self {
            database: format!("{SKEIN_DIR_NAME}/{DATABASE_FILE_NAME}"),
            actor,
            cycle_policy,
        }
    }

    /// Load configuration from a file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(ConfigError::from)?;
        fs::write(path, content).await?;
        Ok(())
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database path cannot be empty".to_string()));
        }
        if self.actor.as_i64() <= 0 {
            return Err(ConfigError::Invalid(format!(
                "actor must be a positive user id, got {}",
                self.actor
            )));
        }
        Ok(())
    }

    /// Absolute path of the database for a repository rooted at `root`.
    pub fn database_path(&self, root: &Path) -> PathBuf {
        root.join(&self.database)
    }
}

impl Default for SkeinConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ACTOR, CyclePolicy::default())
    }
}

/// Result of the init command
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created skein directory
    pub skein_dir: PathBuf,
    /// Path to the created config file
    pub config_file: PathBuf,
    /// Path to the created database
    pub database: PathBuf,
    /// The configuration that was written
    pub config: SkeinConfig,
}

/// Initialize a new skein repository in the given directory.
///
/// Creates `.skein/config.yaml`, a `.gitignore` that keeps the database out
/// of version control, and the database with both the edge tables and the
/// local host tables.
///
/// # Errors
///
/// Returns an error if:
/// - The `.skein/` directory already exists
/// - File system operations fail
/// - The database cannot be created
pub async fn init(base_dir: &Path, config: SkeinConfig) -> Result<InitResult> {
    config.validate()?;

    let skein_dir = base_dir.join(SKEIN_DIR_NAME);
    if skein_dir.exists() {
        return Err(ConfigError::AlreadyInitialized(skein_dir).into());
    }

    fs::create_dir_all(&skein_dir).await?;

    let config_file = skein_dir.join(CONFIG_FILE_NAME);
    config.save(&config_file).await?;

    let gitignore_file = skein_dir.join(GITIGNORE_FILE_NAME);
    let gitignore_content = format!(
        "\
# The skein database is local state, not shared history
{DATABASE_FILE_NAME}
{DATABASE_FILE_NAME}-*
"
    );
    fs::write(&gitignore_file, gitignore_content).await?;

    let database = config.database_path(base_dir);
    EdgeStore::open(&database)?;
    LocalHost::open(&database)?;

    tracing::debug!(path = %skein_dir.display(), "Initialized skein directory");

    Ok(InitResult {
        skein_dir,
        config_file,
        database,
        config,
    })
}

/// Find the skein root directory by searching up the directory tree.
///
/// Returns the directory containing `.skein/`, or `None` if the filesystem
/// root or [`MAX_TRAVERSAL_DEPTH`] is reached first.
pub fn find_skein_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(SKEIN_DIR_NAME).exists() {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    // ========== SkeinConfig Tests ==========

    #[test]
    fn test_config_default() {
        let config = SkeinConfig::default();
        assert_eq!(config.database, ".skein/skein.db");
        assert_eq!(config.actor, DEFAULT_ACTOR);
        assert_eq!(config.cycle_policy, CyclePolicy::Direct);
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let original = SkeinConfig::new(UserId::new(7), CyclePolicy::Transitive);
        original.save(&config_path).await.unwrap();

        let loaded = SkeinConfig::load(&config_path).await.unwrap();
        assert_eq!(original, loaded);
    }

    #[tokio::test]
    async fn test_config_yaml_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        SkeinConfig::new(UserId::new(3), CyclePolicy::Transitive)
            .save(&config_path)
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&config_path).await.unwrap();
        assert!(content.contains("database: .skein/skein.db"));
        assert!(content.contains("actor: 3"));
        assert!(content.contains("cycle-policy: transitive"));
    }

    #[tokio::test]
    async fn test_missing_cycle_policy_defaults_to_direct() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        tokio::fs::write(&config_path, "database: edges.db\nactor: 2\n")
            .await
            .unwrap();

        let config = SkeinConfig::load(&config_path).await.unwrap();
        assert_eq!(config.cycle_policy, CyclePolicy::Direct);
        assert_eq!(config.actor, UserId::new(2));
    }

    #[tokio::test]
    async fn test_non_positive_actor_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        tokio::fs::write(&config_path, "database: edges.db\nactor: 0\n")
            .await
            .unwrap();

        let err = SkeinConfig::load(&config_path).await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Invalid(_))));
    }

    // ========== Init Command Tests ==========

    #[tokio::test]
    async fn test_init_creates_layout() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path(), SkeinConfig::default()).await.unwrap();

        assert!(result.skein_dir.is_dir());
        assert!(result.config_file.is_file());
        assert!(result.database.is_file());
        assert!(result.skein_dir.join(GITIGNORE_FILE_NAME).is_file());
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        init(temp_dir.path(), SkeinConfig::default()).await.unwrap();

        let err = init(temp_dir.path(), SkeinConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::AlreadyInitialized(_))));
    }

    // ========== Root Discovery Tests ==========

    #[tokio::test]
    async fn test_find_root_from_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        init(temp_dir.path(), SkeinConfig::default()).await.unwrap();
        let nested = temp_dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_skein_root(&nested), Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn test_find_root_without_skein_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(find_skein_root(temp_dir.path()), None);
    }
}
