//! Error types for the skein command line.

use skein::store::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the `.skein/` directory and its configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No `.skein/` directory above the working directory.
    #[error("not a skein repository (or any parent up to the filesystem root); run `skein init`")]
    NotInitialized,

    /// `skein init` found an existing `.skein/` directory.
    #[error("skein is already initialized here; found existing '{}'", .0.display())]
    AlreadyInitialized(PathBuf),

    /// The configuration file could not be parsed or written.
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configured value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The error type for skein CLI operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The local host database failed.
    #[error("host database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The edge store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A relation operation was refused or failed.
    #[error(transparent)]
    Relations(#[from] skein::Error),

    /// No repository with this `owner/name`.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// A repository with this `owner/name` already exists.
    #[error("repository already exists: {0}")]
    RepositoryExists(String),

    /// No issue with this reference.
    #[error("issue not found: {0}")]
    IssueNotFound(String),

    /// A thread panicked while holding the host connection.
    #[error("host connection mutex poisoned: {0}")]
    Poisoned(String),
}

/// A specialized Result type for skein CLI operations.
pub type Result<T> = std::result::Result<T, Error>;
