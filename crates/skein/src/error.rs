//! Error types for skein operations.
//!
//! Every failure is an expected, caller-recoverable condition. Variants are
//! grouped into families (see [`ErrorFamily`]) so that a routing layer can map
//! them to responses without matching each one.

pub use crate::domain::EntityRef;
use crate::domain::{EdgeId, IssueId, PullRequestId, RepoId, UserId};
use crate::platform::PlatformError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// How an issue was addressed when it could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLocator {
    /// By global identifier
    Id(IssueId),

    /// By repository-relative index
    Index {
        /// Repository searched
        repo: RepoId,
        /// Index searched for
        index: i64,
    },
}

impl fmt::Display for IssueLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Index { repo, index } => write!(f, "#{index} in repository {repo}"),
        }
    }
}

/// The error type for skein operations.
#[derive(Debug, Error)]
pub enum Error {
    // === NotFound ===
    /// Repository does not exist
    #[error("repository {0} not found")]
    RepositoryNotFound(RepoId),

    /// Branch does not exist in the repository
    #[error("branch '{branch}' not found in repository {repo}")]
    BranchNotFound {
        /// Repository searched
        repo: RepoId,
        /// Branch name
        branch: String,
    },

    /// Issue does not exist
    #[error("issue {0} not found")]
    IssueNotFound(IssueLocator),

    // === Constraint ===
    /// Both ends of an edge must live in the same repository
    #[error("issues {issue} and {other} belong to different repositories")]
    CrossRepository {
        /// Anchor issue
        issue: IssueId,
        /// Other end
        other: IssueId,
    },

    /// An issue cannot be related to itself
    #[error("issue {0} cannot be related to itself")]
    SameIssue(IssueId),

    // === Conflict ===
    /// Dependency already exists
    #[error("issue {issue} already depends on {depends_on}")]
    DependencyExists {
        /// Blocked issue
        issue: IssueId,
        /// Blocking issue
        depends_on: IssueId,
    },

    /// The dependency would close a cycle
    #[error("dependency {issue} -> {depends_on} would create a cycle")]
    CircularDependency {
        /// Blocked issue
        issue: IssueId,
        /// Blocking issue
        depends_on: IssueId,
    },

    /// Group reaction already exists
    #[error("issue {child} is already a child of {issue}")]
    GroupReactionExists {
        /// Parent issue
        issue: IssueId,
        /// Child issue
        child: IssueId,
    },

    /// The group reaction would close a cycle
    #[error("group reaction {issue} -> {child} would create a cycle")]
    CircularGroupReaction {
        /// Parent issue
        issue: IssueId,
        /// Child issue
        child: IssueId,
    },

    /// The issue has already been dispatched
    #[error("issue {0} has already been dispatched")]
    DispatchExists(IssueId),

    /// The pull request, or its issue, already records another dispatch
    #[error("{target} already records the dispatch of issue {dispatched_from}")]
    DispatchTargetTaken {
        /// Pull request or pull-request issue already in use
        target: EntityRef,
        /// Issue of the existing dispatch
        dispatched_from: IssueId,
    },

    // === NotExists on remove ===
    /// No such dependency
    #[error("issue {issue} does not depend on {depends_on}")]
    DependencyNotExists {
        /// Blocked issue
        issue: IssueId,
        /// Blocking issue
        depends_on: IssueId,
    },

    /// No such group reaction
    #[error("issue {child} is not a child of {issue}")]
    GroupReactionNotExists {
        /// Parent issue
        issue: IssueId,
        /// Child issue
        child: IssueId,
    },

    /// No dispatch recorded for the issue
    #[error("issue {0} has not been dispatched")]
    DispatchNotExists(IssueId),

    // === External ===
    /// The actor is not allowed to perform the action
    #[error("user {actor} is not allowed to {action} in repository {repo}")]
    PermissionDenied {
        /// Acting user
        actor: UserId,
        /// Repository the action targets
        repo: RepoId,
        /// Short description of the action
        action: &'static str,
    },

    /// Creating a branch failed
    #[error("failed to create branch '{branch}': {source}")]
    BranchCreationFailed {
        /// Branch that was being created
        branch: String,
        /// Collaborator failure
        #[source]
        source: PlatformError,
    },

    /// Opening a pull request failed
    #[error("failed to open pull request from '{head}': {source}")]
    PullRequestCreationFailed {
        /// Head branch of the attempted pull request
        head: String,
        /// Collaborator failure
        #[source]
        source: PlatformError,
    },

    /// The branch is protected or is the repository's default branch
    #[error("branch '{branch}' in repository {repo} is protected")]
    BranchProtected {
        /// Repository
        repo: RepoId,
        /// Branch name
        branch: String,
    },

    /// A collaborator lookup failed
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    // === Integrity ===
    /// An edge points at an entity that no longer exists
    #[error("edge {edge} references missing {missing}")]
    DanglingReference {
        /// The edge row
        edge: EdgeId,
        /// What could not be resolved
        missing: EntityRef,
    },

    // === Internal ===
    /// The edge store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse grouping of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    /// A referenced entity is missing
    NotFound,
    /// The request is malformed and was rejected before any write
    Constraint,
    /// The edge already exists or would create a cycle
    Conflict,
    /// A removal matched nothing
    NotExists,
    /// A collaborator refused or failed
    External,
    /// Stored edges disagree with the host's data
    Integrity,
    /// Infrastructure failure inside skein
    Internal,
}

impl fmt::Display for ErrorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Constraint => "constraint",
            Self::Conflict => "conflict",
            Self::NotExists => "not exists",
            Self::External => "external",
            Self::Integrity => "integrity",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// The family this error belongs to.
    #[must_use]
    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::RepositoryNotFound(_) | Self::BranchNotFound { .. } | Self::IssueNotFound(_) => {
                ErrorFamily::NotFound
            }
            Self::CrossRepository { .. } | Self::SameIssue(_) => ErrorFamily::Constraint,
            Self::DependencyExists { .. }
            | Self::CircularDependency { .. }
            | Self::GroupReactionExists { .. }
            | Self::CircularGroupReaction { .. }
            | Self::DispatchExists(_)
            | Self::DispatchTargetTaken { .. } => ErrorFamily::Conflict,
            Self::DependencyNotExists { .. }
            | Self::GroupReactionNotExists { .. }
            | Self::DispatchNotExists(_) => ErrorFamily::NotExists,
            Self::PermissionDenied { .. }
            | Self::BranchCreationFailed { .. }
            | Self::PullRequestCreationFailed { .. }
            | Self::BranchProtected { .. }
            | Self::Platform(_) => ErrorFamily::External,
            Self::DanglingReference { .. } => ErrorFamily::Integrity,
            Self::Store(_) => ErrorFamily::Internal,
        }
    }

    /// Returns `true` if the caller can fix the request (4xx-style).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.family(),
            ErrorFamily::NotFound
                | ErrorFamily::Constraint
                | ErrorFamily::Conflict
                | ErrorFamily::NotExists
        ) || matches!(
            self,
            Self::PermissionDenied { .. } | Self::BranchProtected { .. }
        )
    }
}

/// A specialized Result type for skein operations.
pub type Result<T> = std::result::Result<T, Error>;
