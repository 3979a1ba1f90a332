//! Domain types for issue relationships.
//!
//! Issues, repositories, branches and pull requests are owned by the host
//! platform; skein only references them by identifier. The edge types in
//! this module are the rows skein owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw key.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw key as stored in the database.
            #[must_use]
            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(
    /// Unique identifier for an issue (pull requests have one too)
    IssueId
);
id_newtype!(
    /// Unique identifier for a repository
    RepoId
);
id_newtype!(
    /// Unique identifier for a pull request
    PullRequestId
);
id_newtype!(
    /// Unique identifier for a user
    UserId
);
id_newtype!(
    /// Row identifier of an edge owned by skein
    EdgeId
);

/// An issue as seen through the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Globally unique identifier
    pub id: IssueId,

    /// Repository the issue belongs to
    pub repo_id: RepoId,

    /// Repository-relative number (`#42`)
    pub index: i64,

    /// Issue title
    pub title: String,

    /// Whether this issue backs a pull request
    pub is_pull: bool,
}

/// A repository as seen through the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique identifier
    pub id: RepoId,

    /// Owner login
    pub owner: String,

    /// Repository name
    pub name: String,

    /// Branch used when a request names no base branch
    pub default_branch: String,
}

impl Repository {
    /// `owner/name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A branch in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name
    pub name: String,

    /// Commit the branch points at
    pub commit_id: String,
}

/// A pull request as seen through the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Unique identifier
    pub id: PullRequestId,

    /// The issue that carries the pull request's conversation
    pub issue_id: IssueId,

    /// Repository the pull request was opened in
    pub repo_id: RepoId,

    /// Repository-relative number, shared with its issue
    pub index: i64,

    /// Source branch
    pub head: String,

    /// Target branch
    pub base: String,

    /// Title
    pub title: String,

    /// Description
    pub body: String,
}

/// Data for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    /// Source branch
    pub head: String,

    /// Target branch
    pub base: String,

    /// Title
    pub title: String,

    /// Description
    pub body: String,
}

/// "Issue is blocked by `depends_on_id`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Row identifier
    pub id: EdgeId,

    /// User who created the edge
    pub actor: UserId,

    /// The blocked issue
    pub issue_id: IssueId,

    /// The blocking issue
    pub depends_on_id: IssueId,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Always equal to `created_at`; edges are immutable
    pub updated_at: DateTime<Utc>,
}

/// "Issue has child `child_id`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEdge {
    /// Row identifier
    pub id: EdgeId,

    /// User who created the edge
    pub actor: UserId,

    /// The parent issue
    pub issue_id: IssueId,

    /// The child issue
    pub child_id: IssueId,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Always equal to `created_at`; edges are immutable
    pub updated_at: DateTime<Utc>,
}

/// "Issue was forwarded to a pull request in a target repository".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEdge {
    /// Row identifier
    pub id: EdgeId,

    /// User who dispatched the issue
    pub actor: UserId,

    /// The issue that was dispatched
    pub source_issue_id: IssueId,

    /// The pull request's own issue
    pub target_issue_id: IssueId,

    /// Repository the pull request lives in
    pub repo_id: RepoId,

    /// The pull request created for the dispatch
    pub pull_request_id: PullRequestId,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Always equal to `created_at`; edges are immutable
    pub updated_at: DateTime<Utc>,
}

/// Data for recording a dispatch edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewDispatch {
    /// User who dispatched the issue
    pub actor: UserId,

    /// The issue being dispatched
    pub source_issue_id: IssueId,

    /// The pull request's own issue
    pub target_issue_id: IssueId,

    /// Repository the pull request lives in
    pub repo_id: RepoId,

    /// The pull request
    pub pull_request_id: PullRequestId,
}

/// Which of the two symmetric dependency relations a removal targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyDirection {
    /// The anchor issue is blocked by the other issue: row `(anchor, other)`
    BlockedBy,

    /// The anchor issue blocks the other issue: row `(other, anchor)`
    Blocking,
}

impl DependencyDirection {
    /// Returns the string representation used on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockedBy => "blocked-by",
            Self::Blocking => "blocking",
        }
    }
}

impl fmt::Display for DependencyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocked-by" | "blocked_by" | "blockedby" => Ok(Self::BlockedBy),
            "blocking" => Ok(Self::Blocking),
            other => Err(format!(
                "invalid dependency direction '{other}': expected blocked-by or blocking"
            )),
        }
    }
}

/// Fully hydrated view of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Repository the issue was dispatched to
    pub repository: Repository,

    /// Pull request opened for the dispatch
    pub pull_request: PullRequest,

    /// The pull request's own issue
    pub issue: Issue,
}

/// An entity an edge points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// An issue
    Issue(IssueId),
    /// A repository
    Repository(RepoId),
    /// A pull request
    PullRequest(PullRequestId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue(id) => write!(f, "issue {id}"),
            Self::Repository(id) => write!(f, "repository {id}"),
            Self::PullRequest(id) => write!(f, "pull request {id}"),
        }
    }
}

/// The part of an [`IssueView`] a relation fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewField {
    /// [`IssueView::blocked_by`]
    BlockedBy,
    /// [`IssueView::blocking`]
    Blocking,
    /// [`IssueView::children`]
    Children,
    /// [`IssueView::parents`]
    Parents,
    /// [`IssueView::dispatch`]
    Dispatch,
}

impl fmt::Display for ViewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BlockedBy => "blocked by",
            Self::Blocking => "blocking",
            Self::Children => "children",
            Self::Parents => "parents",
            Self::Dispatch => "dispatch",
        };
        f.write_str(name)
    }
}

/// A relation left out of a view because its edge no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRelation {
    /// Field left empty
    pub field: ViewField,

    /// The edge row
    pub edge: EdgeId,

    /// What could not be resolved
    pub missing: EntityRef,
}

/// An issue together with every relation skein tracks for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueView {
    /// The issue itself
    pub issue: Issue,

    /// Issues this issue is blocked by
    pub blocked_by: Vec<Issue>,

    /// Issues this issue blocks
    pub blocking: Vec<Issue>,

    /// Group-reaction children
    pub children: Vec<Issue>,

    /// Group-reaction parents
    pub parents: Vec<Issue>,

    /// Dispatch record, if the issue has been dispatched
    pub dispatch: Option<Dispatch>,

    /// Relations that could not be resolved; their fields are left empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedRelation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_aliases() {
        assert_eq!(
            "blockedBy".parse::<DependencyDirection>().unwrap(),
            DependencyDirection::BlockedBy
        );
        assert_eq!(
            "blocked_by".parse::<DependencyDirection>().unwrap(),
            DependencyDirection::BlockedBy
        );
        assert_eq!(
            "Blocking".parse::<DependencyDirection>().unwrap(),
            DependencyDirection::Blocking
        );
        assert!("parent".parse::<DependencyDirection>().is_err());
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&IssueId::new(42)).unwrap();
        assert_eq!(json, "42");

        let back: RepoId = serde_json::from_str("7").unwrap();
        assert_eq!(back, RepoId::new(7));
    }

    #[test]
    fn repository_full_name() {
        let repo = Repository {
            id: RepoId::new(1),
            owner: "octo".to_string(),
            name: "widgets".to_string(),
            default_branch: "main".to_string(),
        };
        assert_eq!(repo.full_name(), "octo/widgets");
    }
}
