//! CLI value types and domain type conversions.
//!
//! Repositories are named `owner/name` on the command line and issues
//! `owner/name#index`, the way a forge prints them.

use clap::ValueEnum;
use skein::domain::DependencyDirection;
use skein::graph::CyclePolicy;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// References
// ============================================================================

/// A repository named by `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    /// Owner login
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid repository '{s}': expected owner/name");

        let (owner, name) = s.split_once('/').ok_or_else(invalid)?;
        let segment_ok = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !segment_ok(owner) || !segment_ok(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// An issue named by `owner/name#index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueRef {
    /// Repository holding the issue
    pub repo: RepoRef,
    /// Repository-relative number
    pub index: i64,
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.index)
    }
}

impl FromStr for IssueRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (repo, index) = s
            .rsplit_once('#')
            .ok_or_else(|| format!("invalid issue '{s}': expected owner/name#index"))?;
        let index = index
            .parse::<i64>()
            .ok()
            .filter(|i| *i > 0)
            .ok_or_else(|| format!("invalid issue '{s}': index must be a positive number"))?;

        Ok(Self {
            repo: repo.parse()?,
            index,
        })
    }
}

// ============================================================================
// Value Enums
// ============================================================================

/// Cycle detection policy for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicyArg {
    /// Refuse only the exact reverse edge
    Direct,
    /// Refuse any edge that closes a cycle
    Transitive,
}

impl From<CyclePolicyArg> for CyclePolicy {
    fn from(arg: CyclePolicyArg) -> Self {
        match arg {
            CyclePolicyArg::Direct => CyclePolicy::Direct,
            CyclePolicyArg::Transitive => CyclePolicy::Transitive,
        }
    }
}

/// Which dependency row a removal targets
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    /// The issue is blocked by the other issue
    #[value(name = "blocked-by", alias = "blocked_by")]
    BlockedBy,
    /// The issue blocks the other issue
    Blocking,
}

impl From<DirectionArg> for DependencyDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::BlockedBy => DependencyDirection::BlockedBy,
            DirectionArg::Blocking => DependencyDirection::Blocking,
        }
    }
}
