//! Argument structures for CLI commands.

use clap::{Parser, Subcommand};

use super::types::{CyclePolicyArg, DirectionArg, IssueRef, RepoRef};
use super::validators::{parse_issue_ref, parse_repo_ref, validate_title, validate_user_id};

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// User id commands act as by default
    #[arg(long, value_parser = validate_user_id)]
    pub actor: Option<i64>,

    /// How far cycle detection looks when adding edges
    #[arg(long, value_enum, default_value = "direct")]
    pub cycle_policy: CyclePolicyArg,

    /// Suppress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `repo` command
#[derive(Parser, Debug, Clone)]
pub struct RepoArgs {
    /// Repository subcommand
    #[command(subcommand)]
    pub action: RepoAction,
}

/// Repository management actions
#[derive(Subcommand, Debug, Clone)]
pub enum RepoAction {
    /// Register a repository owned by the acting user
    Add {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,

        /// Name of the default branch
        #[arg(short = 'b', long, default_value = "main")]
        default_branch: String,
    },

    /// List repositories
    List,

    /// Delete a repository and purge every relation of its issues
    Delete {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,
    },
}

/// Arguments for the `branch` command
#[derive(Parser, Debug, Clone)]
pub struct BranchArgs {
    /// Branch subcommand
    #[command(subcommand)]
    pub action: BranchAction,
}

/// Branch management actions
#[derive(Subcommand, Debug, Clone)]
pub enum BranchAction {
    /// List branches of a repository
    List {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,
    },

    /// Create a branch
    Create {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,

        /// Name of the new branch
        name: String,

        /// Branch to start from (defaults to the repository's default branch)
        #[arg(long)]
        from: Option<String>,
    },

    /// Delete a branch
    Delete {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,

        /// Branch name
        name: String,
    },

    /// Protect a branch from deletion
    Protect {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,

        /// Branch name
        name: String,
    },
}

/// Arguments for the `issue` command
#[derive(Parser, Debug, Clone)]
pub struct IssueArgs {
    /// Issue subcommand
    #[command(subcommand)]
    pub action: IssueAction,
}

/// Issue actions
#[derive(Subcommand, Debug, Clone)]
pub enum IssueAction {
    /// Open an issue
    Add {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,

        /// Issue title
        #[arg(value_parser = validate_title)]
        title: String,
    },

    /// Show an issue with its dependencies, group reactions and dispatch
    Show {
        /// Issue as owner/name#index
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,
    },

    /// Delete an issue and purge every relation that touched it
    Delete {
        /// Issue as owner/name#index
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,
    },
}

/// Arguments for the `collaborator` command
#[derive(Parser, Debug, Clone)]
pub struct CollaboratorArgs {
    /// Collaborator subcommand
    #[command(subcommand)]
    pub action: CollaboratorAction,
}

/// Collaborator actions
#[derive(Subcommand, Debug, Clone)]
pub enum CollaboratorAction {
    /// Allow a user to create branches and manage dependencies
    Add {
        /// Repository as owner/name
        #[arg(value_parser = parse_repo_ref)]
        repo: RepoRef,

        /// User id
        #[arg(value_parser = validate_user_id)]
        user: i64,
    },
}

/// Arguments for the `dep` command
#[derive(Parser, Debug, Clone)]
pub struct DepArgs {
    /// Dependency subcommand
    #[command(subcommand)]
    pub action: DepAction,
}

/// Dependency management actions
#[derive(Subcommand, Debug, Clone)]
pub enum DepAction {
    /// Mark an issue as blocked by another
    Add {
        /// The blocked issue
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,

        /// The blocking issue
        #[arg(value_parser = parse_issue_ref)]
        depends_on: IssueRef,
    },

    /// Remove a dependency
    Remove {
        /// Issue the dependency is seen from
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,

        /// The other issue
        #[arg(value_parser = parse_issue_ref)]
        other: IssueRef,

        /// Whether ISSUE is blocked by OTHER or blocks it
        #[arg(short, long, value_enum, default_value = "blocked-by")]
        direction: DirectionArg,
    },

    /// List what an issue blocks and is blocked by
    List {
        /// Issue as owner/name#index
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,
    },
}

/// Arguments for the `reaction` command
#[derive(Parser, Debug, Clone)]
pub struct ReactionArgs {
    /// Group reaction subcommand
    #[command(subcommand)]
    pub action: ReactionAction,
}

/// Group reaction actions
#[derive(Subcommand, Debug, Clone)]
pub enum ReactionAction {
    /// Make one issue a child of another
    Add {
        /// Parent issue
        #[arg(value_parser = parse_issue_ref)]
        parent: IssueRef,

        /// Child issue
        #[arg(value_parser = parse_issue_ref)]
        child: IssueRef,
    },

    /// Detach a child from its parent
    Remove {
        /// Parent issue
        #[arg(value_parser = parse_issue_ref)]
        parent: IssueRef,

        /// Child issue
        #[arg(value_parser = parse_issue_ref)]
        child: IssueRef,
    },

    /// List the children and parents of an issue
    List {
        /// Issue as owner/name#index
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,
    },
}

/// Arguments for the `dispatch` command
#[derive(Parser, Debug, Clone)]
pub struct DispatchArgs {
    /// Dispatch subcommand
    #[command(subcommand)]
    pub action: DispatchAction,
}

/// Dispatch actions
#[derive(Subcommand, Debug, Clone)]
pub enum DispatchAction {
    /// Create a branch and pull request for an issue in a target repository
    Create {
        /// Issue to dispatch
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,

        /// Repository to open the pull request in
        #[arg(value_parser = parse_repo_ref)]
        target: RepoRef,

        /// Base branch (defaults to the target's default branch)
        #[arg(long)]
        base: Option<String>,
    },

    /// Show where an issue was dispatched
    Show {
        /// Issue as owner/name#index
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,
    },

    /// Forget a dispatch; the branch and pull request stay
    Remove {
        /// Issue as owner/name#index
        #[arg(value_parser = parse_issue_ref)]
        issue: IssueRef,
    },
}
