//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `init`: Initialize a new skein repository
//! - `repo`, `branch`, `issue`, `collaborator`: Manage the local host
//! - `dep`: Blocking dependencies between issues
//! - `reaction`: Group reactions (parent/child)
//! - `dispatch`: Forward an issue to a branch and pull request
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//! - `--as <USER>`: Act as another user id than the configured one
//!
//! # Example
//!
//! ```bash
//! skein repo add octo/widgets
//! skein issue add octo/widgets "Parser rejects empty input"
//! skein dep add octo/widgets#2 octo/widgets#1
//! skein --as 7 dispatch create octo/widgets#1 octo/fixes --base release
//! ```

mod args;
mod execute;
pub mod types;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};
use skein::domain::UserId;

pub use args::{
    BranchAction, BranchArgs, CollaboratorAction, CollaboratorArgs, DepAction, DepArgs,
    DispatchAction, DispatchArgs, InitArgs, IssueAction, IssueArgs, ReactionAction, ReactionArgs,
    RepoAction, RepoArgs,
};

/// Skein - issue dependencies, group reactions and dispatch
#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Act as this user id instead of the configured actor
    #[arg(long = "as", global = true, value_name = "USER", value_parser = validators::validate_user_id)]
    pub as_user: Option<i64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new skein repository
    ///
    /// Creates the `.skein/` directory with configuration and an empty
    /// database. Run this once in your project root.
    Init(InitArgs),

    /// Manage repositories on the local host
    Repo(RepoArgs),

    /// Manage branches
    Branch(BranchArgs),

    /// Open, show and delete issues
    Issue(IssueArgs),

    /// Grant users access to a repository
    Collaborator(CollaboratorArgs),

    /// Manage blocking dependencies
    ///
    /// A dependency says one issue is blocked by another issue of the same
    /// repository.
    Dep(DepArgs),

    /// Manage group reactions
    ///
    /// A group reaction makes one issue a child of another issue of the same
    /// repository.
    Reaction(ReactionArgs),

    /// Dispatch an issue to a pull request
    ///
    /// Creates a branch named after the issue in the target repository, opens
    /// a pull request from it and records the link.
    Dispatch(DispatchArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let command = match &self.command {
            Some(Commands::Init(args)) => return execute::execute_init(args, output_mode).await,
            Some(command) => command,
            None => {
                println!("Skein issue relationships");
                println!("Use --help for more information");
                return Ok(());
            }
        };

        let app = App::from_directory(&std::env::current_dir()?)
            .await?
            .acting_as(self.as_user.map(UserId::new));

        match command {
            Commands::Init(_) => Ok(()),
            Commands::Repo(args) => execute::execute_repo(&app, args, output_mode),
            Commands::Branch(args) => execute::execute_branch(&app, args, output_mode).await,
            Commands::Issue(args) => execute::execute_issue(&app, args, output_mode).await,
            Commands::Collaborator(args) => {
                execute::execute_collaborator(&app, args, output_mode)
            }
            Commands::Dep(args) => execute::execute_dep(&app, args, output_mode).await,
            Commands::Reaction(args) => execute::execute_reaction(&app, args, output_mode).await,
            Commands::Dispatch(args) => execute::execute_dispatch(&app, args, output_mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::DirectionArg;

    // ========== CLI Parsing Tests ==========

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["skein"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
        assert!(cli.as_user.is_none());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["skein", "repo", "list", "--json", "--as", "7"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.as_user, Some(7));
        assert!(matches!(
            cli.command,
            Some(Commands::Repo(RepoArgs {
                action: RepoAction::List
            }))
        ));
    }

    #[test]
    fn test_parse_init_defaults() {
        let cli = Cli::try_parse_from(["skein", "init"]).unwrap();
        match cli.command {
            Some(Commands::Init(args)) => {
                assert!(args.actor.is_none());
                assert_eq!(args.cycle_policy, types::CyclePolicyArg::Direct);
                assert!(!args.quiet);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_parse_dep_remove_direction() {
        let cli = Cli::try_parse_from([
            "skein",
            "dep",
            "remove",
            "octo/widgets#1",
            "octo/widgets#2",
            "--direction",
            "blocking",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Dep(DepArgs {
                action:
                    DepAction::Remove {
                        issue,
                        other,
                        direction,
                    },
            })) => {
                assert_eq!(issue.index, 1);
                assert_eq!(other.index, 2);
                assert_eq!(direction, DirectionArg::Blocking);
            }
            _ => panic!("Expected dep remove"),
        }
    }

    #[test]
    fn test_parse_dispatch_create() {
        let cli = Cli::try_parse_from([
            "skein",
            "dispatch",
            "create",
            "octo/widgets#4",
            "octo/fixes",
            "--base",
            "release",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Dispatch(DispatchArgs {
                action: DispatchAction::Create { issue, target, base },
            })) => {
                assert_eq!(issue.to_string(), "octo/widgets#4");
                assert_eq!(target.to_string(), "octo/fixes");
                assert_eq!(base.as_deref(), Some("release"));
            }
            _ => panic!("Expected dispatch create"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_issue_reference() {
        assert!(Cli::try_parse_from(["skein", "issue", "show", "widgets#1"]).is_err());
        assert!(Cli::try_parse_from(["skein", "issue", "show", "octo/widgets"]).is_err());
    }

    #[test]
    fn test_parse_rejects_non_positive_actor() {
        assert!(Cli::try_parse_from(["skein", "--as", "0", "repo", "list"]).is_err());
    }
}
