//! Command execution logic.
//!
//! This module contains the implementation of all CLI commands.

use anyhow::{Result, bail};
use skein::dispatch::{BranchEffect, DispatchError, DispatchRequest};
use skein::domain::{IssueView, Repository, UserId};

use super::args::{
    BranchAction, BranchArgs, CollaboratorAction, CollaboratorArgs, DepAction, DepArgs,
    DispatchAction, DispatchArgs, InitArgs, IssueAction, IssueArgs, ReactionAction, ReactionArgs,
    RepoAction, RepoArgs,
};
use crate::app::App;
use crate::output::{self, OutputConfig, OutputMode, color};

/// Execute the init command
pub async fn execute_init(args: &InitArgs, output_mode: OutputMode) -> Result<()> {
    use crate::config::{self, DEFAULT_ACTOR, SkeinConfig};

    let current_dir = std::env::current_dir()?;
    let actor = args.actor.map_or(DEFAULT_ACTOR, UserId::new);
    let result = config::init(&current_dir, SkeinConfig::new(actor, args.cycle_policy.into())).await?;

    match output_mode {
        OutputMode::Json => {
            output::print_json(&serde_json::json!({
                "skein_dir": result.skein_dir.display().to_string(),
                "config_file": result.config_file.display().to_string(),
                "database": result.database.display().to_string(),
                "actor": result.config.actor,
                "cycle_policy": result.config.cycle_policy,
            }))?;
        }
        OutputMode::Text if !args.quiet => {
            println!("Initialized skein in {}", result.skein_dir.display());
            println!("  Config:       {}", result.config_file.display());
            println!("  Database:     {}", result.database.display());
            println!("  Actor:        {}", result.config.actor);
            println!("  Cycle policy: {}", result.config.cycle_policy);
        }
        OutputMode::Text => {}
    }

    Ok(())
}

/// Refuse host administration by users who neither own nor collaborate on `repo`.
fn require_access(app: &App, repo: &Repository) -> Result<()> {
    if !app.host().is_authorized(repo.id, app.actor())? {
        bail!(
            "permission denied: user {} cannot manage {}",
            app.actor(),
            repo.full_name()
        );
    }
    Ok(())
}

/// Execute the repo command
pub fn execute_repo(app: &App, args: &RepoArgs, output_mode: OutputMode) -> Result<()> {
    let config = OutputConfig::from_env();

    match &args.action {
        RepoAction::Add {
            repo,
            default_branch,
        } => {
            let created =
                app.host()
                    .add_repository(app.actor(), &repo.owner, &repo.name, default_branch)?;
            match output_mode {
                OutputMode::Json => output::print_json(&created)?,
                OutputMode::Text => println!(
                    "{} {} (default branch {})",
                    color::success("Added repository", &config),
                    color::info(&created.full_name(), &config),
                    created.default_branch
                ),
            }
        }
        RepoAction::List => {
            let repos = app.host().repositories()?;
            match output_mode {
                OutputMode::Json => output::print_json(&repos)?,
                OutputMode::Text if repos.is_empty() => println!("No repositories"),
                OutputMode::Text => {
                    for repo in &repos {
                        println!(
                            "{} {}",
                            color::info(&repo.full_name(), &config),
                            repo.default_branch
                        );
                    }
                }
            }
        }
        RepoAction::Delete { repo } => {
            let repository = app.repository(repo)?;
            require_access(app, &repository)?;
            let report = app.delete_repository(&repository)?;
            match output_mode {
                OutputMode::Json => output::print_json(&report)?,
                OutputMode::Text => println!(
                    "{} {} ({} relations purged)",
                    color::success("Deleted repository", &config),
                    repository.full_name(),
                    report.total()
                ),
            }
        }
    }

    Ok(())
}

/// Execute the branch command
pub async fn execute_branch(app: &App, args: &BranchArgs, output_mode: OutputMode) -> Result<()> {
    let config = OutputConfig::from_env();

    match &args.action {
        BranchAction::List { repo } => {
            let repository = app.repository(repo)?;
            let branches = app.host().branches(repository.id)?;
            output::print_branches(&branches, &repository.default_branch, output_mode)?;
        }
        BranchAction::Create { repo, name, from } => {
            let repository = app.repository(repo)?;
            let base = from.as_deref().unwrap_or(&repository.default_branch);
            let branch = app
                .relations()
                .branches()
                .create_branch(app.actor(), repository.id, base, name)
                .await?;
            match output_mode {
                OutputMode::Json => output::print_json(&branch)?,
                OutputMode::Text => println!(
                    "{} {} from {}",
                    color::success("Created branch", &config),
                    branch.name,
                    base
                ),
            }
        }
        BranchAction::Delete { repo, name } => {
            let repository = app.repository(repo)?;
            app.relations()
                .branches()
                .delete_branch(app.actor(), repository.id, name)
                .await?;
            match output_mode {
                OutputMode::Json => {
                    output::print_json(&serde_json::json!({ "deleted": name }))?;
                }
                OutputMode::Text => {
                    println!("{} {}", color::success("Deleted branch", &config), name);
                }
            }
        }
        BranchAction::Protect { repo, name } => {
            let repository = app.repository(repo)?;
            require_access(app, &repository)?;
            if !app.host().protect_branch(repository.id, name)? {
                bail!("branch '{name}' not found in {}", repository.full_name());
            }
            match output_mode {
                OutputMode::Json => {
                    output::print_json(&serde_json::json!({ "protected": name }))?;
                }
                OutputMode::Text => {
                    println!("{} {}", color::success("Protected branch", &config), name);
                }
            }
        }
    }

    Ok(())
}

/// Execute the issue command
pub async fn execute_issue(app: &App, args: &IssueArgs, output_mode: OutputMode) -> Result<()> {
    let config = OutputConfig::from_env();

    match &args.action {
        IssueAction::Add { repo, title } => {
            let repository = app.repository(repo)?;
            let issue = app.host().add_issue(repository.id, title)?;
            match output_mode {
                OutputMode::Json => output::print_json(&issue)?,
                OutputMode::Text => println!(
                    "{} {}",
                    color::success("Opened", &config),
                    color::info(&format!("{}#{}", repository.full_name(), issue.index), &config)
                ),
            }
        }
        IssueAction::Show { issue } => {
            let found = app.issue(issue)?;
            let view = app.relations().issue_view(found.repo_id, found.index).await?;
            output::print_issue_view(&view, &issue.repo.to_string(), output_mode)?;
        }
        IssueAction::Delete { issue } => {
            let found = app.issue(issue)?;
            let report = app.delete_issue(&found)?;
            match output_mode {
                OutputMode::Json => output::print_json(&report)?,
                OutputMode::Text => println!(
                    "{} {} ({} relations purged)",
                    color::success("Deleted", &config),
                    issue,
                    report.total()
                ),
            }
        }
    }

    Ok(())
}

/// Execute the collaborator command
pub fn execute_collaborator(
    app: &App,
    args: &CollaboratorArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let config = OutputConfig::from_env();

    match &args.action {
        CollaboratorAction::Add { repo, user } => {
            let repository = app.repository(repo)?;
            require_access(app, &repository)?;
            let added = app.host().add_collaborator(repository.id, UserId::new(*user))?;
            match output_mode {
                OutputMode::Json => {
                    output::print_json(&serde_json::json!({ "user": user, "added": added }))?;
                }
                OutputMode::Text if added => println!(
                    "{} user {} to {}",
                    color::success("Added", &config),
                    user,
                    repository.full_name()
                ),
                OutputMode::Text => println!(
                    "User {} already collaborates on {}",
                    user,
                    repository.full_name()
                ),
            }
        }
    }

    Ok(())
}

fn print_view_or_confirm(
    view: &IssueView,
    message: &str,
    output_mode: OutputMode,
) -> std::io::Result<()> {
    match output_mode {
        OutputMode::Json => output::print_json(view),
        OutputMode::Text => {
            let config = OutputConfig::from_env();
            println!(
                "{} {}",
                color::success(message, &config),
                output::issue_label(&view.issue, &config)
            );
            Ok(())
        }
    }
}

/// Execute the dep command
pub async fn execute_dep(app: &App, args: &DepArgs, output_mode: OutputMode) -> Result<()> {
    let relations = app.relations();

    match &args.action {
        DepAction::Add { issue, depends_on } => {
            let anchor = app.issue(issue)?;
            let other = app.issue(depends_on)?;
            let view = relations
                .add_dependency(app.actor(), anchor.repo_id, anchor.index, other.id)
                .await?;
            print_view_or_confirm(&view, "Added dependency to", output_mode)?;
        }
        DepAction::Remove {
            issue,
            other,
            direction,
        } => {
            let anchor = app.issue(issue)?;
            let other = app.issue(other)?;
            let view = relations
                .remove_dependency(
                    app.actor(),
                    anchor.repo_id,
                    anchor.index,
                    other.id,
                    (*direction).into(),
                )
                .await?;
            print_view_or_confirm(&view, "Removed dependency from", output_mode)?;
        }
        DepAction::List { issue } => {
            let anchor = app.issue(issue)?;
            let blocked_by = relations.list_blocked_by(anchor.repo_id, anchor.index).await?;
            let blocking = relations.list_blocking(anchor.repo_id, anchor.index).await?;
            match output_mode {
                OutputMode::Json => output::print_json(&serde_json::json!({
                    "blocked_by": blocked_by,
                    "blocking": blocking,
                }))?,
                OutputMode::Text => {
                    output::print_issues("Blocked by", &blocked_by, output_mode)?;
                    output::print_issues("Blocking", &blocking, output_mode)?;
                }
            }
        }
    }

    Ok(())
}

/// Execute the reaction command
pub async fn execute_reaction(app: &App, args: &ReactionArgs, output_mode: OutputMode) -> Result<()> {
    let relations = app.relations();

    match &args.action {
        ReactionAction::Add { parent, child } => {
            let parent = app.issue(parent)?;
            let child = app.issue(child)?;
            let view = relations
                .add_reaction(app.actor(), parent.repo_id, parent.index, child.id)
                .await?;
            print_view_or_confirm(&view, "Added child to", output_mode)?;
        }
        ReactionAction::Remove { parent, child } => {
            let parent = app.issue(parent)?;
            let child = app.issue(child)?;
            let view = relations
                .remove_reaction(app.actor(), parent.repo_id, parent.index, child.id)
                .await?;
            print_view_or_confirm(&view, "Removed child from", output_mode)?;
        }
        ReactionAction::List { issue } => {
            let anchor = app.issue(issue)?;
            let children = relations.list_children(anchor.repo_id, anchor.index).await?;
            let parents = relations.list_parents(anchor.repo_id, anchor.index).await?;
            match output_mode {
                OutputMode::Json => output::print_json(&serde_json::json!({
                    "children": children,
                    "parents": parents,
                }))?,
                OutputMode::Text => {
                    output::print_issues("Children", &children, output_mode)?;
                    output::print_issues("Parents", &parents, output_mode)?;
                }
            }
        }
    }

    Ok(())
}

/// Describe what a failed dispatch left behind.
fn report_dispatch_failure(err: &DispatchError, output_mode: OutputMode) -> std::io::Result<()> {
    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "error": err.to_string(),
            "step": err.step,
            "compensation": err.compensation(),
            "effects": err.effects,
        })),
        OutputMode::Text => {
            let config = OutputConfig::from_env();
            if let Some(BranchEffect::Created(name)) = &err.effects.branch {
                eprintln!(
                    "{} branch '{}' was created and left in place",
                    color::warning("warning:", &config),
                    name
                );
            }
            if let Some(pull) = &err.effects.pull_request {
                eprintln!(
                    "{} pull request #{} was opened and left in place",
                    color::warning("warning:", &config),
                    pull.index
                );
            }
            Ok(())
        }
    }
}

/// Execute the dispatch command
pub async fn execute_dispatch(app: &App, args: &DispatchArgs, output_mode: OutputMode) -> Result<()> {
    let relations = app.relations();
    let config = OutputConfig::from_env();

    match &args.action {
        DispatchAction::Create {
            issue,
            target,
            base,
        } => {
            let source = app.issue(issue)?;
            let target = app.repository(target)?;
            let request = DispatchRequest {
                actor: app.actor(),
                source_repo: source.repo_id,
                issue_index: source.index,
                target_repo: target.id,
                base: base.clone().unwrap_or_default(),
            };

            let view = match relations.dispatch(&request).await {
                Ok(view) => view,
                Err(err) => {
                    report_dispatch_failure(&err, output_mode)?;
                    return Err(err.into());
                }
            };
            match output_mode {
                OutputMode::Json => output::print_json(&view)?,
                OutputMode::Text => {
                    if let Some(dispatch) = &view.dispatch {
                        println!(
                            "{} {} to {}#{} ({} -> {})",
                            color::success("Dispatched", &config),
                            issue,
                            dispatch.repository.full_name(),
                            dispatch.pull_request.index,
                            dispatch.pull_request.head,
                            dispatch.pull_request.base
                        );
                    }
                }
            }
        }
        DispatchAction::Show { issue } => {
            let source = app.issue(issue)?;
            let dispatch = relations.get_dispatch(source.repo_id, source.index).await?;
            match output_mode {
                OutputMode::Json => output::print_json(&dispatch)?,
                OutputMode::Text => {
                    println!(
                        "{} -> {}#{}",
                        color::info(&issue.to_string(), &config),
                        dispatch.repository.full_name(),
                        dispatch.pull_request.index
                    );
                    println!("  Branch:       {}", dispatch.pull_request.head);
                    println!("  Base:         {}", dispatch.pull_request.base);
                    println!("  Pull request: {}", dispatch.pull_request.title);
                }
            }
        }
        DispatchAction::Remove { issue } => {
            let source = app.issue(issue)?;
            // The raw edge, so that a dispatch whose pull request is gone can be removed.
            let edge = relations.dispatch_edge(source.repo_id, source.index).await?;
            let view = relations
                .remove_dispatch(
                    app.actor(),
                    source.repo_id,
                    source.index,
                    edge.target_issue_id,
                    edge.pull_request_id,
                )
                .await?;
            print_view_or_confirm(&view, "Removed dispatch of", output_mode)?;
        }
    }

    Ok(())
}
