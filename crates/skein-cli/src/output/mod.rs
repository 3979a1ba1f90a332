//! Output formatting for CLI commands.
//!
//! Every command prints either human-readable text or pretty JSON, selected
//! by the global `--json` flag. JSON output is the serde form of the domain
//! types so scripts see the same field names the library uses.

pub mod color;

use serde::Serialize;
use skein::domain::{Dispatch, Issue, IssueView};
use std::env;
use std::io::{self, Write};

use crate::host::BranchInfo;

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text output
    Text,
    /// JSON output for programmatic use
    Json,
}

/// Output configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether to use colors in output
    pub use_colors: bool,
}

impl OutputConfig {
    /// Build configuration from environment variables.
    ///
    /// Colors are on unless `NO_COLOR` is set or `SKEIN_COLOR` is `0`/`false`.
    pub fn from_env() -> Self {
        // Respect NO_COLOR standard (https://no-color.org/)
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("SKEIN_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);

        Self { use_colors }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { use_colors: true }
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

/// Print an issue with all of its relations.
pub fn print_issue_view(view: &IssueView, repo_name: &str, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(view),
        OutputMode::Text => {
            let stdout = io::stdout();
            write_issue_view(&mut stdout.lock(), view, repo_name, &OutputConfig::from_env())
        }
    }
}

/// Print a titled list of issues.
pub fn print_issues(heading: &str, issues: &[Issue], mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(&issues),
        OutputMode::Text => {
            let stdout = io::stdout();
            write_issue_section(&mut stdout.lock(), heading, issues, &OutputConfig::from_env())
        }
    }
}

/// Print the branches of a repository.
pub fn print_branches(branches: &[BranchInfo], default_branch: &str, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(&branches),
        OutputMode::Text => {
            let stdout = io::stdout();
            write_branches(&mut stdout.lock(), branches, default_branch, &OutputConfig::from_env())
        }
    }
}

// ============================================================================
// Text Formatting
// ============================================================================

/// `#12 Title`, with a marker for pull requests.
pub fn issue_label(issue: &Issue, config: &OutputConfig) -> String {
    let number = color::info(&format!("#{}", issue.index), config);
    if issue.is_pull {
        format!("{number} {} {}", issue.title, color::muted("(pull request)", config))
    } else {
        format!("{number} {}", issue.title)
    }
}

fn write_issue_section<W: Write>(
    w: &mut W,
    heading: &str,
    issues: &[Issue],
    config: &OutputConfig,
) -> io::Result<()> {
    if issues.is_empty() {
        return writeln!(w, "{}: {}", color::bold(heading, config), color::muted("none", config));
    }
    writeln!(w, "{}:", color::bold(heading, config))?;
    for issue in issues {
        writeln!(w, "  {}", issue_label(issue, config))?;
    }
    Ok(())
}

fn write_dispatch<W: Write>(w: &mut W, dispatch: &Dispatch, config: &OutputConfig) -> io::Result<()> {
    let target = format!(
        "{}#{}",
        dispatch.repository.full_name(),
        dispatch.pull_request.index
    );
    writeln!(
        w,
        "{}: {} {} -> {}",
        color::bold("Dispatched", config),
        color::info(&target, config),
        dispatch.pull_request.head,
        dispatch.pull_request.base
    )
}

pub(crate) fn write_issue_view<W: Write>(
    w: &mut W,
    view: &IssueView,
    repo_name: &str,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {}",
        issue_label(&view.issue, config),
        color::muted(&format!("({repo_name})"), config)
    )?;
    writeln!(w)?;
    write_issue_section(w, "Blocked by", &view.blocked_by, config)?;
    write_issue_section(w, "Blocking", &view.blocking, config)?;
    write_issue_section(w, "Children", &view.children, config)?;
    write_issue_section(w, "Parents", &view.parents, config)?;
    if let Some(dispatch) = &view.dispatch {
        write_dispatch(w, dispatch, config)?;
    }
    for unresolved in &view.unresolved {
        let note = format!(
            "{}: edge {} references missing {}",
            unresolved.field, unresolved.edge, unresolved.missing
        );
        writeln!(w, "{}", color::warning(&note, config))?;
    }
    Ok(())
}

fn write_branches<W: Write>(
    w: &mut W,
    branches: &[BranchInfo],
    default_branch: &str,
    config: &OutputConfig,
) -> io::Result<()> {
    for info in branches {
        let marker = if info.branch.name == default_branch { "*" } else { " " };
        let commit: String = info.branch.commit_id.chars().take(7).collect();
        let protected = if info.protected {
            format!(" {}", color::warning("[protected]", config))
        } else {
            String::new()
        };
        writeln!(
            w,
            "{marker} {} {}{protected}",
            info.branch.name,
            color::muted(&commit, config)
        )?;
    }
    Ok(())
}
