//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time, providing immediate feedback for invalid values.

use super::types::{IssueRef, RepoRef};

/// Maximum issue title length accepted on the command line
pub const MAX_TITLE_LENGTH: usize = 255;

/// Parse `owner/name`.
pub fn parse_repo_ref(s: &str) -> Result<RepoRef, String> {
    s.trim().parse()
}

/// Parse `owner/name#index`.
pub fn parse_issue_ref(s: &str) -> Result<IssueRef, String> {
    s.trim().parse()
}

/// Validate an issue title: non-empty after trimming and not too long.
pub fn validate_title(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("Title cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(format!("Title cannot exceed {MAX_TITLE_LENGTH} characters"));
    }
    Ok(trimmed.to_string())
}

/// Validate a user id: a positive integer.
pub fn validate_user_id(s: &str) -> Result<i64, String> {
    s.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| format!("Invalid user id '{s}': expected a positive number"))
}
