//! Input validation shared by every store entry point.
//!
//! All validators run before a lock is taken, so a rejected change never
//! leaves a session partially updated. String validators return the trimmed
//! value that should be stored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, StoreError};
use crate::types::Commit;

// ═══════════════════════════════════════════════════════════════════════════════
// Length Limits
// ═══════════════════════════════════════════════════════════════════════════════

pub const MAX_INTENT: usize = 500;
pub const MAX_OUTCOME: usize = 1000;
pub const MAX_MESSAGE: usize = 2000;
pub const MAX_REASON: usize = 500;
pub const MAX_DECISION: usize = 500;
pub const MAX_QUESTION: usize = 500;
pub const MAX_TASK_SUBJECT: usize = 300;
pub const MAX_ACTIVITY: usize = 300;
pub const MAX_ROADMAP_REF: usize = 100;
pub const MAX_PROJECT_NAME: usize = 100;
pub const MAX_GIT_BRANCH: usize = 200;
pub const MAX_COMMITS: usize = 500;
pub const MAX_NEXT_STEPS: usize = 3;

/// Upper bound for staleness thresholds (one year).
pub const MAX_THRESHOLD_HOURS: u32 = 8760;

// ═══════════════════════════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════════════════════════

static RE_PROJECT_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*$").unwrap());
static RE_SHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{4,40}$").unwrap());
static RE_GIT_BRANCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._/\-]*$").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Validators
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-empty after trimming and at most `max_len` characters.
pub fn validate_text(value: &str, field: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(field, "cannot be empty"));
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(StoreError::validation(
            field,
            format!("too long ({} chars, max {})", len, max_len),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_optional_text(
    value: Option<&str>,
    field: &str,
    max_len: usize,
) -> Result<Option<String>> {
    value.map(|v| validate_text(v, field, max_len)).transpose()
}

pub fn validate_text_list(values: &[String], field: &str, max_len: usize) -> Result<Vec<String>> {
    values
        .iter()
        .map(|v| validate_text(v, field, max_len))
        .collect()
}

pub fn validate_project_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(StoreError::validation("project slug", "cannot be empty"));
    }
    if !RE_PROJECT_SLUG.is_match(slug) {
        return Err(StoreError::validation(
            "project slug",
            format!(
                "'{}' must be lowercase alphanumeric with hyphens, starting with alphanumeric",
                slug
            ),
        ));
    }
    Ok(())
}

pub fn validate_sha(sha: &str) -> Result<()> {
    if !RE_SHA.is_match(sha) {
        return Err(StoreError::validation(
            "commit sha",
            format!("'{}' must be 4-40 hex characters", sha),
        ));
    }
    Ok(())
}

pub fn validate_git_branch(branch: &str) -> Result<()> {
    if branch.is_empty() {
        return Err(StoreError::validation("git branch", "cannot be empty"));
    }
    if branch.chars().count() > MAX_GIT_BRANCH {
        return Err(StoreError::validation(
            "git branch",
            format!("too long (max {})", MAX_GIT_BRANCH),
        ));
    }
    if !RE_GIT_BRANCH.is_match(branch) {
        return Err(StoreError::validation(
            "git branch",
            format!(
                "'{}' must start with alphanumeric and contain only [a-zA-Z0-9._/-]",
                branch
            ),
        ));
    }
    Ok(())
}

pub fn validate_session_id(session_id: &str) -> Result<()> {
    if !crate::ids::is_valid_session_id(session_id) {
        return Err(StoreError::validation(
            "session id",
            format!("'{}' is not a session identifier", session_id),
        ));
    }
    Ok(())
}

pub fn validate_commits(commits: &[Commit]) -> Result<Vec<Commit>> {
    if commits.len() > MAX_COMMITS {
        return Err(StoreError::validation(
            "commits",
            format!("too many ({}, max {})", commits.len(), MAX_COMMITS),
        ));
    }
    commits
        .iter()
        .map(|c| {
            validate_sha(&c.sha)?;
            Ok(Commit {
                sha: c.sha.clone(),
                message: validate_text(&c.message, "commit message", MAX_MESSAGE)?,
            })
        })
        .collect()
}

/// Greater than zero and at most `max`.
pub fn validate_positive(value: u32, field: &str, max: u32) -> Result<u32> {
    if value == 0 {
        return Err(StoreError::validation(field, "must be positive (got 0)"));
    }
    if value > max {
        return Err(StoreError::validation(
            field,
            format!("too large ({}, max {})", value, max),
        ));
    }
    Ok(value)
}

/// Keeps the first [`MAX_NEXT_STEPS`] entries.
pub fn truncate_next_steps(steps: Vec<String>) -> Vec<String> {
    steps.into_iter().take(MAX_NEXT_STEPS).collect()
}
