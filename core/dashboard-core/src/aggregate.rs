//! Derived per-project state.
//!
//! A [`ProjectState`] is rebuilt from scratch out of the project's session
//! records whenever a refresh runs; it is never patched incrementally. The
//! cached copy in `projects/<slug>.json` is last-write-wins and can be deleted
//! at any time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{load_config, ProjectRegistration};
use crate::error::{Result, StoreError};
use crate::persist;
use crate::store::SessionStore;
use crate::types::{ProjectState, RoadmapSummary, Session, SessionStatus, TaskSummary};
use crate::validation::{validate_project_slug, MAX_NEXT_STEPS};

const RECENT_COMMIT_SESSIONS: usize = 10;
const MAX_RECENT_COMMITS: usize = 10;

/// Builds the aggregate for `project_slug` from its sessions.
///
/// `sessions` may be in any order and may include other projects' sessions;
/// those are ignored.
pub fn build_project_state(
    project_slug: &str,
    registration: Option<&ProjectRegistration>,
    sessions: &[Session],
    now: DateTime<Utc>,
) -> ProjectState {
    let mut sessions: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.project_slug == project_slug)
        .collect();
    // Newest first.
    sessions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.session_id.cmp(&a.session_id))
    });

    let mut state = ProjectState::empty(project_slug, now);
    if let Some(reg) = registration {
        state.name = reg.name.clone();
        state.path = reg.path.clone();
    }

    let mut task_summary = TaskSummary::default();
    for session in &sessions {
        match session.status {
            SessionStatus::Active => state.active_sessions += 1,
            SessionStatus::Parked => state.parked_sessions += 1,
            SessionStatus::Completed => state.completed_sessions += 1,
        }
        if session.is_open() {
            task_summary.merge(&session.task_summary());
        }
    }
    state.total_sessions = sessions.len() as u32;
    state.task_summary = task_summary;

    state.recent_commits = sessions
        .iter()
        .take(RECENT_COMMIT_SESSIONS)
        .flat_map(|s| s.commits.iter().cloned())
        .take(MAX_RECENT_COMMITS)
        .collect();

    state.open_questions = distinct(
        sessions
            .iter()
            .filter(|s| s.is_open())
            .flat_map(|s| s.open_questions.iter()),
    );

    state.last_activity = sessions.first().map(|s| s.last_heartbeat);
    state.roadmap_summary = roadmap_summary(&sessions);
    state.current_phase = current_phase(&sessions);
    state
}

fn roadmap_summary(sessions: &[&Session]) -> RoadmapSummary {
    let in_progress = distinct(
        sessions
            .iter()
            .filter(|s| s.is_open())
            .filter_map(|s| s.roadmap_ref.as_ref()),
    );
    let completed = distinct(
        sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .filter_map(|s| s.roadmap_ref.as_ref())
            .filter(|r| !in_progress.contains(*r)),
    );
    let next_up = sessions
        .iter()
        .find(|s| s.status != SessionStatus::Active && !s.next_steps.is_empty())
        .map(|s| s.next_steps.iter().take(MAX_NEXT_STEPS).cloned().collect())
        .unwrap_or_default();

    RoadmapSummary {
        completed,
        in_progress,
        next_up,
    }
}

/// Ref of the most recently started open session, else of the most recent
/// session that has one.
fn current_phase(sessions: &[&Session]) -> String {
    sessions
        .iter()
        .filter(|s| s.is_open())
        .find_map(|s| s.roadmap_ref.clone())
        .or_else(|| sessions.iter().find_map(|s| s.roadmap_ref.clone()))
        .unwrap_or_default()
}

/// First occurrence wins; order is preserved.
fn distinct<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen: HashSet<&'a String> = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .cloned()
        .collect()
}

impl SessionStore {
    /// Recomputes and stores the aggregate for one project.
    ///
    /// Runs without any lock; concurrent refreshes of the same project are
    /// last-write-wins.
    pub fn refresh_project(&self, project_slug: &str) -> Result<ProjectState> {
        validate_project_slug(project_slug)?;

        let registration = match load_config(self.storage()) {
            Ok(config) => config.projects.get(project_slug).cloned(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read project registry");
                None
            }
        };

        let sessions = self.scan_sessions();
        let state = build_project_state(project_slug, registration.as_ref(), &sessions, Utc::now());

        self.storage().ensure_dirs()?;
        persist::save_json(&self.storage().project_state_file(project_slug), &state)?;
        tracing::debug!(
            project = %project_slug,
            total = state.total_sessions,
            "Refreshed project state"
        );
        Ok(state)
    }

    /// The cached aggregate, if one has been written.
    pub fn project_state(&self, project_slug: &str) -> Result<Option<ProjectState>> {
        validate_project_slug(project_slug)?;
        let path = self.storage().project_state_file(project_slug);
        let Some(mut value) = persist::load_json(&path)? else {
            return Ok(None);
        };
        normalize_legacy_timestamps(&mut value);
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path,
                details: e.to_string(),
            })
    }

    /// One state per registered project. Missing or unreadable caches become
    /// an empty state carrying the registration's name and path.
    pub fn all_project_states(&self) -> Result<Vec<ProjectState>> {
        let config = load_config(self.storage())?;
        let now = Utc::now();

        let states = config
            .projects
            .iter()
            .map(|(slug, reg)| {
                let cached = self.project_state(slug).unwrap_or_else(|e| {
                    tracing::warn!(project = %slug, error = %e, "Ignoring unreadable project state");
                    None
                });
                cached.unwrap_or_else(|| build_project_state(slug, Some(reg), &[], now))
            })
            .collect();
        Ok(states)
    }
}

/// Older caches store "not yet" timestamps as empty strings.
///
/// An empty `last_activity` means no activity; an empty `updated_at` is
/// read as the epoch so the cache looks as old as it is unknown.
fn normalize_legacy_timestamps(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if obj.get("last_activity").and_then(Value::as_str) == Some("") {
        obj.insert("last_activity".to_string(), Value::Null);
    }
    if obj.get("updated_at").and_then(Value::as_str) == Some("") {
        obj.insert(
            "updated_at".to_string(),
            Value::String(DateTime::<Utc>::UNIX_EPOCH.to_rfc3339()),
        );
    }
}
