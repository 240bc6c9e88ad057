//! Serialized record types: sessions, tasks, and the derived project state.
//!
//! On-disk session format is schema v2. v1 records are upgraded by
//! [`crate::store`] before they are deserialized into these types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Schema version written into every session file.
pub const SCHEMA_VERSION: u32 = 2;

/// Sessions without a heartbeat for this long are closed by cleanup.
pub const DEFAULT_STALE_THRESHOLD_HOURS: u32 = 24;

// ═══════════════════════════════════════════════════════════════════════════════
// Statuses
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Parked,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Parked => "parked",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = TaskStatus::ALL.iter().map(|t| t.as_str()).collect();
                StoreError::validation(
                    "task status",
                    format!("'{}' is not one of: {}", s, allowed.join(", ")),
                )
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Records
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

impl Commit {
    /// Abbreviated SHA used for deduplication.
    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(7)
            .map_or(self.sha.len(), |(i, _)| i);
        &self.sha[..end]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    pub status: TaskStatus,
    #[serde(alias = "added_at")]
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub project_slug: String,
    pub status: SessionStatus,
    pub intent: String,
    #[serde(default)]
    pub roadmap_ref: Option<String>,
    #[serde(rename = "started_at", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub parked_reason: Option<String>,
    #[serde(default)]
    pub current_activity: Option<String>,
    /// Why the session is waiting on the user, if it is.
    #[serde(default)]
    pub awaiting_action: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default = "default_git_branch")]
    pub git_branch: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
}

pub(crate) fn default_git_branch() -> String {
    "main".to_string()
}

fn current_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Session {
    /// A fresh `active` session with empty collections.
    pub fn new_active(
        session_id: String,
        project_slug: String,
        intent: String,
        now: DateTime<Utc>,
    ) -> Self {
        Session {
            session_id,
            project_slug,
            status: SessionStatus::Active,
            intent,
            roadmap_ref: None,
            created_at: now,
            last_heartbeat: now,
            ended_at: None,
            outcome: None,
            parked_reason: None,
            current_activity: None,
            awaiting_action: None,
            events: Vec::new(),
            git_branch: default_git_branch(),
            files_changed: Vec::new(),
            commits: Vec::new(),
            decisions: Vec::new(),
            open_questions: Vec::new(),
            next_steps: Vec::new(),
            tasks: Vec::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Active or parked.
    pub fn is_open(&self) -> bool {
        self.status != SessionStatus::Completed
    }

    /// True if the last heartbeat is strictly older than `threshold` at `now`.
    pub fn is_stale_at(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_heartbeat) > threshold
    }

    /// Closes the session with `ended_at` and `last_heartbeat` pinned to one instant.
    pub(crate) fn close(&mut self, status: SessionStatus, at: DateTime<Utc>) {
        self.status = status;
        self.ended_at = Some(at);
        self.last_heartbeat = at;
    }

    /// True if another task (not `except_task_id`) already uses `subject`.
    pub fn has_task_subject(&self, subject: &str, except_task_id: Option<&str>) -> bool {
        self.tasks
            .iter()
            .filter(|t| Some(t.id.as_str()) != except_task_id)
            .any(|t| t.subject == subject)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_summary(&self) -> TaskSummary {
        TaskSummary::from_tasks(&self.tasks)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Derived Summaries
// ═══════════════════════════════════════════════════════════════════════════════

/// Task counts by status. `total` always equals the sum of the four buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    pub pending: u32,
    pub skipped: u32,
}

impl TaskSummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = TaskSummary::default();
        for task in tasks {
            summary.add(task.status);
        }
        summary
    }

    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
        self.total += 1;
    }

    pub fn merge(&mut self, other: &TaskSummary) {
        self.total += other.total;
        self.completed += other.completed;
        self.in_progress += other.in_progress;
        self.pending += other.pending;
        self.skipped += other.skipped;
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.completed + self.in_progress + self.pending + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadmapSummary {
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub in_progress: Vec<String>,
    /// At most three entries.
    #[serde(default)]
    pub next_up: Vec<String>,
}

/// Project-level cache, rebuilt from session records on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub current_phase: String,
    #[serde(default)]
    pub roadmap_summary: RoadmapSummary,
    #[serde(default)]
    pub active_sessions: u32,
    #[serde(default)]
    pub parked_sessions: u32,
    #[serde(default)]
    pub completed_sessions: u32,
    #[serde(default)]
    pub total_sessions: u32,
    /// Summed over the project's open sessions.
    #[serde(default)]
    pub task_summary: TaskSummary,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recent_commits: Vec<Commit>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectState {
    pub fn empty(project_slug: &str, now: DateTime<Utc>) -> Self {
        ProjectState {
            project_slug: project_slug.to_string(),
            name: String::new(),
            path: String::new(),
            current_phase: String::new(),
            roadmap_summary: RoadmapSummary::default(),
            active_sessions: 0,
            parked_sessions: 0,
            completed_sessions: 0,
            total_sessions: 0,
            task_summary: TaskSummary::default(),
            last_activity: None,
            recent_commits: Vec::new(),
            open_questions: Vec::new(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session(last_heartbeat: DateTime<Utc>) -> Session {
        let mut session = Session::new_active(
            "sess_20260101T000000_00000000000000aa".to_string(),
            "proj".to_string(),
            "Test".to_string(),
            last_heartbeat,
        );
        session.last_heartbeat = last_heartbeat;
        session
    }

    fn make_task(id: &str, subject: &str, status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            subject: subject.to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_serializes_as_snake_case_string() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Parked).unwrap(),
            "\"parked\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn test_task_status_from_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        let err = "done".parse::<TaskStatus>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("in_progress"));
    }

    #[test]
    fn test_session_round_trip_preserves_unset_optionals() {
        let session = make_session(Utc::now());
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert!(back.ended_at.is_none());
        assert!(back.roadmap_ref.is_none());
    }

    #[test]
    fn test_session_round_trip_preserves_populated_fields() {
        let now = Utc::now();
        let mut session = make_session(now);
        session.roadmap_ref = Some("phase-2".to_string());
        session.events.push(Event {
            timestamp: now,
            message: "started".to_string(),
        });
        session.commits.push(Commit {
            sha: "abc1234def".to_string(),
            message: "fix".to_string(),
        });
        session.tasks.push(make_task("t1", "A", TaskStatus::Skipped));
        session.close(SessionStatus::Completed, now);

        let json = serde_json::to_string_pretty(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_created_at_serializes_as_started_at() {
        let session = make_session(Utc::now());
        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("started_at").is_some());
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn test_task_accepts_legacy_added_at() {
        let json = r#"{"id":"t1","subject":"A","status":"pending",
            "added_at":"2026-01-01T00:00:00+00:00","updated_at":"2026-01-01T00:00:00+00:00"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_is_stale_boundary() {
        let now = Utc::now();
        let threshold = Duration::hours(24);
        // Exactly at threshold should NOT be stale (uses >)
        assert!(!make_session(now - threshold).is_stale_at(threshold, now));
        assert!(make_session(now - threshold - Duration::seconds(1)).is_stale_at(threshold, now));
        assert!(!make_session(now).is_stale_at(threshold, now));
    }

    #[test]
    fn test_close_pins_ended_at_to_heartbeat() {
        let mut session = make_session(Utc::now() - Duration::hours(3));
        let at = Utc::now();
        session.close(SessionStatus::Completed, at);
        assert_eq!(session.ended_at, Some(session.last_heartbeat));
        assert_eq!(session.last_heartbeat, at);
    }

    #[test]
    fn test_task_summary_counts_every_status() {
        let mut session = make_session(Utc::now());
        session.tasks = vec![
            make_task("t1", "A", TaskStatus::Pending),
            make_task("t2", "B", TaskStatus::InProgress),
            make_task("t3", "C", TaskStatus::Completed),
            make_task("t4", "D", TaskStatus::Skipped),
            make_task("t5", "E", TaskStatus::Completed),
        ];
        let summary = session.task_summary();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_has_task_subject_excludes_self() {
        let mut session = make_session(Utc::now());
        session.tasks = vec![
            make_task("t1", "A", TaskStatus::Pending),
            make_task("t2", "B", TaskStatus::Pending),
        ];
        assert!(session.has_task_subject("A", None));
        assert!(!session.has_task_subject("A", Some("t1")));
        assert!(session.has_task_subject("A", Some("t2")));
    }

    #[test]
    fn test_short_sha() {
        let commit = Commit {
            sha: "abcdef123456".to_string(),
            message: String::new(),
        };
        assert_eq!(commit.short_sha(), "abcdef1");
        let short = Commit {
            sha: "abcd".to_string(),
            message: String::new(),
        };
        assert_eq!(short.short_sha(), "abcd");
    }
}
