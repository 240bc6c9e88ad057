//! File-backed session store.
//!
//! One JSON file per session under `sessions/`, one lock file beside it.
//! This module is the only writer of session records.
//!
//! # Mutation Contract
//!
//! Every mutating operation follows the same cycle:
//!
//! 1. Validate inputs (no lock held, nothing touched)
//! 2. Acquire the session's [`RecordLock`]
//! 3. Re-read the record from disk
//! 4. Check preconditions, mutate, persist atomically
//! 5. Release the lock
//! 6. Refresh the project aggregate (failures are logged, never returned)
//!
//! Read-only lookups skip the lock: writes are atomic renames, so a reader
//! always sees a complete record.
//!
//! # Schema Upgrade
//!
//! Version-1 records are upgraded in memory on every load, before
//! deserialization. The upgraded form reaches disk with the next write.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use walkdir::WalkDir;

use crate::config::DashboardSettings;
use crate::error::{Result, StoreError};
use crate::ids;
use crate::lock::{RecordLock, DEFAULT_LOCK_TIMEOUT};
use crate::persist;
use crate::storage::StorageConfig;
use crate::types::{Commit, Event, Session, SessionStatus, Task, TaskStatus, SCHEMA_VERSION};
use crate::validation::{
    truncate_next_steps, validate_commits, validate_git_branch, validate_optional_text,
    validate_project_slug, validate_session_id, validate_sha, validate_text, validate_text_list,
    MAX_ACTIVITY, MAX_DECISION, MAX_INTENT, MAX_MESSAGE, MAX_OUTCOME, MAX_QUESTION, MAX_REASON,
    MAX_ROADMAP_REF, MAX_TASK_SUBJECT,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Inputs
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters for [`SessionStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub project_slug: String,
    pub intent: String,
    pub roadmap_ref: Option<String>,
    /// Defaults to `main`.
    pub git_branch: Option<String>,
}

impl NewSession {
    pub fn new(project_slug: impl Into<String>, intent: impl Into<String>) -> Self {
        NewSession {
            project_slug: project_slug.into(),
            intent: intent.into(),
            ..Default::default()
        }
    }
}

/// Fields for [`SessionStore::update`]. `None` leaves the field as it is.
///
/// `project_slug` and `status` are absent: the slug is fixed at
/// creation and status only changes through park/complete/resume/cleanup.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub intent: Option<String>,
    pub current_activity: Option<String>,
    pub roadmap_ref: Option<String>,
    pub outcome: Option<String>,
    pub parked_reason: Option<String>,
    pub git_branch: Option<String>,
    pub open_questions: Option<Vec<String>>,
    pub next_steps: Option<Vec<String>>,
    pub files_changed: Option<Vec<String>>,
}

/// Parameters for [`SessionStore::complete`]. List fields replace the
/// session's lists when present.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub outcome: String,
    pub next_steps: Option<Vec<String>>,
    pub commits: Option<Vec<Commit>>,
    pub files_changed: Option<Vec<String>>,
    pub decisions: Option<Vec<String>>,
}

impl Completion {
    pub fn new(outcome: impl Into<String>) -> Self {
        Completion {
            outcome: outcome.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub project_slug: Option<String>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    fn matches(&self, session: &Session) -> bool {
        self.project_slug
            .as_deref()
            .map_or(true, |slug| session.project_slug == slug)
            && self.status.map_or(true, |status| session.status == status)
    }
}

/// What a locked edit decided to do with the record it was handed.
enum Edit {
    /// Persist and refresh the project aggregate.
    Save,
    /// Leave the record untouched but still return it.
    Keep,
    /// Leave the record untouched and report "not found".
    Absent,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to the session records under one storage root.
///
/// Holds only paths and a timeout, so it is cheap to clone and safe to share
/// across threads. All coordination happens on disk.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: StorageConfig,
    lock_timeout: Duration,
}

impl SessionStore {
    pub fn new(storage: StorageConfig) -> Self {
        SessionStore {
            storage,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Uses the lock timeout from the dashboard settings.
    pub fn from_settings(storage: StorageConfig, settings: &DashboardSettings) -> Self {
        Self::new(storage).with_lock_timeout(Duration::from_millis(settings.lock_timeout_ms))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Runs `f` while holding the exclusive lock for `session_id`.
    ///
    /// Locks are not reentrant: calling a mutating store method for the same
    /// session from inside `f` waits on itself and fails with `LockBusy`.
    pub fn with_session_lock<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T> {
        validate_session_id(session_id)?;
        let dir = self.storage.sessions_dir();
        fs_err::create_dir_all(&dir)
            .map_err(|e| StoreError::io(format!("creating {}", dir.display()), e))?;

        let _lock = RecordLock::acquire(
            &self.storage.session_lock_file(session_id),
            self.lock_timeout,
        )?;
        f(self)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Record I/O
    // ─────────────────────────────────────────────────────────────────────────────

    /// Loads and upgrades one session record. Takes no lock.
    pub(crate) fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        load_session_file(&self.storage.session_file(session_id))
    }

    pub(crate) fn save_session(&self, session: &Session) -> Result<()> {
        persist::save_json(&self.storage.session_file(&session.session_id), session)
    }

    /// Locked read-modify-write of one session; refreshes the project on save.
    fn edit<F>(&self, session_id: &str, f: F) -> Result<Option<Session>>
    where
        F: FnOnce(&mut Session, DateTime<Utc>) -> Result<Edit>,
    {
        let edited = self.with_session_lock(session_id, |store| {
            let Some(mut session) = store.load_session(session_id)? else {
                return Ok(None);
            };
            match f(&mut session, Utc::now())? {
                Edit::Save => {
                    store.save_session(&session)?;
                    Ok(Some((session, true)))
                }
                Edit::Keep => Ok(Some((session, false))),
                Edit::Absent => Ok(None),
            }
        })?;

        Ok(edited.map(|(session, saved)| {
            if saved {
                self.refresh_after_mutation(&session.project_slug);
            }
            session
        }))
    }

    pub(crate) fn refresh_after_mutation(&self, project_slug: &str) {
        if let Err(e) = self.refresh_project(project_slug) {
            tracing::warn!(
                project = %project_slug,
                error = %e,
                "Project state refresh failed"
            );
        }
    }

    /// Picks an id whose file does not exist yet.
    fn fresh_session_id(&self, now: DateTime<Utc>) -> String {
        loop {
            let id = ids::new_session_id(now);
            if !self.storage.session_file(&id).exists() {
                return id;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Creation & Lookup
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn create(&self, params: NewSession) -> Result<Session> {
        validate_project_slug(&params.project_slug)?;
        let intent = validate_text(&params.intent, "intent", MAX_INTENT)?;
        let roadmap_ref =
            validate_optional_text(params.roadmap_ref.as_deref(), "roadmap ref", MAX_ROADMAP_REF)?;
        if let Some(branch) = params.git_branch.as_deref() {
            validate_git_branch(branch)?;
        }

        self.storage.ensure_dirs()?;
        let now = Utc::now();
        let mut session =
            Session::new_active(self.fresh_session_id(now), params.project_slug, intent, now);
        session.roadmap_ref = roadmap_ref;
        if let Some(branch) = params.git_branch {
            session.git_branch = branch;
        }

        // A brand-new id cannot be contended, so no lock is needed.
        self.save_session(&session)?;
        tracing::info!(
            session_id = %session.session_id,
            project = %session.project_slug,
            "Created session"
        );

        self.refresh_after_mutation(&session.project_slug);
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        validate_session_id(session_id)?;
        self.load_session(session_id)
    }

    /// All matching sessions, newest first. Unreadable records are skipped.
    pub fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        if let Some(slug) = filter.project_slug.as_deref() {
            validate_project_slug(slug)?;
        }

        let mut sessions: Vec<Session> = self
            .scan_sessions()
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        Ok(sessions)
    }

    pub fn active_sessions(&self, project_slug: Option<&str>) -> Result<Vec<Session>> {
        self.list(&SessionFilter {
            project_slug: project_slug.map(str::to_string),
            status: Some(SessionStatus::Active),
        })
    }

    pub fn parked_sessions(&self, project_slug: Option<&str>) -> Result<Vec<Session>> {
        self.list(&SessionFilter {
            project_slug: project_slug.map(str::to_string),
            status: Some(SessionStatus::Parked),
        })
    }

    /// Full-directory scan. Never fails: problems are logged per record.
    pub(crate) fn scan_sessions(&self) -> Vec<Session> {
        let dir = self.storage.sessions_dir();
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut sessions = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Failed to read sessions directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_session_record(path) {
                continue;
            }
            match load_session_file(path) {
                Ok(Some(session)) => sessions.push(session),
                // Deleted between listing and reading.
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session record");
                }
            }
        }
        sessions
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Field Updates
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn update(&self, session_id: &str, changes: SessionUpdate) -> Result<Option<Session>> {
        let intent = validate_optional_text(changes.intent.as_deref(), "intent", MAX_INTENT)?;
        let current_activity = validate_optional_text(
            changes.current_activity.as_deref(),
            "current activity",
            MAX_ACTIVITY,
        )?;
        let roadmap_ref = validate_optional_text(
            changes.roadmap_ref.as_deref(),
            "roadmap ref",
            MAX_ROADMAP_REF,
        )?;
        let outcome = validate_optional_text(changes.outcome.as_deref(), "outcome", MAX_OUTCOME)?;
        let parked_reason = validate_optional_text(
            changes.parked_reason.as_deref(),
            "parked reason",
            MAX_REASON,
        )?;
        if let Some(branch) = changes.git_branch.as_deref() {
            validate_git_branch(branch)?;
        }
        let open_questions = changes
            .open_questions
            .as_deref()
            .map(|q| validate_text_list(q, "open question", MAX_QUESTION))
            .transpose()?;
        let next_steps = changes
            .next_steps
            .as_deref()
            .map(|s| validate_text_list(s, "next step", MAX_MESSAGE).map(truncate_next_steps))
            .transpose()?;
        let files_changed = changes
            .files_changed
            .as_deref()
            .map(|f| validate_text_list(f, "changed file", MAX_MESSAGE))
            .transpose()?;
        let git_branch = changes.git_branch;

        self.edit(session_id, move |session, _now| {
            if let Some(v) = intent {
                session.intent = v;
            }
            if current_activity.is_some() {
                session.current_activity = current_activity;
            }
            if roadmap_ref.is_some() {
                session.roadmap_ref = roadmap_ref;
            }
            if outcome.is_some() {
                session.outcome = outcome;
            }
            if parked_reason.is_some() {
                session.parked_reason = parked_reason;
            }
            if let Some(v) = git_branch {
                session.git_branch = v;
            }
            if let Some(v) = open_questions {
                session.open_questions = v;
            }
            if let Some(v) = next_steps {
                session.next_steps = v;
            }
            if let Some(v) = files_changed {
                session.files_changed = v;
            }
            Ok(Edit::Save)
        })
    }

    pub fn add_event(&self, session_id: &str, message: &str) -> Result<Option<Session>> {
        let message = validate_text(message, "event message", MAX_MESSAGE)?;
        self.edit(session_id, |session, now| {
            session.events.push(Event {
                timestamp: now,
                message,
            });
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    /// Appends a commit unless one with the same 7-char prefix is recorded.
    pub fn add_commit(&self, session_id: &str, sha: &str, message: &str) -> Result<Option<Session>> {
        validate_sha(sha)?;
        let commit = Commit {
            sha: sha.to_string(),
            message: validate_text(message, "commit message", MAX_MESSAGE)?,
        };
        self.edit(session_id, |session, now| {
            let seen = session
                .commits
                .iter()
                .any(|c| c.short_sha() == commit.short_sha());
            if !seen {
                session.commits.push(commit);
            }
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    pub fn add_decision(&self, session_id: &str, decision: &str) -> Result<Option<Session>> {
        let decision = validate_text(decision, "decision", MAX_DECISION)?;
        self.edit(session_id, |session, now| {
            if !session.decisions.contains(&decision) {
                session.decisions.push(decision);
            }
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    pub fn add_open_question(&self, session_id: &str, question: &str) -> Result<Option<Session>> {
        let question = validate_text(question, "open question", MAX_QUESTION)?;
        self.edit(session_id, |session, now| {
            if !session.open_questions.contains(&question) {
                session.open_questions.push(question);
            }
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    /// Flags the session as waiting on the user.
    pub fn request_action(&self, session_id: &str, reason: &str) -> Result<Option<Session>> {
        let reason = validate_text(reason, "action reason", MAX_REASON)?;
        self.edit(session_id, |session, now| {
            session.awaiting_action = Some(reason);
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    pub fn clear_action(&self, session_id: &str) -> Result<Option<Session>> {
        self.edit(session_id, |session, now| {
            session.awaiting_action = None;
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn add_task(&self, session_id: &str, subject: &str) -> Result<Option<Session>> {
        self.add_tasks(session_id, &[subject.to_string()])
    }

    /// Appends a pending task per new subject. Subjects already present,
    /// or repeated within `subjects`, are skipped.
    pub fn add_tasks(&self, session_id: &str, subjects: &[String]) -> Result<Option<Session>> {
        let subjects = validate_text_list(subjects, "task subject", MAX_TASK_SUBJECT)?;
        self.edit(session_id, |session, now| {
            let mut added = 0usize;
            for subject in subjects {
                if session.has_task_subject(&subject, None) {
                    continue;
                }
                session.tasks.push(Task {
                    id: ids::new_task_id(),
                    subject,
                    status: TaskStatus::Pending,
                    created_at: now,
                    updated_at: now,
                });
                added += 1;
            }

            if added == 0 {
                return Ok(Edit::Keep);
            }
            tracing::debug!(session_id = %session.session_id, added, "Added tasks");
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    /// Sets a task's status and optionally renames it.
    ///
    /// `Ok(None)` if the session or the task does not exist. A rename onto a
    /// subject used by a different task is rejected and nothing changes.
    pub fn update_task(
        &self,
        session_id: &str,
        task_id: &str,
        status: &str,
        subject: Option<&str>,
    ) -> Result<Option<Session>> {
        let status: TaskStatus = status.parse()?;
        let subject = validate_optional_text(subject, "task subject", MAX_TASK_SUBJECT)?;

        self.edit(session_id, |session, now| {
            let Some(index) = session.tasks.iter().position(|t| t.id == task_id) else {
                return Ok(Edit::Absent);
            };
            if let Some(subject) = subject.as_deref() {
                if session.has_task_subject(subject, Some(task_id)) {
                    return Err(StoreError::validation(
                        "task subject",
                        format!(
                            "'{}' already exists in session {}",
                            subject, session.session_id
                        ),
                    ));
                }
            }

            let task = &mut session.tasks[index];
            task.status = status;
            task.updated_at = now;
            if let Some(subject) = subject {
                task.subject = subject;
            }
            session.last_heartbeat = now;
            Ok(Edit::Save)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Liveness
    // ─────────────────────────────────────────────────────────────────────────────

    /// Bumps `last_heartbeat` if the session is active.
    ///
    /// Returns the session as persisted after the call, whether or not it was
    /// active. A heartbeat on its own does not refresh the project aggregate.
    pub fn heartbeat(&self, session_id: &str) -> Result<Option<Session>> {
        self.with_session_lock(session_id, |store| {
            let session = store.load_session(session_id)?;
            match session {
                Some(mut session) if session.status == SessionStatus::Active => {
                    session.last_heartbeat = Utc::now();
                    store.save_session(&session)?;
                    Ok(Some(session))
                }
                other => Ok(other),
            }
        })
    }

    /// Heartbeats every active session of a project, then refreshes it once.
    pub fn heartbeat_project(&self, project_slug: &str) -> Result<Vec<Session>> {
        validate_project_slug(project_slug)?;

        let mut touched = Vec::new();
        for session in self.active_sessions(Some(project_slug))? {
            match self.heartbeat(&session.session_id) {
                Ok(Some(updated)) => touched.push(updated),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "Heartbeat failed"
                    );
                }
            }
        }

        if !touched.is_empty() {
            self.refresh_after_mutation(project_slug);
        }
        Ok(touched)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Status Transitions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Active or parked → parked. Next steps beyond three are dropped.
    pub fn park(
        &self,
        session_id: &str,
        reason: &str,
        next_steps: Option<Vec<String>>,
    ) -> Result<Option<Session>> {
        let reason = validate_text(reason, "parked reason", MAX_REASON)?;
        let next_steps = next_steps
            .as_deref()
            .map(|s| validate_text_list(s, "next step", MAX_MESSAGE).map(truncate_next_steps))
            .transpose()?;

        self.edit(session_id, |session, now| {
            if session.status == SessionStatus::Completed {
                return Err(StoreError::InvalidTransition {
                    session_id: session.session_id.clone(),
                    status: session.status,
                    action: "park",
                });
            }
            session.close(SessionStatus::Parked, now);
            session.parked_reason = Some(reason);
            if let Some(steps) = next_steps {
                session.next_steps = steps;
            }
            tracing::info!(session_id = %session.session_id, "Parked session");
            Ok(Edit::Save)
        })
    }

    /// Active or parked → completed.
    pub fn complete(&self, session_id: &str, completion: Completion) -> Result<Option<Session>> {
        let outcome = validate_text(&completion.outcome, "outcome", MAX_OUTCOME)?;
        let next_steps = completion
            .next_steps
            .as_deref()
            .map(|s| validate_text_list(s, "next step", MAX_MESSAGE).map(truncate_next_steps))
            .transpose()?;
        let commits = completion
            .commits
            .as_deref()
            .map(validate_commits)
            .transpose()?;
        let files_changed = completion
            .files_changed
            .as_deref()
            .map(|f| validate_text_list(f, "changed file", MAX_MESSAGE))
            .transpose()?;
        let decisions = completion
            .decisions
            .as_deref()
            .map(|d| validate_text_list(d, "decision", MAX_DECISION))
            .transpose()?;

        self.edit(session_id, |session, now| {
            if session.status == SessionStatus::Completed {
                return Err(StoreError::InvalidTransition {
                    session_id: session.session_id.clone(),
                    status: session.status,
                    action: "complete",
                });
            }
            session.close(SessionStatus::Completed, now);
            session.outcome = Some(outcome);
            if let Some(v) = next_steps {
                session.next_steps = v;
            }
            if let Some(v) = commits {
                session.commits = v;
            }
            if let Some(v) = files_changed {
                session.files_changed = v;
            }
            if let Some(v) = decisions {
                session.decisions = v;
            }
            tracing::info!(session_id = %session.session_id, "Completed session");
            Ok(Edit::Save)
        })
    }

    /// Hands a parked session over to a new active session.
    ///
    /// Only the parked session's lock is taken. The successor's id is freshly
    /// minted, so nothing else can contend for it. Because the status check and
    /// both writes happen inside that one lock, concurrent resumes of the same
    /// session yield exactly one successor; the rest fail with
    /// `InvalidTransition`.
    pub fn resume(&self, session_id: &str, new_intent: Option<&str>) -> Result<Option<Session>> {
        let new_intent = validate_optional_text(new_intent, "intent", MAX_INTENT)?;

        let successor = self.with_session_lock(session_id, |store| {
            let Some(mut old) = store.load_session(session_id)? else {
                return Ok(None);
            };
            if old.status != SessionStatus::Parked {
                return Err(StoreError::InvalidTransition {
                    session_id: old.session_id.clone(),
                    status: old.status,
                    action: "resume",
                });
            }

            let now = Utc::now();
            let intent = new_intent.unwrap_or_else(|| old.intent.clone());
            let mut successor = Session::new_active(
                store.fresh_session_id(now),
                old.project_slug.clone(),
                intent,
                now,
            );
            successor.roadmap_ref = old.roadmap_ref.clone();
            successor.git_branch = old.git_branch.clone();
            successor.open_questions = old.open_questions.clone();
            successor.next_steps = old.next_steps.clone();
            store.save_session(&successor)?;

            old.close(SessionStatus::Completed, now);
            old.outcome = Some(format!("Resumed as {}", successor.session_id));
            store.save_session(&old)?;

            tracing::info!(
                session_id = %old.session_id,
                successor = %successor.session_id,
                "Resumed session"
            );
            Ok(Some(successor))
        })?;

        if let Some(session) = &successor {
            self.refresh_after_mutation(&session.project_slug);
        }
        Ok(successor)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loading & Migration
// ═══════════════════════════════════════════════════════════════════════════════

/// `sess_*.json`; temp files and lock files are ignored.
pub(crate) fn is_session_record(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(ids::is_valid_session_id)
}

pub(crate) fn load_session_file(path: &Path) -> Result<Option<Session>> {
    let Some(mut value) = persist::load_json(path)? else {
        return Ok(None);
    };
    migrate_session_value(&mut value);
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
}

/// Upgrades a raw session record to the current schema in place.
///
/// Returns true if anything changed. Running it on an upgraded record is a
/// no-op.
pub fn migrate_session_value(value: &mut Value) -> bool {
    let Some(record) = value.as_object_mut() else {
        return false;
    };
    let mut changed = false;

    let version = record
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(1);

    if record.get("tasks").map_or(true, Value::is_null) {
        record.insert("tasks".to_string(), Value::Array(Vec::new()));
        changed = true;
    }

    let started = record
        .get("started_at")
        .or_else(|| record.get("created_at"))
        .filter(|v| !v.is_null())
        .cloned();

    if record.get("last_heartbeat").map_or(true, Value::is_null) {
        if let Some(started) = started.clone() {
            record.insert("last_heartbeat".to_string(), started);
            changed = true;
        }
    }

    if let Some(Value::Array(tasks)) = record.get_mut("tasks") {
        for task in tasks.iter_mut().filter_map(Value::as_object_mut) {
            let numeric_id = match task.get("id") {
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            if let Some(id) = numeric_id {
                task.insert("id".to_string(), Value::String(id));
                changed = true;
            }

            let has_created = task.contains_key("created_at") || task.contains_key("added_at");
            if !has_created {
                if let Some(ts) = task.get("updated_at").cloned().or_else(|| started.clone()) {
                    task.insert("created_at".to_string(), ts);
                    changed = true;
                }
            }
            if !task.contains_key("updated_at") {
                let ts = task
                    .get("created_at")
                    .or_else(|| task.get("added_at"))
                    .cloned();
                if let Some(ts) = ts {
                    task.insert("updated_at".to_string(), ts);
                    changed = true;
                }
            }
        }
    }

    if version < u64::from(SCHEMA_VERSION) {
        record.insert(
            "schema_version".to_string(),
            Value::from(SCHEMA_VERSION),
        );
        changed = true;
    }

    changed
}
