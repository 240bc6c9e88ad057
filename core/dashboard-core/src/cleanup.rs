//! Staleness detection and automatic closing of abandoned sessions.
//!
//! [`SessionStore::find_stale`] is only a snapshot. [`SessionStore::close_stale`]
//! re-reads every candidate under its lock and re-checks it against the clock
//! at that moment, so a session that received a heartbeat after the snapshot
//! is left alone.
//!
//! One bad record never aborts a batch: per-session failures are logged,
//! collected into [`CleanupStats::errors`], and the loop moves on. Project
//! aggregates are refreshed once per affected project after the batch.

use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Result, StoreError};
use crate::lock::RecordLock;
use crate::store::SessionStore;
use crate::types::{Session, SessionStatus};
use crate::validation::{validate_positive, MAX_THRESHOLD_HOURS};

/// Results from a cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupStats {
    /// Ids of sessions closed for inactivity.
    pub closed: Vec<String>,
    /// Ids of candidates that turned out to be alive (or gone) on re-check.
    pub recovered: Vec<String>,
    pub projects_refreshed: Vec<String>,
    /// File names of lock files removed because their session no longer exists.
    pub orphaned_locks_removed: Vec<String>,
    pub errors: Vec<String>,
}

enum Recheck {
    Closed(String),
    Recovered,
}

fn validate_threshold(threshold_hours: u32) -> Result<Duration> {
    let hours = validate_positive(threshold_hours, "threshold hours", MAX_THRESHOLD_HOURS)?;
    Ok(Duration::hours(i64::from(hours)))
}

pub fn auto_close_outcome(threshold_hours: u32) -> String {
    format!(
        "Automatically closed: no heartbeat for more than {}h",
        threshold_hours
    )
}

impl SessionStore {
    /// Active sessions whose last heartbeat is older than the threshold now.
    pub fn find_stale(&self, threshold_hours: u32) -> Result<Vec<Session>> {
        let threshold = validate_threshold(threshold_hours)?;
        let now = Utc::now();
        Ok(self
            .active_sessions(None)?
            .into_iter()
            .filter(|s| s.is_stale_at(threshold, now))
            .collect())
    }

    /// Closes each candidate that is still active and stale when re-read under
    /// its lock, then refreshes the affected projects.
    pub fn close_stale(&self, candidates: &[Session], threshold_hours: u32) -> Result<CleanupStats> {
        let threshold = validate_threshold(threshold_hours)?;
        let outcome = auto_close_outcome(threshold_hours);

        let mut stats = CleanupStats::default();
        let mut affected = BTreeSet::new();

        for candidate in candidates {
            let session_id = &candidate.session_id;
            let result = self.with_session_lock(session_id, |store| {
                let Some(mut fresh) = store.load_session(session_id)? else {
                    return Ok(Recheck::Recovered);
                };
                // Clock read per candidate: a slow batch must not judge late
                // candidates against an early timestamp.
                let now = Utc::now();
                if fresh.status != SessionStatus::Active || !fresh.is_stale_at(threshold, now) {
                    return Ok(Recheck::Recovered);
                }

                fresh.close(SessionStatus::Completed, now);
                fresh.outcome = Some(outcome.clone());
                store.save_session(&fresh)?;
                Ok(Recheck::Closed(fresh.project_slug))
            });

            match result {
                Ok(Recheck::Closed(slug)) => {
                    tracing::info!(session_id = %session_id, project = %slug, "Closed stale session");
                    affected.insert(slug);
                    stats.closed.push(session_id.clone());
                }
                Ok(Recheck::Recovered) => {
                    tracing::debug!(session_id = %session_id, "Stale candidate recovered before close");
                    stats.recovered.push(session_id.clone());
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to close stale session");
                    stats.errors.push(format!("{}: {}", session_id, e));
                }
            }
        }

        for slug in affected {
            match self.refresh_project(&slug) {
                Ok(_) => stats.projects_refreshed.push(slug),
                Err(e) => {
                    tracing::warn!(project = %slug, error = %e, "Project state refresh failed");
                    stats.errors.push(format!("refresh {}: {}", slug, e));
                }
            }
        }

        Ok(stats)
    }

    /// Closes stale sessions and removes orphaned lock files.
    pub fn cleanup(&self, threshold_hours: u32) -> Result<CleanupStats> {
        let candidates = self.find_stale(threshold_hours)?;
        let mut stats = self.close_stale(&candidates, threshold_hours)?;

        match self.remove_orphaned_locks() {
            Ok(removed) => stats.orphaned_locks_removed = removed,
            Err(e) => {
                tracing::warn!(error = %e, "Orphaned lock sweep failed");
                stats.errors.push(format!("orphaned locks: {}", e));
            }
        }

        tracing::info!(
            closed = stats.closed.len(),
            recovered = stats.recovered.len(),
            locks_removed = stats.orphaned_locks_removed.len(),
            errors = stats.errors.len(),
            "Cleanup finished"
        );
        Ok(stats)
    }

    /// Deletes `<id>.lock` files whose `<id>.json` does not exist.
    ///
    /// A lock file is only removed while this call holds it, so a writer that
    /// currently owns it is never disturbed.
    pub fn remove_orphaned_locks(&self) -> Result<Vec<String>> {
        let dir = self.storage().sessions_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                StoreError::io(
                    format!("scanning {}", dir.display()),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walkdir loop")),
                )
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            if path.with_extension("json").exists() {
                continue;
            }

            let guard = match RecordLock::try_acquire(path) {
                Ok(Some(guard)) => guard,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(lock = %path.display(), error = %e, "Could not inspect lock file");
                    continue;
                }
            };
            // Re-check while holding it: the session may have been written meanwhile.
            if path.with_extension("json").exists() {
                continue;
            }
            match fs_err::remove_file(path) {
                Ok(()) => {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        removed.push(name.to_string());
                    }
                }
                Err(e) => {
                    tracing::warn!(lock = %path.display(), error = %e, "Failed to remove orphaned lock");
                }
            }
            drop(guard);
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist;
    use crate::storage::StorageConfig;
    use crate::store::NewSession;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, SessionStore) {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(StorageConfig::with_root(temp.path()));
        (temp, store)
    }

    /// Creates an active session whose heartbeat is `hours_ago` in the past.
    fn aged_session(store: &SessionStore, slug: &str, hours_ago: i64) -> Session {
        let mut session = store.create(NewSession::new(slug, "Work")).unwrap();
        session.last_heartbeat = Utc::now() - Duration::hours(hours_ago);
        persist::save_json(&store.storage().session_file(&session.session_id), &session).unwrap();
        session
    }

    #[test]
    fn test_find_stale_respects_threshold() {
        let (_temp, store) = setup();
        let old = aged_session(&store, "proj", 25);
        aged_session(&store, "proj", 1);

        let stale = store.find_stale(24).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].session_id, old.session_id);
    }

    #[test]
    fn test_find_stale_ignores_parked() {
        let (_temp, store) = setup();
        let session = aged_session(&store, "proj", 48);
        store.park(&session.session_id, "later", None).unwrap();
        let mut parked = store.get(&session.session_id).unwrap().unwrap();
        parked.last_heartbeat = Utc::now() - Duration::hours(48);
        persist::save_json(&store.storage().session_file(&parked.session_id), &parked).unwrap();

        assert!(store.find_stale(24).unwrap().is_empty());
    }

    #[test]
    fn test_threshold_must_be_positive_and_bounded() {
        let (_temp, store) = setup();
        assert!(store.find_stale(0).unwrap_err().is_validation());
        assert!(store.cleanup(MAX_THRESHOLD_HOURS + 1).unwrap_err().is_validation());
    }

    #[test]
    fn test_cleanup_closes_stale_session_with_pinned_timestamps() {
        let (_temp, store) = setup();
        let session = aged_session(&store, "proj", 25);

        let stats = store.cleanup(24).unwrap();
        assert_eq!(stats.closed, vec![session.session_id.clone()]);
        assert_eq!(stats.projects_refreshed, vec!["proj".to_string()]);
        assert!(stats.errors.is_empty());

        let closed = store.get(&session.session_id).unwrap().unwrap();
        assert_eq!(closed.status, SessionStatus::Completed);
        assert_eq!(closed.ended_at, Some(closed.last_heartbeat));
        assert_eq!(closed.outcome, Some(auto_close_outcome(24)));
    }

    #[test]
    fn test_close_stale_skips_session_heartbeated_after_snapshot() {
        let (_temp, store) = setup();
        let session = aged_session(&store, "proj", 25);

        let snapshot = store.find_stale(24).unwrap();
        assert_eq!(snapshot.len(), 1);
        store.heartbeat(&session.session_id).unwrap();

        let stats = store.close_stale(&snapshot, 24).unwrap();
        assert!(stats.closed.is_empty());
        assert_eq!(stats.recovered, vec![session.session_id.clone()]);
        assert_eq!(
            store.get(&session.session_id).unwrap().unwrap().status,
            SessionStatus::Active
        );
    }

    #[test]
    fn test_close_stale_continues_past_corrupt_record() {
        let (_temp, store) = setup();
        let broken = aged_session(&store, "proj", 30);
        let healthy = aged_session(&store, "proj", 30);
        let snapshot = store.find_stale(24).unwrap();
        assert_eq!(snapshot.len(), 2);

        fs_err::write(store.storage().session_file(&broken.session_id), "{garbage").unwrap();

        let stats = store.close_stale(&snapshot, 24).unwrap();
        assert_eq!(stats.closed, vec![healthy.session_id.clone()]);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with(&broken.session_id));
    }

    #[test]
    fn test_close_stale_continues_past_locked_candidate() {
        let (_temp, store) = setup();
        let held = aged_session(&store, "proj", 30);
        let later_a = aged_session(&store, "proj", 30);
        let later_b = aged_session(&store, "proj", 30);
        let candidates = vec![held.clone(), later_a.clone(), later_b.clone()];
        let impatient = store
            .clone()
            .with_lock_timeout(std::time::Duration::from_millis(30));

        let stats = store
            .with_session_lock(&held.session_id, |_| impatient.close_stale(&candidates, 24))
            .unwrap();

        assert_eq!(stats.closed, vec![later_a.session_id, later_b.session_id]);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with(&held.session_id));
        assert_eq!(stats.projects_refreshed, vec!["proj"]);

        let still_open = store.get(&held.session_id).unwrap().unwrap();
        assert_eq!(still_open.status, SessionStatus::Active);
    }

    #[test]
    fn test_cleanup_refreshes_each_project_once() {
        let (_temp, store) = setup();
        aged_session(&store, "alpha", 30);
        aged_session(&store, "alpha", 30);
        aged_session(&store, "beta", 30);

        let stats = store.cleanup(24).unwrap();
        assert_eq!(stats.closed.len(), 3);
        assert_eq!(stats.projects_refreshed, vec!["alpha", "beta"]);
        let alpha = store.project_state("alpha").unwrap().unwrap();
        assert_eq!(alpha.completed_sessions, 2);
        assert_eq!(alpha.active_sessions, 0);
    }

    #[test]
    fn test_remove_orphaned_locks() {
        let (_temp, store) = setup();
        let live = store.create(NewSession::new("proj", "Work")).unwrap();
        store.add_event(&live.session_id, "creates a lock file").unwrap();

        let orphan = store.storage().session_lock_file("sess_20260101T000000_00000000000000aa");
        fs_err::write(&orphan, "").unwrap();
        let busy = store.storage().session_lock_file("sess_20260101T000000_00000000000000bb");
        let _held = RecordLock::acquire(&busy, std::time::Duration::from_secs(1)).unwrap();

        let removed = store.remove_orphaned_locks().unwrap();
        assert_eq!(removed, vec!["sess_20260101T000000_00000000000000aa.lock"]);
        assert!(!orphan.exists());
        assert!(busy.exists());
        assert!(store.storage().session_lock_file(&live.session_id).exists());
    }
}
