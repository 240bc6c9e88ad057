//! Storage configuration and path management for the dashboard.
//!
//! Every path the store touches is derived from one `StorageConfig`, which is
//! injected into [`crate::SessionStore`] at construction. Nothing in the crate
//! reads a process-wide directory constant.
//!
//! ```text
//! <root>/
//! ├── config.json              # project registry + settings
//! ├── config.lock
//! ├── sessions/
//! │   ├── <session_id>.json    # one record per session
//! │   └── <session_id>.lock    # flock target, independent of the data file
//! └── projects/
//!     └── <slug>.json          # derived ProjectState cache
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Environment variable that relocates the storage root.
pub const ROOT_ENV_VAR: &str = "DASHBOARD_HOME";

/// Central configuration for all dashboard storage paths.
///
/// Production code uses [`StorageConfig::from_env`] (falls back to
/// `~/.claude/dashboard`). Tests use [`StorageConfig::with_root`] with a temp dir.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the root from `DASHBOARD_HOME`, then `~/.claude/dashboard`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            StoreError::io(
                "resolving home directory",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no home directory"),
            )
        })?;
        Ok(Self::with_root(home.join(".claude").join("dashboard")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Global Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.json (project registry and settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Lock guarding read-modify-write of config.json.
    pub fn config_lock_file(&self) -> PathBuf {
        self.root.join("config.lock")
    }

    /// Directory for the binary's rolling log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Per-Record Paths
    // ─────────────────────────────────────────────────────────────────────────────

    /// Callers must validate `session_id` first; it becomes a file name.
    pub fn session_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", session_id))
    }

    pub fn session_lock_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.lock", session_id))
    }

    pub fn project_state_file(&self, project_slug: &str) -> PathBuf {
        self.projects_dir().join(format!("{}.json", project_slug))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directory Creation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.sessions_dir(), self.projects_dir()] {
            fs_err::create_dir_all(&dir)
                .map_err(|e| StoreError::io(format!("creating {}", dir.display()), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_root_sets_root() {
        let storage = StorageConfig::with_root("/tmp/dash");
        assert_eq!(storage.root(), Path::new("/tmp/dash"));
    }

    #[test]
    fn test_record_paths() {
        let storage = StorageConfig::with_root("/d");
        assert_eq!(
            storage.session_file("sess_x"),
            PathBuf::from("/d/sessions/sess_x.json")
        );
        assert_eq!(
            storage.session_lock_file("sess_x"),
            PathBuf::from("/d/sessions/sess_x.lock")
        );
        assert_eq!(
            storage.project_state_file("my-proj"),
            PathBuf::from("/d/projects/my-proj.json")
        );
        assert_eq!(storage.config_file(), PathBuf::from("/d/config.json"));
    }

    #[test]
    fn test_ensure_dirs_creates_structure() {
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("dashboard"));
        storage.ensure_dirs().unwrap();

        assert!(storage.root().is_dir());
        assert!(storage.sessions_dir().is_dir());
        assert!(storage.projects_dir().is_dir());
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        storage.ensure_dirs().unwrap();
        storage.ensure_dirs().unwrap();
        assert!(storage.sessions_dir().is_dir());
    }
}
