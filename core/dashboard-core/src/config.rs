//! Project registry and dashboard settings (`config.json`).
//!
//! ```json
//! {
//!   "version": 1,
//!   "projects": {
//!     "my-app": { "name": "My App", "path": "/src/my_app", "registered_at": "..." }
//!   },
//!   "settings": { "stale_threshold_hours": 24, "lock_timeout_ms": 10000 }
//! }
//! ```
//!
//! Keys this crate does not use (`dashboard_port`, notification settings, ...)
//! belong to other readers of the file and are carried through every rewrite.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::lock::{RecordLock, DEFAULT_LOCK_TIMEOUT};
use crate::persist;
use crate::storage::StorageConfig;
use crate::types::DEFAULT_STALE_THRESHOLD_HOURS;
use crate::validation::{validate_project_slug, validate_text, MAX_PROJECT_NAME};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRegistration {
    pub name: String,
    pub path: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSettings {
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Settings owned by other tools; written back untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_stale_threshold_hours() -> u32 {
    DEFAULT_STALE_THRESHOLD_HOURS
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}

impl Default for DashboardSettings {
    fn default() -> Self {
        DashboardSettings {
            stale_threshold_hours: default_stale_threshold_hours(),
            lock_timeout_ms: default_lock_timeout_ms(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Slug → registration, kept sorted for stable output.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectRegistration>,
    #[serde(default)]
    pub settings: DashboardSettings,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            version: CONFIG_VERSION,
            projects: BTreeMap::new(),
            settings: DashboardSettings::default(),
        }
    }
}

/// Loads config.json, writing the default file first if there is none.
pub fn load_config(storage: &StorageConfig) -> Result<DashboardConfig> {
    if let Some(config) = read_config(storage)? {
        return Ok(config);
    }

    storage.ensure_dirs()?;
    let _lock = RecordLock::acquire(&storage.config_lock_file(), DEFAULT_LOCK_TIMEOUT)?;
    // Another process may have written it while we waited.
    if let Some(config) = read_config(storage)? {
        return Ok(config);
    }

    let config = DashboardConfig::default();
    save_config(storage, &config)?;
    tracing::debug!(path = %storage.config_file().display(), "Created default config");
    Ok(config)
}

fn read_config(storage: &StorageConfig) -> Result<Option<DashboardConfig>> {
    persist::load_record(&storage.config_file())
}

pub fn save_config(storage: &StorageConfig, config: &DashboardConfig) -> Result<()> {
    storage.ensure_dirs()?;
    persist::save_json(&storage.config_file(), config)
}

/// Lowercases and turns spaces and underscores into hyphens.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "-")
}

/// Registers the project at `path` and returns its slug.
///
/// The slug comes from the last path component. Registering the same path
/// again keeps the first registration.
pub fn register_project(storage: &StorageConfig, name: &str, path: &str) -> Result<String> {
    let name = validate_text(name, "project name", MAX_PROJECT_NAME)?;
    let dir_name = Path::new(path.trim_end_matches('/'))
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            StoreError::validation("project path", format!("'{}' has no final component", path))
        })?;
    let slug = slugify(dir_name);
    validate_project_slug(&slug)?;

    storage.ensure_dirs()?;
    let _lock = RecordLock::acquire(&storage.config_lock_file(), DEFAULT_LOCK_TIMEOUT)?;

    let mut config = read_config(storage)?.unwrap_or_default();
    if config.projects.contains_key(&slug) {
        return Ok(slug);
    }

    config.projects.insert(
        slug.clone(),
        ProjectRegistration {
            name,
            path: path.to_string(),
            registered_at: Utc::now(),
        },
    );
    save_config(storage, &config)?;
    tracing::info!(project = %slug, path = %path, "Registered project");
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_creates_default() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        let config = load_config(&storage).unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert!(storage.config_file().exists());
        assert_eq!(config.settings.stale_threshold_hours, 24);
        assert_eq!(config.settings.lock_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_keeps_unknown_settings() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        fs_err::write(
            storage.config_file(),
            r#"{"version":1,"projects":{},"settings":{"dashboard_port":9000,"stale_threshold_hours":6}}"#,
        )
        .unwrap();
        let config = load_config(&storage).unwrap();
        assert_eq!(config.settings.stale_threshold_hours, 6);
        assert_eq!(config.settings.lock_timeout_ms, 10_000);
        assert_eq!(config.settings.extra["dashboard_port"], 9000);
    }

    #[test]
    fn test_register_preserves_foreign_settings() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        fs_err::write(
            storage.config_file(),
            r#"{"settings":{"dashboard_port":9123,"archive_after_days":7,"notifications_enabled":false,"stale_threshold_hours":6}}"#,
        )
        .unwrap();

        register_project(&storage, "App", "/src/app").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs_err::read_to_string(storage.config_file()).unwrap()).unwrap();
        let settings = &raw["settings"];
        assert_eq!(settings["dashboard_port"], 9123);
        assert_eq!(settings["archive_after_days"], 7);
        assert_eq!(settings["notifications_enabled"], false);
        assert_eq!(settings["stale_threshold_hours"], 6);
        assert!(raw["projects"]["app"].is_object());
    }

    #[test]
    fn test_load_corrupt_config_is_error() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        fs_err::write(storage.config_file(), "{oops").unwrap();
        assert!(matches!(
            load_config(&storage),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Project_Name"), "my-project-name");
        assert_eq!(slugify("already-fine"), "already-fine");
    }

    #[test]
    fn test_register_is_idempotent() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        let slug = register_project(&storage, "My App", "/src/My_App").unwrap();
        assert_eq!(slug, "my-app");
        let again = register_project(&storage, "Renamed", "/src/My_App/").unwrap();
        assert_eq!(again, slug);

        let config = load_config(&storage).unwrap();
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.projects["my-app"].name, "My App");
    }

    #[test]
    fn test_register_rejects_unsluggable_path() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        assert!(register_project(&storage, "Root", "/").is_err());
        assert!(register_project(&storage, "Dots", "/src/.hidden").is_err());
        assert!(register_project(&storage, "", "/src/app").is_err());
    }

    #[test]
    fn test_concurrent_registrations_are_not_lost() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path());
        std::thread::scope(|scope| {
            for i in 0..8 {
                let storage = &storage;
                scope.spawn(move || {
                    register_project(storage, "App", &format!("/src/app{}", i)).unwrap();
                });
            }
        });
        assert_eq!(load_config(&storage).unwrap().projects.len(), 8);
    }
}
