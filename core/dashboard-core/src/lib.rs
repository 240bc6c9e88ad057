//! # dashboard-core
//!
//! Session record store for the dashboard. Tracks work sessions and their
//! tasks as JSON files on local disk, mutated by many independent processes
//! (one per open terminal) without any coordinating daemon.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Every call blocks on the filesystem.
//! - **Filesystem is the only coordinator**: per-session `flock` locks, atomic
//!   temp-file + rename writes, random identifiers.
//! - **Not-found is not an error**: lookups and mutations return `Ok(None)`.
//! - **Derived state is disposable**: project aggregates are rebuilt from
//!   session records and can be deleted at any time.
//! - **Injected paths**: everything hangs off one [`StorageConfig`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dashboard_core::{NewSession, SessionStore, StorageConfig};
//!
//! let store = SessionStore::new(StorageConfig::from_env()?);
//! let session = store.create(NewSession::new("my-app", "Fix login flow"))?;
//! store.add_task(&session.session_id, "Reproduce bug")?;
//! store.park(&session.session_id, "Waiting on review", None)?;
//! ```

pub mod aggregate;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod ids;
pub mod lock;
pub mod overview;
pub mod persist;
pub mod storage;
pub mod store;
pub mod types;
pub mod validation;

pub use aggregate::build_project_state;
pub use cleanup::CleanupStats;
pub use config::{
    load_config, register_project, save_config, DashboardConfig, DashboardSettings,
    ProjectRegistration,
};
pub use error::{Result, StoreError};
pub use overview::{Overview, ProjectOverview, SessionOverview};
pub use storage::StorageConfig;
pub use store::{Completion, NewSession, SessionFilter, SessionStore, SessionUpdate};
pub use types::*;
