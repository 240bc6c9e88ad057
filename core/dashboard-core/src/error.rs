//! Error types for dashboard-core operations.
//!
//! "Not found" is never an error here: lookups and mutations return `Ok(None)`
//! for a missing session or task. Everything below is either a rejected input,
//! a refused state transition, or an I/O problem.

use std::path::PathBuf;

use crate::types::SessionStatus;

/// All errors that can occur in dashboard-core operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // ─────────────────────────────────────────────────────────────────────
    // Rejected Input
    // ─────────────────────────────────────────────────────────────────────
    /// Raised before any lock is taken or any record is touched.
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Cannot {action} session {session_id}: status is {status}")]
    InvalidTransition {
        session_id: String,
        status: SessionStatus,
        action: &'static str,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────────
    #[error("Lock busy: {resource} (gave up after {waited_ms}ms)")]
    LockBusy { resource: String, waited_ms: u64 },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Corrupt record: {path}: {details}")]
    Corrupt { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Platform not supported for this operation: {0}")]
    Unsupported(String),
}

impl StoreError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    /// True for errors caused by the caller's input rather than by the disk.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::Validation { .. } | StoreError::InvalidTransition { .. }
        )
    }
}

/// Convenience type alias for Results using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;
