//! dashboard-hook: maintenance and hook entry point for the session dashboard.
//!
//! Thin wrapper over [`dashboard_core::SessionStore`]. Every subcommand prints
//! its result as JSON on stdout.
//!
//! ## Subcommands
//!
//! - `heartbeat`: Mark a project's (or one session's) active sessions alive.
//!   Non-critical: always exits 0 so it never disrupts the calling hook.
//! - `cleanup`: Close stale sessions and remove orphaned lock files
//! - `stale`: List stale sessions without touching them
//! - `overview`: Dump the dashboard overview
//! - `refresh`: Rebuild one project's cached state
//!
//! The storage root is `$DASHBOARD_HOME`, or `~/.claude/dashboard`.

mod logging;

use chrono::{DateTime, Utc};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use dashboard_core::{load_config, DashboardSettings, SessionStore, StorageConfig, StoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "dashboard-hook")]
#[command(about = "Session dashboard hook and maintenance commands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh last_heartbeat of active sessions
    Heartbeat(HeartbeatTarget),

    /// Close sessions without a heartbeat for longer than the threshold
    Cleanup {
        /// Inactivity threshold (defaults to the configured value)
        #[arg(long)]
        threshold_hours: Option<u32>,
    },

    /// List active sessions without a recent heartbeat
    Stale {
        /// Inactivity threshold (defaults to the configured value)
        #[arg(long)]
        threshold_hours: Option<u32>,
    },

    /// Print the dashboard overview
    Overview,

    /// Rebuild the cached state of one project
    Refresh {
        #[arg(long)]
        project: String,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct HeartbeatTarget {
    /// Project slug: heartbeat all of its active sessions
    #[arg(long)]
    project: Option<String>,

    /// Single session id
    #[arg(long)]
    session: Option<String>,
}

#[derive(Error, Debug)]
enum HookError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct HeartbeatReport {
    updated: Vec<String>,
}

#[derive(Serialize)]
struct StaleEntry {
    session_id: String,
    project_slug: String,
    intent: String,
    last_heartbeat: DateTime<Utc>,
    idle_hours: i64,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), HookError> {
    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), value)?;
    println!();
    Ok(())
}

fn heartbeat(store: &SessionStore, target: &HeartbeatTarget) -> Result<(), HookError> {
    let updated = match (&target.project, &target.session) {
        (Some(project), _) => store
            .heartbeat_project(project)?
            .into_iter()
            .map(|s| s.session_id)
            .collect(),
        (None, Some(session_id)) => store
            .heartbeat(session_id)?
            .map(|s| s.session_id)
            .into_iter()
            .collect(),
        (None, None) => Vec::new(),
    };
    print_json(&HeartbeatReport { updated })
}

fn stale(store: &SessionStore, threshold_hours: u32) -> Result<(), HookError> {
    let now = Utc::now();
    let entries: Vec<StaleEntry> = store
        .find_stale(threshold_hours)?
        .into_iter()
        .map(|s| StaleEntry {
            idle_hours: (now - s.last_heartbeat).num_hours(),
            session_id: s.session_id,
            project_slug: s.project_slug,
            intent: s.intent,
            last_heartbeat: s.last_heartbeat,
        })
        .collect();
    print_json(&entries)
}

fn run(command: Commands, store: &SessionStore, settings: &DashboardSettings) -> Result<(), HookError> {
    match command {
        Commands::Heartbeat(target) => heartbeat(store, &target),
        Commands::Cleanup { threshold_hours } => {
            let hours = threshold_hours.unwrap_or(settings.stale_threshold_hours);
            print_json(&store.cleanup(hours)?)
        }
        Commands::Stale { threshold_hours } => {
            stale(store, threshold_hours.unwrap_or(settings.stale_threshold_hours))
        }
        Commands::Overview => print_json(&store.build_overview()?),
        Commands::Refresh { project } => print_json(&store.refresh_project(&project)?),
    }
}

/// Exit status for a finished command. Heartbeats are best-effort and
/// never fail the calling hook.
fn exit_status(result: Result<(), HookError>, is_heartbeat: bool) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) if is_heartbeat => {
            tracing::warn!(error = %e, "dashboard-hook heartbeat failed");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "dashboard-hook failed");
            eprintln!("dashboard-hook: {}", e);
            1
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let is_heartbeat = matches!(cli.command, Commands::Heartbeat(_));

    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("dashboard-hook: {}", e);
            return ExitCode::from(if is_heartbeat { 0 } else { 1 });
        }
    };
    let logging_guard = logging::init(&storage);

    let settings = match load_config(&storage) {
        Ok(config) => config.settings,
        Err(e) => {
            tracing::warn!(error = %e, "Using default settings");
            DashboardSettings::default()
        }
    };
    let store = SessionStore::from_settings(storage, &settings);

    let status = exit_status(run(cli.command, &store, &settings), is_heartbeat);
    // Flushes the non-blocking log writer before the process exits.
    drop(logging_guard);
    ExitCode::from(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_requires_exactly_one_target() {
        assert!(Cli::try_parse_from(["dashboard-hook", "heartbeat"]).is_err());
        assert!(Cli::try_parse_from([
            "dashboard-hook",
            "heartbeat",
            "--project",
            "p",
            "--session",
            "s"
        ])
        .is_err());

        let cli = Cli::try_parse_from(["dashboard-hook", "heartbeat", "--project", "p"]).unwrap();
        match cli.command {
            Commands::Heartbeat(target) => assert_eq!(target.project.as_deref(), Some("p")),
            _ => panic!("expected heartbeat"),
        }
    }

    #[test]
    fn test_cleanup_threshold_is_optional() {
        let cli = Cli::try_parse_from(["dashboard-hook", "cleanup"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cleanup {
                threshold_hours: None
            }
        ));

        let cli =
            Cli::try_parse_from(["dashboard-hook", "stale", "--threshold-hours", "6"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Stale {
                threshold_hours: Some(6)
            }
        ));
    }

    #[test]
    fn test_session_heartbeat_on_missing_session_reports_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(StorageConfig::with_root(temp.path()));
        let target = HeartbeatTarget {
            project: None,
            session: Some("sess_20260101T000000_0000000000000000".to_string()),
        };
        assert!(heartbeat(&store, &target).is_ok());
    }

    #[test]
    fn test_exit_status_spares_heartbeat_failures() {
        let invalid = || {
            HookError::Store(StoreError::Validation {
                field: "session_id".to_string(),
                reason: "bad".to_string(),
            })
        };
        assert_eq!(exit_status(Ok(()), false), 0);
        assert_eq!(exit_status(Err(invalid()), true), 0);
        assert_eq!(exit_status(Err(invalid()), false), 1);
    }
}
