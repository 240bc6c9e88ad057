//! Dashboard overview: the read model served to the CLI and web front end.
//!
//! Built from one directory scan so every project in the response reflects the
//! same moment. Staleness is evaluated against the configured threshold at
//! build time.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::aggregate::build_project_state;
use crate::config::{load_config, DashboardSettings};
use crate::error::Result;
use crate::store::SessionStore;
use crate::types::{
    Commit, Event, RoadmapSummary, Session, SessionStatus, Task, TaskSummary,
};

/// Events and completed sessions shown per entry.
const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub timestamp: DateTime<Utc>,
    pub projects: Vec<ProjectOverview>,
    pub settings: DashboardSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOverview {
    pub slug: String,
    pub name: String,
    pub path: String,
    pub current_phase: String,
    pub active_sessions: Vec<SessionOverview>,
    pub parked_sessions: Vec<SessionOverview>,
    /// The most recent few only.
    pub completed_sessions: Vec<SessionOverview>,
    pub roadmap_summary: RoadmapSummary,
    pub active_count: u32,
    pub parked_count: u32,
    pub total_sessions: u32,
    pub next_steps: Vec<String>,
    pub task_summary: TaskSummary,
    pub last_activity: Option<DateTime<Utc>>,
}

/// One session as rendered in the overview.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub session_id: String,
    pub status: SessionStatus,
    pub intent: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roadmap_ref: Option<String>,
    pub git_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parked_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Last few events, oldest first.
    pub events: Vec<Event>,
    pub event_count: usize,
    pub files_changed: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    pub commits: Vec<Commit>,
    pub next_steps: Vec<String>,
    pub tasks: Vec<Task>,
    pub task_summary: TaskSummary,
    pub is_stale: bool,
}

impl SessionOverview {
    pub fn from_session(session: &Session, threshold: Duration, now: DateTime<Utc>) -> Self {
        let skip = session.events.len().saturating_sub(RECENT_LIMIT);
        SessionOverview {
            session_id: session.session_id.clone(),
            status: session.status,
            intent: session.intent.clone(),
            started_at: session.created_at,
            last_heartbeat: session.last_heartbeat,
            ended_at: session.ended_at,
            roadmap_ref: session.roadmap_ref.clone(),
            git_branch: session.git_branch.clone(),
            current_activity: session.current_activity.clone(),
            awaiting_action: session.awaiting_action.clone(),
            parked_reason: session.parked_reason.clone(),
            outcome: session.outcome.clone(),
            events: session.events[skip..].to_vec(),
            event_count: session.events.len(),
            files_changed: session.files_changed.clone(),
            decisions: session.decisions.clone(),
            open_questions: session.open_questions.clone(),
            commits: session.commits.clone(),
            next_steps: session.next_steps.clone(),
            tasks: session.tasks.clone(),
            task_summary: session.task_summary(),
            is_stale: session.status == SessionStatus::Active
                && session.is_stale_at(threshold, now),
        }
    }
}

impl SessionStore {
    /// Builds the overview of every registered project.
    pub fn build_overview(&self) -> Result<Overview> {
        let config = load_config(self.storage())?;
        let now = Utc::now();
        let threshold = Duration::hours(i64::from(config.settings.stale_threshold_hours));

        let mut sessions = self.scan_sessions();
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });

        let projects = config
            .projects
            .iter()
            .map(|(slug, reg)| {
                let state = build_project_state(slug, Some(reg), &sessions, now);
                let owned = sessions.iter().filter(|s| &s.project_slug == slug);
                let render = |s: &Session| SessionOverview::from_session(s, threshold, now);

                ProjectOverview {
                    slug: slug.clone(),
                    name: state.name,
                    path: state.path,
                    current_phase: state.current_phase,
                    active_sessions: owned
                        .clone()
                        .filter(|s| s.status == SessionStatus::Active)
                        .map(render)
                        .collect(),
                    parked_sessions: owned
                        .clone()
                        .filter(|s| s.status == SessionStatus::Parked)
                        .map(render)
                        .collect(),
                    completed_sessions: owned
                        .filter(|s| s.status == SessionStatus::Completed)
                        .take(RECENT_LIMIT)
                        .map(render)
                        .collect(),
                    next_steps: state.roadmap_summary.next_up.clone(),
                    roadmap_summary: state.roadmap_summary,
                    active_count: state.active_sessions,
                    parked_count: state.parked_sessions,
                    total_sessions: state.total_sessions,
                    task_summary: state.task_summary,
                    last_activity: state.last_activity,
                }
            })
            .collect();

        Ok(Overview {
            timestamp: now,
            projects,
            settings: config.settings,
        })
    }
}
