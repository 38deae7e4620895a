use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whether the roles of one project may work at the same time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleExecution {
    #[default]
    Parallel,
    Sequential,
}

impl fmt::Display for RoleExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleExecution::Parallel => write!(f, "parallel"),
            RoleExecution::Sequential => write!(f, "sequential"),
        }
    }
}

impl std::str::FromStr for RoleExecution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(RoleExecution::Parallel),
            "sequential" => Ok(RoleExecution::Sequential),
            other => Err(format!("unknown execution policy \"{other}\" (parallel|sequential)")),
        }
    }
}

/// Per-role worker slot.
///
/// `sessions` is a reuse cache keyed by level and outlives any single task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerState {
    #[serde(default)]
    pub active: bool,
    /// One issue id, or several joined with commas
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub sessions: BTreeMap<String, Option<String>>,
    /// Queue the current task was picked up from
    #[serde(default)]
    pub queue_label: Option<String>,
}

impl WorkerState {
    pub fn issue_ids(&self) -> Vec<u64> {
        self.issue_id
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|id| id.trim().trim_start_matches('#').parse().ok())
            .collect()
    }

    pub fn primary_issue(&self) -> Option<u64> {
        self.issue_ids().into_iter().next()
    }

    pub fn session_for(&self, level: &str) -> Option<&str> {
        self.sessions.get(level).and_then(|session| session.as_deref())
    }

    /// Session backing the current level, if any
    pub fn current_session(&self) -> Option<&str> {
        self.level.as_deref().and_then(|level| self.session_for(level))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    /// Local checkout of the project's source
    pub repo: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub role_execution: RoleExecution,
    /// `owner/repo` of the issue tracker holding this project's tasks
    #[serde(default)]
    pub tracker: Option<String>,
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerState>,
}

impl Project {
    pub fn new(name: &str, repo: &str) -> Self {
        Self {
            name: name.to_string(),
            repo: repo.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tracker(mut self, tracker: impl Into<String>) -> Self {
        self.tracker = Some(tracker.into());
        self
    }

    /// Worker for `role`, zero-valued when the role has never been used
    pub fn worker(&self, role: &str) -> WorkerState {
        self.workers.get(role).cloned().unwrap_or_default()
    }

    pub fn active_roles(&self) -> Vec<&str> {
        self.workers
            .iter()
            .filter(|(_, worker)| worker.active)
            .map(|(role, _)| role.as_str())
            .collect()
    }

    pub fn is_active(&self) -> bool {
        self.workers.values().any(|worker| worker.active)
    }
}

/// The persisted document: `{ "projects": { <id>: Project } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsDocument {
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
}

/// Partial worker update. Present fields replace, `sessions` merges key-wise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerUpdate {
    pub active: Option<bool>,
    pub issue_id: Option<Option<String>>,
    pub start_time: Option<Option<DateTime<Utc>>>,
    pub level: Option<Option<String>>,
    pub sessions: Option<BTreeMap<String, Option<String>>>,
    pub queue_label: Option<Option<String>>,
}

impl WorkerUpdate {
    pub fn apply(self, worker: &mut WorkerState) {
        if let Some(active) = self.active {
            worker.active = active;
        }
        if let Some(issue_id) = self.issue_id {
            worker.issue_id = issue_id;
        }
        if let Some(start_time) = self.start_time {
            worker.start_time = start_time;
        }
        if let Some(level) = self.level {
            worker.level = level;
        }
        if let Some(sessions) = self.sessions {
            worker.sessions.extend(sessions);
        }
        if let Some(queue_label) = self.queue_label {
            worker.queue_label = queue_label;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateParams {
    pub issue_id: String,
    pub level: String,
    pub session_ref: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub queue_label: Option<String>,
}

impl ActivateParams {
    pub fn new(issue_id: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            level: level.into(),
            session_ref: None,
            start_time: None,
            queue_label: None,
        }
    }

    /// Remember the queue so a failed run can be put back where it came from
    pub fn from_queue(mut self, queue_label: impl Into<String>) -> Self {
        self.queue_label = Some(queue_label.into());
        self
    }

    pub fn with_session(mut self, session_ref: impl Into<String>) -> Self {
        self.session_ref = Some(session_ref.into());
        self
    }

    pub fn started_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }
}
