// Task tracker capability: the only way the core reads or moves task labels

pub mod binding;
pub mod github;
pub mod memory;

pub use binding::{ProjectTracker, SharedTracker, TrackerMap, TrackerResolver};
pub use github::{GitHubTracker, GitHubTrackers};
pub use memory::{InMemoryTracker, TrackerCall};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("#{issue_id} has labels [{}] but expected \"{expected}\"", actual.join(", "))]
    LabelMismatch {
        issue_id: u64,
        expected: String,
        actual: Vec<String>,
    },

    #[error("Task #{0} not found")]
    TaskNotFound(u64),

    #[error("Tracker API error: {0}")]
    Api(String),

    #[error("Tracker operation '{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Project \"{0}\" has no tracker binding")]
    Unbound(String),

    #[error("Invalid tracker binding \"{0}\", expected owner/repo")]
    InvalidBinding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub state: TaskState,
    pub url: String,
}

impl Task {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|existing| existing == label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Open tasks carrying `label`, oldest first
    async fn list_by_label(&self, label: &str) -> Result<Vec<Task>, TrackerError>;

    async fn get(&self, id: u64) -> Result<Task, TrackerError>;

    async fn list_comments(&self, id: u64) -> Result<Vec<Comment>, TrackerError>;

    /// Replace `from` with `to`. Fails with `LabelMismatch` if the task does not carry `from`.
    async fn transition_label(&self, id: u64, from: &str, to: &str) -> Result<(), TrackerError>;

    async fn close(&self, id: u64) -> Result<(), TrackerError>;

    async fn reopen(&self, id: u64) -> Result<(), TrackerError>;

    /// Create any missing labels; returns the ones that were created
    async fn ensure_labels(&self, labels: &[String]) -> Result<Vec<String>, TrackerError>;
}

/// Finds the artifact (pull request URL) produced for a task
#[async_trait]
pub trait ArtifactLocator: Send + Sync {
    async fn find_artifact(&self, id: u64) -> Result<Option<String>, TrackerError>;
}

/// Locator used when the tracker has no notion of artifacts
pub struct NoArtifacts;

#[async_trait]
impl ArtifactLocator for NoArtifacts {
    async fn find_artifact(&self, _id: u64) -> Result<Option<String>, TrackerError> {
        Ok(None)
    }
}
