use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::state::StorageError;
use crate::tracker::TrackerError;

/// Errors surfaced by the core operations (pickup, completion, health, heartbeat).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed workflow graph. Never retried.
    #[error("Workflow configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller asked for something the current state does not allow.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid completion: {role} cannot finish with result \"{result}\" ({reason})")]
    InvalidCompletion {
        role: String,
        result: String,
        reason: String,
    },

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Task tracker error: {0}")]
    Tracker(TrackerError),

    #[error("State storage error: {0}")]
    Storage(#[from] StorageError),

    /// The worker was released but the label write after it failed.
    #[error(
        "Partial completion on #{issue_id}: worker {role} was deactivated but the label transition failed: {source}. Operator attention required"
    )]
    PartialCompletion {
        issue_id: u64,
        role: String,
        #[source]
        source: TrackerError,
    },
}

impl From<TrackerError> for CoreError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::LabelMismatch { .. } => CoreError::Precondition(err.to_string()),
            TrackerError::TaskNotFound(id) => CoreError::NotFound(format!("task #{id}")),
            TrackerError::Unbound(ref project_id) => CoreError::Precondition(format!(
                "{err}; run `labelflow register {project_id} --tracker <owner/repo>`"
            )),
            other => CoreError::Tracker(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
