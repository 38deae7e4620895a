// Dispatch capability: hands a task to a worker session.
// A dispatch either fully succeeds or has no effect.

pub mod command;

pub use command::CommandDispatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::tracker::{Comment, Task};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{0}")]
    Failed(String),

    #[error("dispatch timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("invalid dispatcher response: {0}")]
    InvalidResponse(String),
}

/// `spawn` starts a new session, `send` reuses one for the same level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Spawn,
    Send,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Spawn => write!(f, "spawn"),
            DispatchMode::Send => write!(f, "send"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub project_id: String,
    pub project_name: String,
    pub repo: String,
    pub channel: Option<String>,
    pub role: String,
    pub level: String,
    pub issue_id: u64,
    pub issue_title: String,
    pub issue_url: String,
    /// Full task message handed to the worker
    pub message: String,
    pub from_label: String,
    pub to_label: String,
    pub mode: DispatchMode,
    pub session_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub action: DispatchMode,
    pub session_ref: String,
    #[serde(default)]
    pub announcement: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError>;
}

/// Task content as the worker sees it
pub fn build_task_message(project_name: &str, role: &str, task: &Task, comments: &[Comment]) -> String {
    let mut message = format!(
        "{role} task for {project_name}\n\n#{} {}\n{}\n",
        task.id, task.title, task.url
    );
    if !task.description.trim().is_empty() {
        message.push('\n');
        message.push_str(task.description.trim());
        message.push('\n');
    }
    if !comments.is_empty() {
        message.push_str("\nComments:\n");
        for comment in comments {
            message.push_str(&format!(
                "- {} ({}): {}\n",
                comment.author,
                comment.created_at.format("%Y-%m-%d %H:%M"),
                comment.body.trim()
            ));
        }
    }
    message
}
