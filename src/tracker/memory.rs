// In-memory tracker used by tests and dry runs. Records every mutating call.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{ArtifactLocator, Comment, Task, TaskState, TaskTracker, TrackerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    Transition { id: u64, from: String, to: String },
    Close(u64),
    Reopen(u64),
    CreateLabel(String),
}

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<u64, Task>,
    comments: BTreeMap<u64, Vec<Comment>>,
    artifacts: BTreeMap<u64, String>,
    labels: BTreeSet<String>,
    calls: Vec<TrackerCall>,
    fail_transitions: bool,
}

#[derive(Default)]
pub struct InMemoryTracker {
    inner: Mutex<Inner>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an open task with the given labels
    pub fn add_task(&self, id: u64, title: &str, labels: &[&str]) -> Task {
        let task = Task {
            id,
            title: title.to_string(),
            description: String::new(),
            labels: labels.iter().map(|label| label.to_string()).collect(),
            state: TaskState::Open,
            url: format!("https://tracker.local/issues/{id}"),
        };
        self.lock().tasks.insert(id, task.clone());
        task
    }

    pub fn set_description(&self, id: u64, description: &str) {
        if let Some(task) = self.lock().tasks.get_mut(&id) {
            task.description = description.to_string();
        }
    }

    pub fn add_comment(&self, id: u64, author: &str, body: &str) {
        self.lock().comments.entry(id).or_default().push(Comment {
            author: author.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn set_artifact(&self, id: u64, url: &str) {
        self.lock().artifacts.insert(id, url.to_string());
    }

    /// Make every label transition fail with an API error
    pub fn fail_transitions(&self, fail: bool) {
        self.lock().fail_transitions = fail;
    }

    pub fn task(&self, id: u64) -> Option<Task> {
        self.lock().tasks.get(&id).cloned()
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.lock().calls.clone()
    }

    pub fn transitions(&self) -> Vec<TrackerCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, TrackerCall::Transition { .. }))
            .collect()
    }

    pub fn known_labels(&self) -> BTreeSet<String> {
        self.lock().labels.clone()
    }
}

#[async_trait]
impl TaskTracker for InMemoryTracker {
    async fn list_by_label(&self, label: &str) -> Result<Vec<Task>, TrackerError> {
        // ids grow with creation time
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|task| task.state == TaskState::Open && task.has_label(label))
            .cloned()
            .collect())
    }

    async fn get(&self, id: u64) -> Result<Task, TrackerError> {
        self.lock()
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TrackerError::TaskNotFound(id))
    }

    async fn list_comments(&self, id: u64) -> Result<Vec<Comment>, TrackerError> {
        Ok(self.lock().comments.get(&id).cloned().unwrap_or_default())
    }

    async fn transition_label(&self, id: u64, from: &str, to: &str) -> Result<(), TrackerError> {
        let mut inner = self.lock();
        inner.calls.push(TrackerCall::Transition {
            id,
            from: from.to_string(),
            to: to.to_string(),
        });
        if inner.fail_transitions {
            return Err(TrackerError::Api(format!("injected failure moving #{id}")));
        }

        let task = inner.tasks.get_mut(&id).ok_or(TrackerError::TaskNotFound(id))?;
        if !task.has_label(from) {
            return Err(TrackerError::LabelMismatch {
                issue_id: id,
                expected: from.to_string(),
                actual: task.labels.clone(),
            });
        }
        task.labels.retain(|label| label != from);
        if !task.has_label(to) {
            task.labels.push(to.to_string());
        }
        Ok(())
    }

    async fn close(&self, id: u64) -> Result<(), TrackerError> {
        let mut inner = self.lock();
        inner.calls.push(TrackerCall::Close(id));
        let task = inner.tasks.get_mut(&id).ok_or(TrackerError::TaskNotFound(id))?;
        task.state = TaskState::Closed;
        Ok(())
    }

    async fn reopen(&self, id: u64) -> Result<(), TrackerError> {
        let mut inner = self.lock();
        inner.calls.push(TrackerCall::Reopen(id));
        let task = inner.tasks.get_mut(&id).ok_or(TrackerError::TaskNotFound(id))?;
        task.state = TaskState::Open;
        Ok(())
    }

    async fn ensure_labels(&self, labels: &[String]) -> Result<Vec<String>, TrackerError> {
        let mut inner = self.lock();
        let mut created = Vec::new();
        for label in labels {
            if inner.labels.insert(label.clone()) {
                inner.calls.push(TrackerCall::CreateLabel(label.clone()));
                created.push(label.clone());
            }
        }
        Ok(created)
    }
}

#[async_trait]
impl ArtifactLocator for InMemoryTracker {
    async fn find_artifact(&self, id: u64) -> Result<Option<String>, TrackerError> {
        Ok(self.lock().artifacts.get(&id).cloned())
    }
}
