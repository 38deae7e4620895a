// Best-effort notifications. Nothing in here may fail the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NotificationEvent {
    #[serde(rename_all = "camelCase")]
    HeartbeatSummary {
        projects: usize,
        pickups: usize,
        health_fixes: usize,
        skipped: usize,
    },
    #[serde(rename_all = "camelCase")]
    WorkerComplete {
        project_id: String,
        project_name: String,
        channel: Option<String>,
        role: String,
        issue_id: u64,
        result: String,
        summary: Option<String>,
        next_state: String,
    },
    #[serde(rename_all = "camelCase")]
    Pickup {
        project_id: String,
        project_name: String,
        channel: Option<String>,
        role: String,
        level: String,
        issue_id: u64,
        issue_title: String,
        mode: String,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::HeartbeatSummary { .. } => "heartbeat-summary",
            NotificationEvent::WorkerComplete { .. } => "worker-complete",
            NotificationEvent::Pickup { .. } => "pickup",
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// How long one-shot commands wait for outstanding deliveries
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Deliveries run in the background; [`NotificationQueue::flush`] waits for
/// them before a short-lived process exits.
#[derive(Clone)]
pub struct NotificationQueue {
    notifier: Arc<dyn Notifier>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl NotificationQueue {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start delivery and return immediately. Failures are logged only.
    pub fn send(&self, event: NotificationEvent) {
        let notifier = Arc::clone(&self.notifier);
        let mut pending = self.lock();
        // reap finished deliveries so a long-running heartbeat does not accumulate them
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            let kind = event.kind();
            if let Err(e) = notifier.notify(event).await {
                warn!(event = kind, error = %e, "Notification failed");
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait for every queued delivery, at most `timeout`. Leftovers are aborted.
    pub async fn flush(&self, timeout: Duration) {
        let mut pending = std::mem::take(&mut *self.lock());
        if pending.is_empty() {
            return;
        }
        let queued = pending.len();
        let drained = tokio::time::timeout(timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
        match drained {
            Ok(()) => debug!(delivered = queued, "Notifications flushed"),
            Err(_) => {
                warn!(abandoned = pending.len(), "Notifications still pending at flush timeout");
                pending.abort_all();
            }
        }
    }
}

/// Writes notifications to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        match &event {
            NotificationEvent::HeartbeatSummary { projects, pickups, health_fixes, skipped } => {
                info!(projects, pickups, health_fixes, skipped, "Heartbeat summary");
            }
            NotificationEvent::WorkerComplete { project_name, role, issue_id, result, next_state, .. } => {
                info!(project = %project_name, role = %role, issue = issue_id, result = %result, next = %next_state, "Worker complete");
            }
            NotificationEvent::Pickup { project_name, role, level, issue_id, mode, .. } => {
                info!(project = %project_name, role = %role, level = %level, issue = issue_id, mode = %mode, "Task picked up");
            }
        }
        Ok(())
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        Ok(())
    }
}
