// Wiring shared by the scheduler, completion pipeline, reconciler and heartbeat

use chrono::Duration;
use std::sync::Arc;

use crate::audit::{AuditSink, NoopAudit};
use crate::dispatch::Dispatcher;
use crate::error::CoreResult;
use crate::notify::{LogNotifier, NotificationEvent, NotificationQueue, Notifier};
use crate::state::{Project, ProjectStateStore};
use crate::sync::{NoopSync, SourceSync};
use crate::tracker::{ProjectTracker, TrackerResolver};
use crate::workflow::WorkflowConfig;

pub const DEFAULT_STALE_AFTER_HOURS: i64 = 2;

/// Every capability the core operations consume
#[derive(Clone)]
pub struct CoreServices {
    pub workflow: Arc<WorkflowConfig>,
    pub store: Arc<ProjectStateStore>,
    /// Per-project task trackers
    pub trackers: Arc<dyn TrackerResolver>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub notifications: NotificationQueue,
    pub audit: Arc<dyn AuditSink>,
    pub source_sync: Arc<dyn SourceSync>,
    /// Active longer than this is reported as stale
    pub stale_after: Duration,
}

impl CoreServices {
    pub fn new(
        workflow: WorkflowConfig,
        store: Arc<ProjectStateStore>,
        trackers: Arc<dyn TrackerResolver>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            workflow: Arc::new(workflow),
            store,
            trackers,
            dispatcher,
            notifications: NotificationQueue::new(Arc::new(LogNotifier)),
            audit: Arc::new(NoopAudit),
            source_sync: Arc::new(NoopSync),
            stale_after: Duration::hours(DEFAULT_STALE_AFTER_HOURS),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifications = NotificationQueue::new(notifier);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_source_sync(mut self, source_sync: Arc<dyn SourceSync>) -> Self {
        self.source_sync = source_sync;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn tracker_for(&self, project_id: &str, project: &Project) -> CoreResult<ProjectTracker> {
        Ok(self.trackers.resolve(project_id, project)?)
    }

    pub fn notify(&self, event: NotificationEvent) {
        self.notifications.send(event);
    }

    /// Wait for background notifications; one-shot commands call this before exiting
    pub async fn flush_notifications(&self) {
        self.notifications.flush(crate::notify::FLUSH_TIMEOUT).await;
    }
}
