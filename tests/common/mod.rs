// Shared fixtures for the integration suites
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use labelflow::{
    CoreServices, DispatchError, DispatchOutcome, DispatchRequest, Dispatcher, InMemoryTracker,
    MemoryAudit, MemoryStateBackend, Project, ProjectStateStore, ProjectTracker, RecordingNotifier,
    TrackerMap, WorkflowConfig,
};

/// Dispatcher that accepts every request and remembers it
#[derive(Default)]
pub struct FakeDispatcher {
    requests: Mutex<Vec<DispatchRequest>>,
    fail_with: Mutex<Option<String>>,
}

impl FakeDispatcher {
    pub fn failing(message: &str) -> Self {
        let dispatcher = Self::default();
        *dispatcher.fail_with.lock().unwrap() = Some(message.to_string());
        dispatcher
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(DispatchError::Failed(message));
        }
        let outcome = DispatchOutcome {
            action: request.mode,
            session_ref: request
                .session_ref
                .clone()
                .unwrap_or_else(|| format!("session-{}-{}", request.role, request.level)),
            announcement: format!("{} picks up #{}", request.role, request.issue_id),
        };
        self.requests.lock().unwrap().push(request);
        Ok(outcome)
    }
}

/// Core services over in-memory backends. Each registered project is bound
/// to a tracker of its own.
pub struct Harness {
    pub services: CoreServices,
    pub store: Arc<ProjectStateStore>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<MemoryAudit>,
    bindings: Arc<TrackerMap>,
    trackers: Mutex<BTreeMap<String, Arc<InMemoryTracker>>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_dispatcher(WorkflowConfig::default(), FakeDispatcher::default()).await
    }

    pub async fn with_dispatcher(workflow: WorkflowConfig, dispatcher: FakeDispatcher) -> Self {
        let bindings = Arc::new(TrackerMap::new());
        let store = Arc::new(ProjectStateStore::new(Arc::new(MemoryStateBackend::new())));
        let dispatcher = Arc::new(dispatcher);
        let notifier = Arc::new(RecordingNotifier::new());
        let audit = Arc::new(MemoryAudit::new());
        let services = CoreServices::new(workflow, store.clone(), bindings.clone(), dispatcher.clone())
            .with_notifier(notifier.clone())
            .with_audit(audit.clone());
        Self {
            services,
            store,
            dispatcher,
            notifier,
            audit,
            bindings,
            trackers: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn register(&self, id: &str, name: &str) -> Project {
        let tracker = Arc::new(InMemoryTracker::new());
        self.bindings
            .bind(id, ProjectTracker::new(tracker.clone()).with_artifacts(tracker.clone()));
        self.trackers.lock().unwrap().insert(id.to_string(), tracker);
        self.store
            .register_project(
                id,
                Project::new(name, &format!("/src/{name}")).with_tracker(format!("local/{id}")),
            )
            .await
            .unwrap()
    }

    /// Tracker bound to a registered project
    pub fn tracker(&self, project_id: &str) -> Arc<InMemoryTracker> {
        self.trackers.lock().unwrap()[project_id].clone()
    }

    /// Wait for queued notifications to be delivered
    pub async fn flush(&self) {
        self.services.flush_notifications().await;
    }
}
