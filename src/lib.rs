// labelflow - label-driven task pipeline coordination
// This exposes the core components for testing and integration

pub mod audit;
pub mod cli;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod level;
pub mod notify;
pub mod scheduler;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod tracker;
pub mod workflow;

// Re-export key types for easy access
pub use audit::{audit, AuditEvent, AuditSink, JsonlAuditLog, MemoryAudit, NoopAudit};
pub use completion::{CompletionOutput, CompletionPipeline, CompletionRequest};
pub use config::{config, LabelflowConfig};
pub use dispatch::{CommandDispatcher, DispatchError, DispatchMode, DispatchOutcome, DispatchRequest, Dispatcher};
pub use error::{CoreError, CoreResult};
pub use health::{FindingKind, HealthFinding, HealthReconciler, Severity};
pub use heartbeat::{
    EmptySessionRegistry, HeartbeatDriver, HeartbeatSettings, SessionRegistry, StaticSessionRegistry,
    SweepSummary,
};
pub use notify::{LogNotifier, NotificationEvent, NotificationQueue, Notifier, RecordingNotifier};
pub use scheduler::{Pickup, Scheduler, Skip, TickOptions, TickResult};
pub use services::CoreServices;
pub use shutdown::ShutdownCoordinator;
pub use state::{
    ActivateParams, FileStateBackend, MemoryStateBackend, Project, ProjectStateStore, RoleExecution,
    StateBackend, WorkerState, WorkerUpdate,
};
pub use sync::{GitSourceSync, NoopSync, SourceSync, SyncError, SyncOutcome};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use tracker::{
    ArtifactLocator, GitHubTracker, GitHubTrackers, InMemoryTracker, ProjectTracker, SharedTracker, Task, TaskTracker,
    TrackerCall, TrackerError, TrackerMap, TrackerResolver,
};
pub use workflow::{CompletionRule, StateType, WorkflowConfig};
