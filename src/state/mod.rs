// Persisted per-project worker state

pub mod backend;
pub mod migration;
pub mod store;
pub mod types;

pub use backend::{FileStateBackend, MemoryStateBackend, StateBackend, StorageError};
pub use migration::{canonical_level, canonical_role, migrate_document};
pub use store::ProjectStateStore;
pub use types::{
    ActivateParams, Project, ProjectsDocument, RoleExecution, WorkerState, WorkerUpdate,
};
