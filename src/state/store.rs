use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::backend::{StateBackend, StorageError};
use super::migration::migrate_document;
use super::types::{ActivateParams, Project, ProjectsDocument, WorkerState, WorkerUpdate};
use crate::error::{CoreError, CoreResult};

/// Read-modify-write access to per-project worker state.
///
/// Every mutation re-reads the document right before writing it back. The
/// async mutex only orders writers inside this process.
pub struct ProjectStateStore {
    backend: Arc<dyn StateBackend>,
    write_lock: Mutex<()>,
}

impl ProjectStateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StateBackend> {
        &self.backend
    }

    /// Load the full document in canonical shape
    pub async fn read_projects(&self) -> CoreResult<ProjectsDocument> {
        let Some(mut raw) = self.backend.read_document().await? else {
            return Ok(ProjectsDocument::default());
        };
        if migrate_document(&mut raw) {
            debug!(backend = %self.backend.describe(), "Migrated legacy state document on read");
        }
        serde_json::from_value(raw).map_err(|e| StorageError::from(e).into())
    }

    pub async fn get_project(&self, project_id: &str) -> CoreResult<Project> {
        self.read_projects()
            .await?
            .projects
            .remove(project_id)
            .ok_or_else(|| CoreError::NotFound(format!("project \"{project_id}\"")))
    }

    /// Worker state for `role`; a role that was never used reads as zero-valued
    pub async fn get_worker(&self, project_id: &str, role: &str) -> CoreResult<WorkerState> {
        Ok(self.get_project(project_id).await?.worker(role))
    }

    async fn mutate<T, F>(&self, change: F) -> CoreResult<T>
    where
        F: FnOnce(&mut ProjectsDocument) -> CoreResult<T>,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_projects().await?;
        let output = change(&mut document)?;
        let raw = serde_json::to_value(&document).map_err(StorageError::from)?;
        self.backend.write_document(&raw).await?;
        Ok(output)
    }

    pub async fn update_worker(
        &self,
        project_id: &str,
        role: &str,
        update: WorkerUpdate,
    ) -> CoreResult<WorkerState> {
        self.mutate(|document| {
            let project = document
                .projects
                .get_mut(project_id)
                .ok_or_else(|| CoreError::NotFound(format!("project \"{project_id}\"")))?;
            let worker = project.workers.entry(role.to_string()).or_default();
            update.apply(worker);
            Ok(worker.clone())
        })
        .await
    }

    pub async fn activate_worker(
        &self,
        project_id: &str,
        role: &str,
        params: ActivateParams,
    ) -> CoreResult<WorkerState> {
        if params.issue_id.trim().is_empty() {
            return Err(CoreError::Precondition(format!(
                "cannot activate {role} in {project_id} without an issue id"
            )));
        }

        let sessions = params
            .session_ref
            .map(|session| BTreeMap::from([(params.level.clone(), Some(session))]));
        let update = WorkerUpdate {
            active: Some(true),
            issue_id: Some(Some(params.issue_id.clone())),
            start_time: Some(Some(params.start_time.unwrap_or_else(Utc::now))),
            level: Some(Some(params.level.clone())),
            sessions,
            queue_label: Some(params.queue_label.clone()),
        };

        let worker = self.update_worker(project_id, role, update).await?;
        info!(
            project = %project_id,
            role = %role,
            issue = %params.issue_id,
            level = %params.level,
            "Worker activated"
        );
        Ok(worker)
    }

    /// Release the slot. `sessions` and `level` stay for reuse.
    pub async fn deactivate_worker(&self, project_id: &str, role: &str) -> CoreResult<WorkerState> {
        let update = WorkerUpdate {
            active: Some(false),
            issue_id: Some(None),
            start_time: Some(None),
            queue_label: Some(None),
            ..Default::default()
        };
        let worker = self.update_worker(project_id, role, update).await?;
        info!(project = %project_id, role = %role, "Worker deactivated");
        Ok(worker)
    }

    /// Add or refresh a project. Worker state of an existing entry is kept.
    pub async fn register_project(&self, project_id: &str, project: Project) -> CoreResult<Project> {
        self.mutate(|document| {
            let entry = document
                .projects
                .entry(project_id.to_string())
                .or_insert_with(|| project.clone());
            entry.name = project.name;
            entry.repo = project.repo;
            entry.channel = project.channel;
            entry.role_execution = project.role_execution;
            if project.tracker.is_some() {
                entry.tracker = project.tracker;
            }
            for (role, worker) in project.workers {
                entry.workers.entry(role).or_insert(worker);
            }
            Ok(entry.clone())
        })
        .await
    }
}
