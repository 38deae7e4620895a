// Health reconciler: find and repair drift between worker state and reality

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::audit::{audit, AuditEvent};
use crate::error::CoreResult;
use crate::services::CoreServices;
use crate::state::{Project, WorkerState, WorkerUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    ActiveWithoutSession,
    Zombie,
    Stale,
    OrphanedTaskRef,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindingKind::ActiveWithoutSession => "active_without_session",
            FindingKind::Zombie => "zombie",
            FindingKind::Stale => "stale",
            FindingKind::OrphanedTaskRef => "orphaned_task_ref",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub project: String,
    pub role: String,
    pub issue_id: Option<String>,
    pub message: String,
    pub fixed: bool,
}

pub struct HealthReconciler {
    services: CoreServices,
}

impl HealthReconciler {
    pub fn new(services: CoreServices) -> Self {
        Self { services }
    }

    /// Check one worker.
    ///
    /// `live_sessions` is the caller's liveness snapshot. An empty snapshot
    /// disables zombie detection instead of marking every session dead.
    pub async fn check_worker_health(
        &self,
        project_id: &str,
        role: &str,
        live_sessions: &[String],
        auto_fix: bool,
    ) -> CoreResult<Vec<HealthFinding>> {
        let project = self.services.store.get_project(project_id).await?;
        let worker = project.worker(role);
        let finding = |kind, severity, message: String| HealthFinding {
            kind,
            severity,
            project: project_id.to_string(),
            role: role.to_string(),
            issue_id: worker.issue_id.clone(),
            message,
            fixed: false,
        };
        let mut findings = Vec::new();

        if !worker.active {
            if worker.issue_id.is_some() {
                let mut f = finding(
                    FindingKind::OrphanedTaskRef,
                    Severity::Warning,
                    format!("{role} is idle but still references #{}", worker.issue_id.as_deref().unwrap_or("?")),
                );
                if auto_fix {
                    self.services
                        .store
                        .update_worker(
                            project_id,
                            role,
                            WorkerUpdate {
                                issue_id: Some(None),
                                ..Default::default()
                            },
                        )
                        .await?;
                    f.fixed = true;
                }
                findings.push(f);
            }
            return Ok(findings);
        }

        let Some(session) = worker.current_session() else {
            let mut f = finding(
                FindingKind::ActiveWithoutSession,
                Severity::Critical,
                format!(
                    "{role} is active on #{} without a session for level {}",
                    worker.issue_id.as_deref().unwrap_or("?"),
                    worker.level.as_deref().unwrap_or("none")
                ),
            );
            if auto_fix {
                self.services.store.deactivate_worker(project_id, role).await?;
                f.fixed = true;
            }
            findings.push(f);
            return Ok(findings);
        };

        if !live_sessions.is_empty() && !live_sessions.iter().any(|live| live == session) {
            let mut f = finding(
                FindingKind::Zombie,
                Severity::Critical,
                format!(
                    "{role} is active on #{} but session {session} is not alive",
                    worker.issue_id.as_deref().unwrap_or("?")
                ),
            );
            if auto_fix {
                self.revert_labels(project_id, &project, role, &worker).await;
                self.services.store.deactivate_worker(project_id, role).await?;
                // a dead session must not be reused by the next dispatch
                if let Some(level) = worker.level.clone() {
                    self.services
                        .store
                        .update_worker(
                            project_id,
                            role,
                            WorkerUpdate {
                                sessions: Some(BTreeMap::from([(level, None)])),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                f.fixed = true;
            }
            findings.push(f);
            return Ok(findings);
        }

        if let Some(started) = worker.start_time {
            let elapsed = Utc::now() - started;
            if elapsed > self.services.stale_after {
                findings.push(finding(
                    FindingKind::Stale,
                    Severity::Warning,
                    format!(
                        "{role} has been on #{} for {}h{:02}m",
                        worker.issue_id.as_deref().unwrap_or("?"),
                        elapsed.num_hours(),
                        elapsed.num_minutes() % 60
                    ),
                ));
            }
        }

        Ok(findings)
    }

    /// Put a zombie's tasks back in the queue they were taken from, or the
    /// role's entry queue for workers activated before that was recorded.
    /// Failures are logged only.
    async fn revert_labels(&self, project_id: &str, project: &Project, role: &str, worker: &WorkerState) {
        let workflow = &self.services.workflow;
        let active = match workflow.active_label(role) {
            Ok(label) => label.to_string(),
            Err(e) => {
                warn!(role = %role, error = %e, "No active label to revert from");
                return;
            }
        };
        let Some(queue) = worker.queue_label.clone().or_else(|| workflow.entry_queue(role)) else {
            warn!(role = %role, "No queue label to revert to");
            return;
        };
        let tracker = match self.services.tracker_for(project_id, project) {
            Ok(tracker) => tracker,
            Err(e) => {
                warn!(project = %project_id, error = %e, "No tracker to revert zombie labels in");
                return;
            }
        };
        for issue_id in worker.issue_ids() {
            match tracker.tasks.transition_label(issue_id, &active, &queue).await {
                Ok(()) => info!(issue = issue_id, from = %active, to = %queue, "Reverted zombie task"),
                Err(e) => warn!(issue = issue_id, error = %e, "Zombie label revert failed"),
            }
        }
    }

    /// Check every role of a project: the workflow's roles plus any stored ones
    pub async fn check_project_health(
        &self,
        project_id: &str,
        live_sessions: &[String],
        auto_fix: bool,
    ) -> CoreResult<Vec<HealthFinding>> {
        let project = self.services.store.get_project(project_id).await?;
        let mut roles: Vec<String> = self
            .services
            .workflow
            .roles()
            .into_iter()
            .map(str::to_string)
            .collect();
        for role in project.workers.keys() {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }

        let mut findings = Vec::new();
        for role in &roles {
            findings.extend(
                self.check_worker_health(project_id, role, live_sessions, auto_fix)
                    .await?,
            );
        }

        let fixed = findings.iter().filter(|f| f.fixed).count();
        if fixed > 0 {
            audit(
                &self.services.audit,
                AuditEvent::new("health_fix").project(project_id).details(json!({
                    "fixed": fixed,
                    "findings": findings.iter().map(|f| f.kind.to_string()).collect::<Vec<_>>(),
                })),
            )
            .await;
        }
        Ok(findings)
    }

    /// Every registered project; a failing project is logged and skipped
    pub async fn check_all(&self, live_sessions: &[String], auto_fix: bool) -> CoreResult<Vec<HealthFinding>> {
        let document = self.services.store.read_projects().await?;
        let mut findings = Vec::new();
        for project_id in document.projects.keys() {
            match self.check_project_health(project_id, live_sessions, auto_fix).await {
                Ok(project_findings) => findings.extend(project_findings),
                Err(e) => warn!(project = %project_id, error = %e, "Health check failed"),
            }
        }
        Ok(findings)
    }
}
