// Heartbeat: reconcile, then schedule, across every project

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use crate::audit::{audit, AuditEvent};
use crate::error::CoreResult;
use crate::health::HealthReconciler;
use crate::notify::NotificationEvent;
use crate::scheduler::{Pickup, Scheduler, TickOptions};
use crate::services::CoreServices;
use crate::state::RoleExecution;
use crate::telemetry::{create_coordination_span, generate_correlation_id};

/// Source of the live-session snapshot used for zombie detection
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn live_sessions(&self) -> anyhow::Result<Vec<String>>;
}

/// No liveness information; zombie detection stays off
pub struct EmptySessionRegistry;

#[async_trait]
impl SessionRegistry for EmptySessionRegistry {
    async fn live_sessions(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Fixed snapshot, e.g. passed on the command line
pub struct StaticSessionRegistry {
    sessions: Vec<String>,
}

impl StaticSessionRegistry {
    pub fn new(sessions: Vec<String>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl SessionRegistry for StaticSessionRegistry {
    async fn live_sessions(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.sessions.clone())
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub max_pickups_per_cycle: usize,
    /// `sequential` allows at most one active project at a time
    pub project_execution: RoleExecution,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_pickups_per_cycle: 4,
            project_execution: RoleExecution::Parallel,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPickup {
    pub project_id: String,
    #[serde(flatten)]
    pub pickup: Pickup,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub projects: usize,
    pub active_projects_before: usize,
    pub active_roles_before: usize,
    pub health_findings: usize,
    pub health_fixes: usize,
    pub pickups: Vec<ProjectPickup>,
    pub skipped: usize,
    pub errors: Vec<String>,
}

pub struct HeartbeatDriver {
    services: CoreServices,
    scheduler: Scheduler,
    health: HealthReconciler,
    sessions: Arc<dyn SessionRegistry>,
    settings: HeartbeatSettings,
}

impl HeartbeatDriver {
    pub fn new(
        services: CoreServices,
        sessions: Arc<dyn SessionRegistry>,
        settings: HeartbeatSettings,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(services.clone()),
            health: HealthReconciler::new(services.clone()),
            services,
            sessions,
            settings,
        }
    }

    pub fn settings(&self) -> &HeartbeatSettings {
        &self.settings
    }

    pub async fn run_sweep(&self) -> CoreResult<SweepSummary> {
        let correlation_id = generate_correlation_id();
        let span = create_coordination_span("heartbeat", None, None, None, &correlation_id);
        self.sweep_inner().instrument(span).await
    }

    async fn sweep_inner(&self) -> CoreResult<SweepSummary> {
        let mut summary = SweepSummary::default();

        let live = match self.sessions.live_sessions().await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "Live-session snapshot unavailable, zombie detection off");
                Vec::new()
            }
        };

        let project_ids: Vec<String> = self
            .services
            .store
            .read_projects()
            .await?
            .projects
            .into_keys()
            .collect();
        summary.projects = project_ids.len();

        for project_id in &project_ids {
            match self.health.check_project_health(project_id, &live, true).await {
                Ok(findings) => {
                    summary.health_findings += findings.len();
                    summary.health_fixes += findings.iter().filter(|f| f.fixed).count();
                }
                Err(e) => {
                    warn!(project = %project_id, error = %e, "Health pass failed");
                    summary.errors.push(format!("{project_id}: health: {e}"));
                }
            }
        }

        let snapshot = self.services.store.read_projects().await?;
        let active_projects: BTreeSet<&str> = snapshot
            .projects
            .iter()
            .filter(|(_, project)| project.is_active())
            .map(|(id, _)| id.as_str())
            .collect();
        summary.active_projects_before = active_projects.len();
        summary.active_roles_before = snapshot
            .projects
            .values()
            .map(|project| project.active_roles().len())
            .sum();

        let sequential = self.settings.project_execution == RoleExecution::Sequential;
        let mut remaining = self.settings.max_pickups_per_cycle;
        let mut newly_activated: Option<&str> = None;

        for project_id in &project_ids {
            if remaining == 0 {
                summary.skipped += 1;
                continue;
            }
            if sequential {
                let blocked = if active_projects.is_empty() {
                    newly_activated.is_some_and(|id| id != project_id.as_str())
                } else {
                    !active_projects.contains(project_id.as_str())
                };
                if blocked {
                    summary.skipped += 1;
                    continue;
                }
            }

            let options = TickOptions {
                role: None,
                max_pickups: Some(remaining),
            };
            match self.scheduler.tick(project_id, options).await {
                Ok(result) => {
                    remaining = remaining.saturating_sub(result.pickups.len());
                    summary.skipped += result.skipped.len();
                    if !result.pickups.is_empty() && newly_activated.is_none() && active_projects.is_empty() {
                        newly_activated = Some(project_id.as_str());
                    }
                    summary
                        .pickups
                        .extend(result.pickups.into_iter().map(|pickup| ProjectPickup {
                            project_id: project_id.clone(),
                            pickup,
                        }));
                }
                Err(e) => {
                    warn!(project = %project_id, error = %e, "Tick failed");
                    summary.errors.push(format!("{project_id}: tick: {e}"));
                }
            }
        }

        info!(
            projects = summary.projects,
            pickups = summary.pickups.len(),
            health_fixes = summary.health_fixes,
            errors = summary.errors.len(),
            "Heartbeat sweep finished"
        );
        self.services.notify(NotificationEvent::HeartbeatSummary {
            projects: summary.projects,
            pickups: summary.pickups.len(),
            health_fixes: summary.health_fixes,
            skipped: summary.skipped,
        });
        audit(
            &self.services.audit,
            AuditEvent::new("heartbeat").details(json!({
                "projects": summary.projects,
                "pickups": summary.pickups.len(),
                "healthFindings": summary.health_findings,
                "healthFixes": summary.health_fixes,
                "skipped": summary.skipped,
                "errors": summary.errors,
            })),
        )
        .await;

        Ok(summary)
    }

    /// Sweep on every interval tick until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            max_pickups = self.settings.max_pickups_per_cycle,
            "Heartbeat loop started"
        );
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_sweep().await {
                        error!(error = %e, "Heartbeat sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.services.flush_notifications().await;
        info!("Heartbeat loop stopped");
    }
}
