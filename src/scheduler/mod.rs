// Per-project tick: fill idle worker slots from the role queues

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn, Instrument};

use crate::audit::{audit, AuditEvent};
use crate::dispatch::{build_task_message, DispatchMode, DispatchRequest};
use crate::error::CoreResult;
use crate::level::resolve_level;
use crate::notify::NotificationEvent;
use crate::services::CoreServices;
use crate::state::{ActivateParams, Project, RoleExecution};
use crate::telemetry::{create_coordination_span, generate_correlation_id};
use crate::tracker::{ProjectTracker, Task};

#[derive(Debug, Clone, Default)]
pub struct TickOptions {
    /// Only try this role (legacy aliases accepted)
    pub role: Option<String>,
    /// Stop after this many pickups
    pub max_pickups: Option<usize>,
}

impl TickOptions {
    pub fn for_role(role: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            ..Default::default()
        }
    }

    pub fn with_budget(mut self, max_pickups: usize) -> Self {
        self.max_pickups = Some(max_pickups);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pickup {
    pub role: String,
    pub level: String,
    pub issue_id: u64,
    pub issue_title: String,
    pub from_label: String,
    pub to_label: String,
    pub mode: DispatchMode,
    pub session_ref: String,
    pub announcement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub role: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickResult {
    pub pickups: Vec<Pickup>,
    pub skipped: Vec<Skip>,
}

impl TickResult {
    fn skip(&mut self, role: &str, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(role = %role, reason = %reason, "Role skipped");
        self.skipped.push(Skip {
            role: role.to_string(),
            reason,
        });
    }

    pub fn skip_reason(&self, role: &str) -> Option<&str> {
        self.skipped
            .iter()
            .find(|skip| skip.role == role)
            .map(|skip| skip.reason.as_str())
    }
}

enum Attempt {
    Picked(Pickup),
    DispatchFailed(String),
}

pub struct Scheduler {
    services: CoreServices,
}

impl Scheduler {
    pub fn new(services: CoreServices) -> Self {
        Self { services }
    }

    /// One scheduling pass over a project's queues.
    ///
    /// Roles are tried one after another. State is re-read before each role so
    /// the budget and the sequential policy see the effect of earlier pickups.
    pub async fn tick(&self, project_id: &str, options: TickOptions) -> CoreResult<TickResult> {
        let correlation_id = generate_correlation_id();
        let span = create_coordination_span("tick", Some(project_id), options.role.as_deref(), None, &correlation_id);
        self.tick_inner(project_id, options).instrument(span).await
    }

    async fn tick_inner(&self, project_id: &str, options: TickOptions) -> CoreResult<TickResult> {
        let workflow = &self.services.workflow;
        let roles: Vec<String> = match options.role.as_deref() {
            Some(role) => vec![workflow.resolve_role(role)?],
            None => workflow.roles().into_iter().map(str::to_string).collect(),
        };
        // unknown or unbound project fails before anything else
        let project = self.services.store.get_project(project_id).await?;
        let tracker = self.services.tracker_for(project_id, &project)?;

        let mut result = TickResult::default();
        for role in &roles {
            if options
                .max_pickups
                .is_some_and(|max| result.pickups.len() >= max)
            {
                result.skip(role, "budget");
                continue;
            }

            let project = self.services.store.get_project(project_id).await?;
            let worker = project.worker(role);
            if worker.active {
                let issue = worker.issue_id.as_deref().unwrap_or("?");
                result.skip(role, format!("already active (#{issue})"));
                continue;
            }
            if project.role_execution == RoleExecution::Sequential
                && project.active_roles().iter().any(|other| other != role)
            {
                result.skip(role, "sequential: other role active");
                continue;
            }

            let Some((queue_label, task)) = self.next_task(&tracker, role).await? else {
                result.skip(role, "no tasks queued");
                continue;
            };

            match self
                .pick_up(&tracker, project_id, &project, role, &queue_label, task)
                .await?
            {
                Attempt::Picked(pickup) => result.pickups.push(pickup),
                Attempt::DispatchFailed(reason) => result.skip(role, format!("dispatch failed: {reason}")),
            }
        }

        info!(
            project = %project_id,
            pickups = result.pickups.len(),
            skipped = result.skipped.len(),
            "Tick finished"
        );
        Ok(result)
    }

    /// Oldest task in the highest-priority queue that has any
    async fn next_task(&self, tracker: &ProjectTracker, role: &str) -> CoreResult<Option<(String, Task)>> {
        for label in self.services.workflow.queue_labels(role) {
            let tasks = tracker.tasks.list_by_label(&label).await?;
            if let Some(task) = tasks.into_iter().next() {
                return Ok(Some((label, task)));
            }
        }
        Ok(None)
    }

    async fn pick_up(
        &self,
        tracker: &ProjectTracker,
        project_id: &str,
        project: &Project,
        role: &str,
        queue_label: &str,
        task: Task,
    ) -> CoreResult<Attempt> {
        let services = &self.services;
        let active_label = services.workflow.active_label(role)?.to_string();
        let level = resolve_level(&services.workflow, role, &task.labels, &task.title, &task.description);
        let worker = project.worker(role);
        let existing_session = worker.session_for(&level).map(str::to_string);
        let mode = if existing_session.is_some() {
            DispatchMode::Send
        } else {
            DispatchMode::Spawn
        };

        let comments = match tracker.tasks.list_comments(task.id).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(issue = task.id, error = %e, "Could not load comments, dispatching without them");
                Vec::new()
            }
        };

        let request = DispatchRequest {
            project_id: project_id.to_string(),
            project_name: project.name.clone(),
            repo: project.repo.clone(),
            channel: project.channel.clone(),
            role: role.to_string(),
            level: level.clone(),
            issue_id: task.id,
            issue_title: task.title.clone(),
            issue_url: task.url.clone(),
            message: build_task_message(&project.name, role, &task, &comments),
            from_label: queue_label.to_string(),
            to_label: active_label.clone(),
            mode,
            session_ref: existing_session,
        };

        let outcome = match services.dispatcher.dispatch(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(project = %project_id, role = %role, issue = task.id, error = %e, "Dispatch failed");
                return Ok(Attempt::DispatchFailed(e.to_string()));
            }
        };

        // the worker exists now; failures from here on are hard errors
        tracker
            .tasks
            .transition_label(task.id, queue_label, &active_label)
            .await?;
        services
            .store
            .activate_worker(
                project_id,
                role,
                ActivateParams::new(task.id.to_string(), level.clone())
                    .with_session(outcome.session_ref.clone())
                    .from_queue(queue_label),
            )
            .await?;

        info!(
            project = %project_id,
            role = %role,
            level = %level,
            issue = task.id,
            mode = %outcome.action,
            "Task picked up"
        );

        services.notify(NotificationEvent::Pickup {
            project_id: project_id.to_string(),
            project_name: project.name.clone(),
            channel: project.channel.clone(),
            role: role.to_string(),
            level: level.clone(),
            issue_id: task.id,
            issue_title: task.title.clone(),
            mode: outcome.action.to_string(),
        });
        audit(
            &services.audit,
            AuditEvent::new("work_start")
                .project(project_id)
                .role(role)
                .issue(task.id)
                .details(json!({
                    "level": level,
                    "mode": outcome.action,
                    "from": queue_label,
                    "to": active_label,
                    "sessionRef": outcome.session_ref,
                })),
        )
        .await;

        Ok(Attempt::Picked(Pickup {
            role: role.to_string(),
            level,
            issue_id: task.id,
            issue_title: task.title,
            from_label: queue_label.to_string(),
            to_label: active_label,
            mode: outcome.action,
            session_ref: outcome.session_ref,
            announcement: outcome.announcement,
        }))
    }
}
