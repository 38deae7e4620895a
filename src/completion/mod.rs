// Completion pipeline: finish a role's active task.
//
// Enrichment (source sync, artifact lookup, notification) is best-effort. The
// worker is released before the label moves; a failed label write after that
// point is reported as a partial completion.

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn, Instrument};

use crate::audit::{audit, AuditEvent};
use crate::error::{CoreError, CoreResult};
use crate::notify::NotificationEvent;
use crate::services::CoreServices;
use crate::telemetry::{create_coordination_span, generate_correlation_id};
use crate::tracker::TrackerError;
use crate::workflow::{Action, CompletionRule};

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub project_id: String,
    pub role: String,
    pub result: String,
    pub summary: Option<String>,
    /// Artifact URL supplied by the worker; skips lookup when present
    pub pr_url: Option<String>,
}

impl CompletionRequest {
    pub fn new(project_id: &str, role: &str, result: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            role: role.to_string(),
            result: result.to_string(),
            ..Default::default()
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn with_pr_url(mut self, pr_url: &str) -> Self {
        self.pr_url = Some(pr_url.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutput {
    pub issue_id: u64,
    /// `"<from> → <to>"`
    pub transition: String,
    pub next_state: String,
    pub announcement: String,
    pub artifact_url: Option<String>,
    pub closed: bool,
    pub reopened: bool,
    pub warnings: Vec<String>,
}

fn result_marker(result: &str) -> &'static str {
    match result.trim().to_ascii_lowercase().as_str() {
        "done" => "✅",
        "pass" => "🎉",
        "fail" => "❌",
        "refine" => "🔄",
        "blocked" => "🚧",
        _ => "📌",
    }
}

fn build_announcement(
    role: &str,
    result: &str,
    issue_id: u64,
    summary: Option<&str>,
    task_url: &str,
    artifact_url: Option<&str>,
    next_state: &str,
) -> String {
    let mut text = format!(
        "{} {} {} #{issue_id}",
        result_marker(result),
        role.to_uppercase(),
        result.trim().to_uppercase()
    );
    if let Some(summary) = summary.map(str::trim).filter(|s| !s.is_empty()) {
        text.push_str(&format!(": {summary}"));
    }
    text.push_str(&format!("\n📋 {task_url}"));
    if let Some(url) = artifact_url {
        text.push_str(&format!("\n🔗 {url}"));
    }
    text.push_str(&format!("\n➡️  Next: {next_state}"));
    text
}

pub struct CompletionPipeline {
    services: CoreServices,
}

impl CompletionPipeline {
    pub fn new(services: CoreServices) -> Self {
        Self { services }
    }

    pub async fn execute(&self, request: CompletionRequest) -> CoreResult<CompletionOutput> {
        let correlation_id = generate_correlation_id();
        let span = create_coordination_span(
            "complete",
            Some(&request.project_id),
            Some(&request.role),
            None,
            &correlation_id,
        );
        self.execute_inner(request).instrument(span).await
    }

    fn rule_for(&self, role: &str, result: &str) -> CoreResult<CompletionRule> {
        let workflow = &self.services.workflow;
        match workflow.completion_rule(role, result)? {
            Some(rule) => Ok(rule),
            None => Err(CoreError::InvalidCompletion {
                role: role.to_string(),
                result: result.to_string(),
                reason: format!(
                    "the {} state accepts {}",
                    workflow.active_label(role)?,
                    workflow.completion_events(role)?.join(", ")
                ),
            }),
        }
    }

    async fn execute_inner(&self, request: CompletionRequest) -> CoreResult<CompletionOutput> {
        let services = &self.services;
        let project_id = request.project_id.as_str();
        let role = services.workflow.resolve_role(&request.role)?;
        let role = role.as_str();
        let rule = self.rule_for(role, &request.result)?;

        let project = services.store.get_project(project_id).await?;
        let tracker = services.tracker_for(project_id, &project)?;
        let worker = project.worker(role);
        let issue_id = match (worker.active, worker.primary_issue()) {
            (true, Some(id)) => id,
            _ => {
                return Err(CoreError::Precondition(format!(
                    "{role} in {project_id} has no active task to complete"
                )))
            }
        };

        let mut warnings = Vec::new();

        if rule.has_action(Action::GitPull) {
            if let Err(e) = services.source_sync.sync(&project.repo).await {
                warn!(repo = %project.repo, error = %e, "Source sync failed");
                warnings.push(format!("source sync failed: {e}"));
            }
        }

        let mut artifact_url = request.pr_url.clone();
        if rule.has_action(Action::DetectPr) && artifact_url.is_none() {
            match tracker.artifacts.find_artifact(issue_id).await {
                Ok(url) => artifact_url = url,
                Err(e) => {
                    warn!(issue = issue_id, error = %e, "Artifact lookup failed");
                    warnings.push(format!("artifact lookup failed: {e}"));
                }
            }
        }

        let task = tracker.tasks.get(issue_id).await?;
        if !task.has_label(&rule.from) {
            return Err(TrackerError::LabelMismatch {
                issue_id,
                expected: rule.from.clone(),
                actual: task.labels.clone(),
            }
            .into());
        }

        let next_state = services
            .workflow
            .next_state_description(role, &request.result)?
            .unwrap_or_else(|| rule.to.clone());

        services.notify(NotificationEvent::WorkerComplete {
            project_id: project_id.to_string(),
            project_name: project.name.clone(),
            channel: project.channel.clone(),
            role: role.to_string(),
            issue_id,
            result: request.result.clone(),
            summary: request.summary.clone(),
            next_state: next_state.clone(),
        });

        services.store.deactivate_worker(project_id, role).await?;

        if let Err(source) = tracker
            .tasks
            .transition_label(issue_id, &rule.from, &rule.to)
            .await
        {
            warn!(issue = issue_id, role = %role, error = %source, "Label transition failed after deactivation");
            audit(
                &services.audit,
                AuditEvent::new("work_finish_partial")
                    .project(project_id)
                    .role(role)
                    .issue(issue_id)
                    .details(json!({"from": rule.from, "to": rule.to, "error": source.to_string()})),
            )
            .await;
            return Err(CoreError::PartialCompletion {
                issue_id,
                role: role.to_string(),
                source,
            });
        }

        let mut closed = false;
        let mut reopened = false;
        if rule.has_action(Action::CloseIssue) {
            match tracker.tasks.close(issue_id).await {
                Ok(()) => closed = true,
                Err(e) => warnings.push(format!("could not close #{issue_id}: {e}")),
            }
        }
        if rule.has_action(Action::ReopenIssue) {
            match tracker.tasks.reopen(issue_id).await {
                Ok(()) => reopened = true,
                Err(e) => warnings.push(format!("could not reopen #{issue_id}: {e}")),
            }
        }

        let announcement = build_announcement(
            role,
            &request.result,
            issue_id,
            request.summary.as_deref(),
            &task.url,
            artifact_url.as_deref(),
            &next_state,
        );
        let transition = format!("{} → {}", rule.from, rule.to);

        info!(
            project = %project_id,
            role = %role,
            issue = issue_id,
            transition = %transition,
            warnings = warnings.len(),
            "Task completed"
        );
        audit(
            &services.audit,
            AuditEvent::new("work_finish")
                .project(project_id)
                .role(role)
                .issue(issue_id)
                .details(json!({
                    "result": request.result,
                    "from": rule.from,
                    "to": rule.to,
                    "artifactUrl": artifact_url,
                    "summary": request.summary,
                })),
        )
        .await;

        Ok(CompletionOutput {
            issue_id,
            transition,
            next_state,
            announcement,
            artifact_url,
            closed,
            reopened,
            warnings,
        })
    }
}
