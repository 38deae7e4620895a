use anyhow::Result;

use super::CliContext;
use crate::audit::{audit, AuditEvent};
use crate::state::{Project, RoleExecution};
use crate::tracker::github::parse_binding;
use serde_json::json;

pub struct RegisterCommand {
    pub id: String,
    pub name: Option<String>,
    pub repo: String,
    pub channel: Option<String>,
    pub role_execution: RoleExecution,
    /// `owner/repo`; the configured repository when omitted
    pub tracker: Option<String>,
}

impl RegisterCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let mut project = Project::new(self.name.as_deref().unwrap_or(&self.id), &self.repo);
        project.channel = self.channel.clone();
        project.role_execution = self.role_execution;
        project.tracker = match self.tracker.clone().or_else(|| ctx.config.github.default_tracker()) {
            Some(binding) => {
                let (owner, repo) = parse_binding(&binding)?;
                Some(format!("{owner}/{repo}"))
            }
            None => None,
        };

        let project = ctx.store().register_project(&self.id, project).await?;
        audit(
            &ctx.audit(),
            AuditEvent::new("project_register")
                .project(&self.id)
                .details(json!({
                    "repo": project.repo,
                    "roleExecution": project.role_execution,
                    "tracker": project.tracker,
                })),
        )
        .await;

        if ctx.json {
            return ctx.print_json(&project);
        }
        println!("📝 Registered {} ({})", project.name, self.id);
        println!("   📂 {}", project.repo);
        println!("   ⚙️  Roles run {}", project.role_execution);
        match &project.tracker {
            Some(tracker) => println!("   🐙 Tasks from {tracker}"),
            None => println!("   ⚠️  No tracker bound; pass --tracker <owner/repo>"),
        }
        Ok(())
    }
}
