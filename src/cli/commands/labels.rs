use anyhow::Result;
use serde::Serialize;

use super::CliContext;

pub struct LabelsCommand {
    /// Only this project's tracker; every registered project when unset
    pub project: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionedLabels {
    project_id: String,
    tracker: Option<String>,
    created: Vec<String>,
}

impl LabelsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let workflow = ctx.workflow()?;
        let labels: Vec<String> = workflow.all_labels().into_iter().map(str::to_string).collect();

        if self.dry_run {
            if ctx.json {
                return ctx.print_json(&labels);
            }
            println!("🏷️  Workflow labels:");
            for label in &labels {
                println!("   • {label}");
            }
            return Ok(());
        }

        let services = ctx.services()?;
        let mut document = services.store.read_projects().await?;
        if let Some(id) = &self.project {
            document.projects.retain(|project_id, _| project_id == id);
            if document.projects.is_empty() {
                anyhow::bail!("Project \"{id}\" is not registered");
            }
        }
        if document.projects.is_empty() {
            anyhow::bail!("No projects registered; run 'labelflow register' first");
        }

        let mut provisioned = Vec::new();
        for (project_id, project) in &document.projects {
            let tracker = services.tracker_for(project_id, project)?;
            let created = tracker.tasks.ensure_labels(&labels).await?;
            provisioned.push(ProvisionedLabels {
                project_id: project_id.clone(),
                tracker: project.tracker.clone(),
                created,
            });
        }

        if ctx.json {
            return ctx.print_json(&provisioned);
        }
        for entry in &provisioned {
            let tracker = entry.tracker.as_deref().unwrap_or("?");
            if entry.created.is_empty() {
                println!("✅ {} ({tracker}): all {} workflow labels already exist", entry.project_id, labels.len());
            } else {
                println!(
                    "🏷️  {} ({tracker}): created {} labels: {}",
                    entry.project_id,
                    entry.created.len(),
                    entry.created.join(", ")
                );
            }
        }
        Ok(())
    }
}
