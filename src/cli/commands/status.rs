use anyhow::Result;
use chrono::Utc;

use super::CliContext;
use crate::state::{Project, WorkerState};

pub struct StatusCommand {
    pub project: Option<String>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let store = ctx.store();
        let workflow = ctx.workflow()?;
        let mut document = store.read_projects().await?;
        if let Some(id) = &self.project {
            document.projects.retain(|project_id, _| project_id == id);
            if document.projects.is_empty() {
                anyhow::bail!("Project \"{id}\" is not registered");
            }
        }

        if ctx.json {
            return ctx.print_json(&document);
        }

        if document.projects.is_empty() {
            println!("📭 No projects registered");
            println!("   💡 labelflow register <id> --repo <path>");
            return Ok(());
        }

        println!("📊 LABELFLOW STATUS");
        println!("==================");
        for (id, project) in &document.projects {
            print_project(id, project, &workflow.roles());
        }
        Ok(())
    }
}

fn print_project(id: &str, project: &Project, roles: &[&str]) {
    println!();
    println!("📁 {} ({id}) - {}", project.name, project.role_execution);
    println!("   📂 {}", project.repo);
    if let Some(channel) = &project.channel {
        println!("   💬 {channel}");
    }
    println!("   🐙 {}", project.tracker.as_deref().unwrap_or("no tracker bound"));

    let mut names: Vec<&str> = roles.to_vec();
    for role in project.workers.keys() {
        if !names.contains(&role.as_str()) {
            names.push(role);
        }
    }
    for role in names {
        println!("   {}", describe_worker(role, &project.worker(role)));
    }
}

fn describe_worker(role: &str, worker: &WorkerState) -> String {
    if !worker.active {
        return format!("💤 {role}: idle");
    }
    let since = worker
        .start_time
        .map(|start| {
            let minutes = (Utc::now() - start).num_minutes();
            format!(" for {}h{:02}m", minutes / 60, minutes % 60)
        })
        .unwrap_or_default();
    format!(
        "🔨 {role}: #{} at {}{since}",
        worker.issue_id.as_deref().unwrap_or("?"),
        worker.level.as_deref().unwrap_or("unknown level")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn describes_active_and_idle_workers() {
        assert_eq!(describe_worker("tester", &WorkerState::default()), "💤 tester: idle");

        let worker = WorkerState {
            active: true,
            issue_id: Some("42".to_string()),
            start_time: Some(Utc::now() - Duration::minutes(75)),
            level: Some("senior".to_string()),
            ..Default::default()
        };
        let line = describe_worker("developer", &worker);
        assert!(line.starts_with("🔨 developer: #42 at senior for 1h1"));
    }
}
