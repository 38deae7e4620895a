use anyhow::Result;

use super::CliContext;
use crate::health::{HealthFinding, HealthReconciler, Severity};

pub struct HealthCommand {
    pub project: Option<String>,
    pub fix: bool,
    pub live: Vec<String>,
}

impl HealthCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let reconciler = HealthReconciler::new(ctx.services()?);
        let findings = match &self.project {
            Some(project) => {
                reconciler
                    .check_project_health(project, &self.live, self.fix)
                    .await?
            }
            None => reconciler.check_all(&self.live, self.fix).await?,
        };

        if ctx.json {
            return ctx.print_json(&findings);
        }
        print_findings(&findings, self.live.is_empty());
        Ok(())
    }
}

fn print_findings(findings: &[HealthFinding], no_liveness: bool) {
    if findings.is_empty() {
        println!("💚 All workers healthy");
    }
    for finding in findings {
        let icon = match finding.severity {
            Severity::Critical => "🔴",
            Severity::Warning => "🟡",
        };
        let fixed = if finding.fixed { " (fixed)" } else { "" };
        println!(
            "{icon} {}/{} {}: {}{fixed}",
            finding.project, finding.role, finding.kind, finding.message
        );
    }
    if no_liveness {
        println!("   💡 Pass --live <sessions> to enable zombie detection");
    }
}
