use anyhow::Result;

use super::CliContext;
use crate::completion::{CompletionPipeline, CompletionRequest};
use crate::error::CoreError;

pub struct CompleteCommand {
    pub project: String,
    pub role: String,
    pub result: String,
    pub summary: Option<String>,
    pub pr_url: Option<String>,
}

impl CompleteCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let services = ctx.services()?;
        let pipeline = CompletionPipeline::new(services.clone());
        let request = CompletionRequest {
            project_id: self.project.clone(),
            role: self.role.clone(),
            result: self.result.clone(),
            summary: self.summary.clone(),
            pr_url: self.pr_url.clone(),
        };

        let output = pipeline.execute(request).await;
        services.flush_notifications().await;
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                match &e {
                    CoreError::PartialCompletion { issue_id, .. } => {
                        println!("🚨 #{issue_id}: worker released but the label did not move");
                        println!("   → Fix the label by hand, then run 'labelflow health --fix'");
                    }
                    CoreError::InvalidCompletion { .. } | CoreError::Precondition(_) => {
                        println!("❌ {e}");
                    }
                    _ => {}
                }
                return Err(e.into());
            }
        };

        if ctx.json {
            return ctx.print_json(&output);
        }

        println!("✅ {}", output.transition);
        println!();
        println!("{}", output.announcement);
        for warning in &output.warnings {
            println!("   ⚠️  {warning}");
        }
        Ok(())
    }
}
