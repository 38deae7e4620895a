use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditSink, JsonlAuditLog, NoopAudit};
use crate::config::LabelflowConfig;
use crate::dispatch::CommandDispatcher;
use crate::services::CoreServices;
use crate::state::{FileStateBackend, ProjectStateStore};
use crate::sync::GitSourceSync;
use crate::tracker::GitHubTrackers;
use crate::workflow::WorkflowConfig;

pub mod complete;
pub mod health;
pub mod heartbeat;
pub mod labels;
pub mod pickup;
pub mod register;
pub mod status;

/// What every command needs: configuration plus the global flags
pub struct CliContext {
    pub config: LabelflowConfig,
    pub workflow_path: Option<String>,
    pub json: bool,
}

impl CliContext {
    pub fn new(config: LabelflowConfig, workflow_path: Option<String>, json: bool) -> Self {
        Self {
            config,
            workflow_path,
            json,
        }
    }

    pub fn workflow(&self) -> Result<WorkflowConfig> {
        let path = self
            .workflow_path
            .as_deref()
            .or(self.config.workflow.path.as_deref());
        WorkflowConfig::load_or_default(path)
    }

    pub fn store(&self) -> Arc<ProjectStateStore> {
        Arc::new(ProjectStateStore::new(Arc::new(FileStateBackend::new(
            &self.config.state.path,
        ))))
    }

    /// One GitHub client per `owner/repo` binding, created on first use
    fn github(&self) -> Result<Arc<GitHubTrackers>> {
        let github = &self.config.github;
        let token = github
            .token
            .as_deref()
            .context("No GitHub token: set GITHUB_TOKEN or github.token in labelflow.toml")?;
        Ok(Arc::new(GitHubTrackers::new(
            token,
            Duration::from_secs(github.timeout_seconds),
        )))
    }

    fn audit(&self) -> Arc<dyn AuditSink> {
        if self.config.state.audit_log.trim().is_empty() {
            Arc::new(NoopAudit)
        } else {
            Arc::new(JsonlAuditLog::new(Path::new(&self.config.state.audit_log)))
        }
    }

    /// Full production wiring
    pub fn services(&self) -> Result<CoreServices> {
        let trackers = self.github()?;
        let dispatch = &self.config.dispatch;
        let dispatcher = CommandDispatcher::new(
            &dispatch.command,
            &dispatch.args,
            Duration::from_secs(dispatch.timeout_seconds),
        );
        let sync = GitSourceSync::new(
            &self.config.sync.remote,
            Duration::from_secs(self.config.sync.timeout_seconds),
        );

        Ok(
            CoreServices::new(self.workflow()?, self.store(), trackers, Arc::new(dispatcher))
                .with_audit(self.audit())
                .with_source_sync(Arc::new(sync))
                .with_stale_after(self.config.stale_after()),
        )
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

pub async fn show_how_to_get_work() -> Result<()> {
    println!("🏷️  labelflow - label-driven task pipeline");
    println!();
    println!("To get started:");
    println!("  📝 labelflow register <id> --repo <path> --tracker <owner/repo>");
    println!("  🏷️  labelflow labels                         # Create workflow labels");
    println!("  🚀 labelflow pickup <id>                    # Dispatch queued tasks");
    println!("  ✅ labelflow complete <id> <role> <result>  # Finish a task");
    println!();
    println!("Operations:");
    println!("  🩺 labelflow health [--fix]                 # Check worker drift");
    println!("  💓 labelflow heartbeat [--watch]            # Health + scheduling sweep");
    println!("  📊 labelflow status                         # Projects and workers");
    Ok(())
}
