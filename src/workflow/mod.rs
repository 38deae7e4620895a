// Declarative workflow graph and the pure rules derived from it

pub mod defaults;
pub mod engine;
pub mod types;

pub use defaults::{DEVELOPER, TESTER};
pub use engine::result_event;
pub use types::{
    Action, CompletionRule, RoleConfig, StateConfig, StateTable, StateType, TransitionTarget,
    WorkflowConfig,
};

use anyhow::{Context, Result};
use std::path::Path;

impl WorkflowConfig {
    /// Load a workflow from a `.json` or `.toml` file and validate it.
    ///
    /// The file is parsed directly with serde so state declaration order survives.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

        let workflow: WorkflowConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .with_context(|| format!("Invalid workflow JSON in {}", path.display()))?,
            _ => toml::from_str(&raw)
                .with_context(|| format!("Invalid workflow TOML in {}", path.display()))?,
        };

        workflow.validate()?;
        tracing::info!(
            path = %path.display(),
            states = workflow.states.len(),
            roles = ?workflow.roles(),
            "Workflow loaded"
        );
        Ok(workflow)
    }

    /// Load from `path` when given, otherwise fall back to the built-in pipeline
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
