use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::heartbeat::HeartbeatSettings;
use crate::state::RoleExecution;

/// Main configuration structure for labelflow
///
/// Every section falls back to its defaults, so partial files and
/// environment overrides only need the keys they change.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelflowConfig {
    pub github: GitHubConfig,
    pub state: StateConfig,
    pub workflow: WorkflowFileConfig,
    pub dispatch: DispatchConfig,
    pub sync: SyncConfig,
    pub heartbeat: HeartbeatConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token (can be set via env var)
    pub token: Option<String>,
    /// Repository bound to newly registered projects unless `--tracker` is given
    pub owner: String,
    pub repo: String,
    /// Per-request timeout
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None, // Will be read from env var or .labelflow-rc
            owner: String::new(),
            repo: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl GitHubConfig {
    /// `owner/repo` when both halves are configured
    pub fn default_tracker(&self) -> Option<String> {
        (!self.owner.is_empty() && !self.repo.is_empty()).then(|| format!("{}/{}", self.owner, self.repo))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Persisted projects document
    pub path: String,
    /// Append-only audit log; empty disables auditing
    pub audit_log: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: ".labelflow/projects.json".to_string(),
            audit_log: ".labelflow/audit.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowFileConfig {
    /// TOML or JSON workflow graph; the built-in pipeline when unset
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Program that receives a dispatch request as JSON on stdin
    pub command: String,
    pub args: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command: "labelflow-dispatch".to_string(),
            args: Vec::new(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub remote: String,
    pub timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_seconds: u64,
    pub max_pickups_per_cycle: usize,
    /// `sequential` keeps at most one project active at a time
    pub project_execution: RoleExecution,
    /// Active workers older than this are reported as stale
    pub stale_after_minutes: i64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300, // 5 minutes
            max_pickups_per_cycle: 4,
            project_execution: RoleExecution::Parallel,
            stale_after_minutes: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl LabelflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (labelflow.toml, .labelflow-rc)
    /// 3. Environment variables (prefixed with LABELFLOW_, sections split by `__`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_file = dir.join("labelflow.toml");
        if toml_file.exists() {
            builder = builder.add_source(File::from(toml_file).format(FileFormat::Toml));
        }

        let rc_file = dir.join(".labelflow-rc");
        if rc_file.exists() {
            builder = builder.add_source(File::from(rc_file).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("LABELFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: LabelflowConfig = builder.build()?.try_deserialize()?;

        // Special handling for GitHub token - check multiple sources
        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        HeartbeatSettings {
            interval: Duration::from_secs(self.heartbeat.interval_seconds.max(1)),
            max_pickups_per_cycle: self.heartbeat.max_pickups_per_cycle,
            project_execution: self.heartbeat.project_execution,
        }
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.heartbeat.stale_after_minutes)
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<LabelflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = LabelflowConfig::load_env_file();
        LabelflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static LabelflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
