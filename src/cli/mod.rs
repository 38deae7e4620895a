use clap::{Parser, Subcommand};

use crate::state::RoleExecution;

pub mod commands;

#[derive(Parser)]
#[command(name = "labelflow")]
#[command(about = "Label-driven task pipeline coordinator")]
#[command(long_about = "labelflow moves tracker issues through a declarative workflow of labels, \
                       dispatching each queued task to a worker session and writing every state change \
                       back to the tracker. Start with 'labelflow register' and 'labelflow labels'.")]
pub struct Cli {
    /// Workflow file overriding the configured one
    #[arg(long, global = true, help = "Path to a TOML or JSON workflow definition")]
    pub workflow: Option<String>,

    /// Print machine-readable JSON instead of the human summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pick up the next queued task for each idle role of a project
    Pickup {
        /// Project id
        project: String,
        /// Only try this role
        #[arg(long, help = "Restrict the pickup to one role (e.g. developer, tester)")]
        role: Option<String>,
        /// Maximum number of pickups
        #[arg(long, help = "Stop after this many pickups")]
        max: Option<usize>,
    },
    /// Complete a role's active task with a result
    Complete {
        /// Project id
        project: String,
        /// Role finishing its task
        role: String,
        /// Result, e.g. done, pass, fail, refine, blocked
        result: String,
        #[arg(long, help = "One-line summary for the announcement")]
        summary: Option<String>,
        #[arg(long, help = "Pull request URL; skips automatic lookup")]
        pr_url: Option<String>,
    },
    /// Check worker health and optionally repair drift
    Health {
        /// Project id; all projects when omitted
        project: Option<String>,
        #[arg(long, help = "Apply fixes for the findings that allow it")]
        fix: bool,
        #[arg(long, value_delimiter = ',', help = "Comma-separated live session references")]
        live: Vec<String>,
    },
    /// Run a heartbeat sweep: health pass, then scheduling, across all projects
    Heartbeat {
        #[arg(long, help = "Keep sweeping on the configured interval until ctrl-c")]
        watch: bool,
        #[arg(long, value_delimiter = ',', help = "Comma-separated live session references")]
        live: Vec<String>,
    },
    /// Show projects and their workers
    Status {
        /// Project id; all projects when omitted
        project: Option<String>,
    },
    /// Register a project or refresh its settings
    Register {
        /// Project id
        id: String,
        #[arg(long, help = "Display name (defaults to the id)")]
        name: Option<String>,
        #[arg(long, help = "Local checkout of the project's source")]
        repo: String,
        #[arg(long, help = "Channel the project reports to")]
        channel: Option<String>,
        #[arg(long, default_value = "parallel", help = "parallel or sequential")]
        role_execution: RoleExecution,
        #[arg(long, help = "owner/repo holding the project's issues (defaults to github.owner/github.repo)")]
        tracker: Option<String>,
    },
    /// Create any missing workflow labels in each project's tracker
    Labels {
        /// Project id; all projects when omitted
        project: Option<String>,
        #[arg(long, help = "List the workflow labels without creating anything")]
        dry_run: bool,
    },
}
