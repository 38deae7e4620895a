use anyhow::Result;
use clap::Parser;

use labelflow::cli::commands::{
    complete::CompleteCommand, health::HealthCommand, heartbeat::HeartbeatCommand, labels::LabelsCommand,
    pickup::PickupCommand, register::RegisterCommand, show_how_to_get_work, status::StatusCommand,
    CliContext,
};
use labelflow::cli::{Cli, Commands};
use labelflow::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = labelflow::config()?.clone();
    init_telemetry(config.observability.json_logs, &config.observability.log_level)?;

    let ctx = CliContext::new(config, cli.workflow, cli.json);
    let runtime = tokio::runtime::Runtime::new()?;

    let result = runtime.block_on(async {
        match cli.command {
            // Default behavior: no subcommand - explain how to get started
            None => show_how_to_get_work().await,
            Some(Commands::Pickup { project, role, max }) => {
                PickupCommand { project, role, max }.execute(&ctx).await
            }
            Some(Commands::Complete { project, role, result, summary, pr_url }) => {
                CompleteCommand { project, role, result, summary, pr_url }
                    .execute(&ctx)
                    .await
            }
            Some(Commands::Health { project, fix, live }) => {
                HealthCommand { project, fix, live }.execute(&ctx).await
            }
            Some(Commands::Heartbeat { watch, live }) => {
                HeartbeatCommand { watch, live }.execute(&ctx).await
            }
            Some(Commands::Status { project }) => StatusCommand { project }.execute(&ctx).await,
            Some(Commands::Register { id, name, repo, channel, role_execution, tracker }) => {
                RegisterCommand { id, name, repo, channel, role_execution, tracker }
                    .execute(&ctx)
                    .await
            }
            Some(Commands::Labels { project, dry_run }) => {
                LabelsCommand { project, dry_run }.execute(&ctx).await
            }
        }
    });

    shutdown_telemetry();
    result
}
