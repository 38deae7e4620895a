use anyhow::Result;
use std::sync::Arc;

use super::CliContext;
use crate::heartbeat::{EmptySessionRegistry, HeartbeatDriver, SessionRegistry, StaticSessionRegistry};
use crate::shutdown::ShutdownCoordinator;

pub struct HeartbeatCommand {
    pub watch: bool,
    pub live: Vec<String>,
}

impl HeartbeatCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let sessions: Arc<dyn SessionRegistry> = if self.live.is_empty() {
            Arc::new(EmptySessionRegistry)
        } else {
            Arc::new(StaticSessionRegistry::new(self.live.clone()))
        };
        let services = ctx.services()?;
        let driver = HeartbeatDriver::new(services.clone(), sessions, ctx.config.heartbeat_settings());

        if self.watch {
            let shutdown = ShutdownCoordinator::new();
            shutdown.install_signal_handlers();
            println!(
                "💓 Heartbeat every {}s (ctrl-c to stop)",
                driver.settings().interval.as_secs()
            );
            driver.run(shutdown.subscribe()).await;
            println!("👋 Heartbeat stopped");
            return Ok(());
        }

        let summary = driver.run_sweep().await;
        services.flush_notifications().await;
        let summary = summary?;
        if ctx.json {
            return ctx.print_json(&summary);
        }

        println!(
            "💓 Swept {} projects: {} pickups, {} health fixes, {} skipped",
            summary.projects,
            summary.pickups.len(),
            summary.health_fixes,
            summary.skipped
        );
        for pickup in &summary.pickups {
            println!(
                "   🚀 {} {} #{} {}",
                pickup.project_id, pickup.pickup.role, pickup.pickup.issue_id, pickup.pickup.issue_title
            );
        }
        for error in &summary.errors {
            println!("   ❌ {error}");
        }
        Ok(())
    }
}
