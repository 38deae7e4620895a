use anyhow::Result;

use super::CliContext;
use crate::scheduler::{Scheduler, TickOptions};

pub struct PickupCommand {
    pub project: String,
    pub role: Option<String>,
    pub max: Option<usize>,
}

impl PickupCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let services = ctx.services()?;
        let scheduler = Scheduler::new(services.clone());
        let options = TickOptions {
            role: self.role.clone(),
            max_pickups: self.max,
        };
        let result = scheduler.tick(&self.project, options).await;
        services.flush_notifications().await;
        let result = result?;

        if ctx.json {
            return ctx.print_json(&result);
        }

        if result.pickups.is_empty() {
            println!("😴 Nothing picked up for {}", self.project);
        }
        for pickup in &result.pickups {
            println!(
                "🚀 {} #{} {} ({} → {})",
                pickup.role, pickup.issue_id, pickup.issue_title, pickup.from_label, pickup.to_label
            );
            println!("   🎚️  Level: {}  Mode: {}  Session: {}", pickup.level, pickup.mode, pickup.session_ref);
            if !pickup.announcement.is_empty() {
                println!("   📣 {}", pickup.announcement);
            }
        }
        for skip in &result.skipped {
            println!("   ⏭️  {}: {}", skip.role, skip.reason);
        }
        Ok(())
    }
}
