//! rsx health - Run health checks

use std::collections::BTreeMap;

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::{Result, RsError};
use crate::resilience::{HealthCheck, HealthStatus, health};

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Exit non-zero when any check is critical
    #[arg(long)]
    pub strict: bool,
}

#[derive(Serialize)]
struct HealthReport {
    overall: HealthStatus,
    checks: BTreeMap<String, HealthCheck>,
}

pub fn run(ctx: &AppContext, args: &HealthArgs) -> Result<()> {
    let checks = ctx.recovery_service()?.perform_health_check();
    let overall = health::overall(checks.values());

    if ctx.is_json() {
        output::emit_json(&output::json_ok(HealthReport {
            overall,
            checks: checks.clone(),
        }))?;
    } else {
        let mut layout = HumanLayout::new();
        layout.title("Health");
        for (name, check) in &checks {
            layout.kv(name, &format!("{} {}", output::paint_health(check.status), check.detail));
        }
        layout.blank();
        layout.kv("overall", &output::paint_health(overall));
        output::emit_human(layout);
    }

    if args.strict && overall == HealthStatus::Critical {
        let failing: Vec<&str> = checks
            .iter()
            .filter(|(_, check)| check.status == HealthStatus::Critical)
            .map(|(name, _)| name.as_str())
            .collect();
        return Err(RsError::ServiceUnavailable {
            dependency: failing.join(","),
            message: "critical health checks".to_string(),
        });
    }
    Ok(())
}
