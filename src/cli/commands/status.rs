//! rsx status - Summarize degraded features from breaker state

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::{Result, RsError};
use crate::resilience::{CircuitState, ErrorContext, ServiceStatus};

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub fn run(ctx: &AppContext, _args: &StatusArgs) -> Result<()> {
    let stats = ctx.registry.all_statistics()?;
    let errors: Vec<RsError> = stats
        .values()
        .filter(|s| s.state != CircuitState::Closed)
        .map(|s| RsError::CircuitOpen {
            dependency: s.dependency.clone(),
        })
        .collect();

    let report = ctx
        .messages()
        .generate_status_report(&errors, &ErrorContext::default());

    if ctx.is_json() {
        return output::emit_json(&output::json_ok(&report));
    }

    let mut layout = HumanLayout::new();
    layout.title(&report.title);
    match report.status {
        ServiceStatus::Operational => {
            layout.push_line("All features operational.");
        }
        ServiceStatus::Degraded => {
            layout.kv("issues", &report.total_issues.to_string());
            layout.kv("affected", &report.affected_features.join(", "));
            if let Some(severity) = report.highest_severity {
                layout.kv("severity", &format!("{severity:?}").to_lowercase());
            }
            for message in &report.messages {
                layout.blank();
                layout.push_line(format!("{} {}", output::icon_glyph(message.icon), message.title));
                layout.push_line(format!("  {}", message.message));
                for alternative in &message.alternatives {
                    layout.bullet(alternative);
                }
                layout.kv("  resolution", &message.estimated_resolution);
            }
        }
    }
    output::emit_human(layout);
    Ok(())
}
