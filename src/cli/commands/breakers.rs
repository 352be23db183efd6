//! rsx breakers - Inspect and reset circuit breakers

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::Result;
use crate::resilience::{CallMetric, CircuitStatistics};

#[derive(Args, Debug)]
pub struct BreakersArgs {
    /// Dependency id (all known dependencies when omitted)
    pub id: Option<String>,

    /// Reset the breaker (or every breaker) to closed
    #[arg(long)]
    pub reset: bool,

    /// Include recent call metrics
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Serialize)]
struct BreakerReport {
    #[serde(flatten)]
    statistics: CircuitStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_calls: Option<Vec<CallMetric>>,
}

#[derive(Serialize)]
struct ResetReport {
    reset: Vec<String>,
}

pub fn run(ctx: &AppContext, args: &BreakersArgs) -> Result<()> {
    if args.reset {
        return reset(ctx, args.id.as_deref());
    }

    let ids: Vec<String> = match &args.id {
        Some(id) => vec![id.clone()],
        None => ctx.registry.known_dependencies().map(ToString::to_string).collect(),
    };

    let mut reports = Vec::with_capacity(ids.len());
    for id in &ids {
        let breaker = ctx.registry.circuit_breaker(id, None)?;
        let recent_calls = if args.metrics {
            Some(breaker.recent_metrics()?)
        } else {
            None
        };
        reports.push(BreakerReport {
            statistics: breaker.statistics(),
            recent_calls,
        });
    }

    if ctx.is_json() {
        return output::emit_json(&output::json_ok(&reports));
    }

    let mut layout = HumanLayout::new();
    layout.title("Circuit breakers");
    for report in &reports {
        let stats = &report.statistics;
        layout.section(&stats.dependency);
        layout.kv("state", &output::paint_state(stats.state));
        layout.kv(
            "failures",
            &format!("{}/{}", stats.failure_count, stats.config.failure_threshold),
        );
        layout.kv(
            "successes",
            &format!("{}/{}", stats.success_count, stats.config.success_threshold),
        );
        if let Some(changed) = stats.state_changed_at {
            layout.kv("since", &changed.to_rfc3339());
        }
        if let Some(next) = stats.next_attempt_at {
            layout.kv("next attempt", &next.to_rfc3339());
        }
        if let Some(calls) = &report.recent_calls {
            layout.kv("recent calls", &calls.len().to_string());
            for call in calls.iter().rev().take(10) {
                let code = call.error_code.map(|c| format!(" {c}")).unwrap_or_default();
                layout.bullet(&format!(
                    "{} {:?} {}ms{code}",
                    call.timestamp.format("%H:%M:%S"),
                    call.result,
                    call.duration_ms
                ));
            }
        }
        layout.blank();
    }
    output::emit_human(layout);
    Ok(())
}

fn reset(ctx: &AppContext, id: Option<&str>) -> Result<()> {
    let reset: Vec<String> = match id {
        Some(id) => {
            ctx.registry.circuit_breaker(id, None)?.reset()?;
            vec![id.to_string()]
        }
        None => {
            ctx.registry.reset_all()?;
            ctx.registry.known_dependencies().map(ToString::to_string).collect()
        }
    };
    tracing::info!(count = reset.len(), "reset circuit breakers");

    if ctx.is_json() {
        return output::emit_json(&output::json_ok(ResetReport { reset }));
    }
    for id in &reset {
        println!("reset {id} -> closed");
    }
    Ok(())
}
