//! Proactive health checks.
//!
//! Each check yields a [`HealthCheck`]; the recovery service runs them all and
//! returns a map keyed by check name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::resilience::circuit_breaker::CircuitState;
use crate::storage::KeyValueStore;
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Map a breaker state onto a health status.
    pub const fn from_circuit(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => Self::Healthy,
            CircuitState::HalfOpen => Self::Warning,
            CircuitState::Open => Self::Critical,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub detail: String,
}

impl HealthCheck {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: detail.into(),
        }
    }

    pub fn warning(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Warning,
            detail: detail.into(),
        }
    }

    pub fn critical(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Critical,
            detail: detail.into(),
        }
    }
}

/// Extra check contributed by the embedding application.
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self) -> HealthCheck;
}

/// Usage ratios at which memory and disk checks degrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub memory_warning_ratio: f64,
    pub memory_critical_ratio: f64,
    pub disk_warning_ratio: f64,
    pub disk_critical_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            memory_warning_ratio: 0.85,
            memory_critical_ratio: 0.95,
            disk_warning_ratio: 0.85,
            disk_critical_ratio: 0.95,
        }
    }
}

fn status_for_ratio(used: f64, warning: f64, critical: f64) -> HealthStatus {
    if used >= critical {
        HealthStatus::Critical
    } else if used >= warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Write, read back and delete a probe key.
pub fn check_store(store: &dyn KeyValueStore, clock: &dyn Clock) -> HealthCheck {
    let key = format!("probe:{}", clock.now_millis());
    let marker = json!({ "probe": true });
    let round_trip = store
        .set("health", &key, marker.clone(), Some(std::time::Duration::from_secs(60)))
        .and_then(|()| store.get("health", &key))
        .and_then(|read| store.delete("health", &key).map(|_| read));
    match round_trip {
        Ok(Some(value)) if value == marker => {
            HealthCheck::healthy(format!("{} store read/write ok", store.backend()))
        }
        Ok(_) => HealthCheck::critical(format!("{} store lost a probe write", store.backend())),
        Err(err) => HealthCheck::critical(format!("{} store unreachable: {}", store.backend(), err.code())),
    }
}

/// `(total_kb, available_kb)` from `/proc/meminfo` text.
pub fn parse_meminfo(text: &str) -> Option<(u64, u64)> {
    let field = |name: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    (total > 0).then_some((total, available.min(total)))
}

pub fn check_memory(thresholds: &HealthThresholds) -> HealthCheck {
    let Some((total, available)) = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .as_deref()
        .and_then(parse_meminfo)
    else {
        return HealthCheck::warning("memory statistics unavailable");
    };
    memory_check_from(total, available, thresholds)
}

#[allow(clippy::cast_precision_loss)]
fn memory_check_from(total_kb: u64, available_kb: u64, thresholds: &HealthThresholds) -> HealthCheck {
    let used = 1.0 - available_kb as f64 / total_kb as f64;
    HealthCheck {
        status: status_for_ratio(used, thresholds.memory_warning_ratio, thresholds.memory_critical_ratio),
        detail: format!(
            "{:.0}% used ({} MiB available of {} MiB)",
            used * 100.0,
            available_kb / 1024,
            total_kb / 1024
        ),
    }
}

/// Nearest existing ancestor, so a data directory that hasn't been created
/// yet still reports the disk it will live on.
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

pub fn check_disk(path: &Path, thresholds: &HealthThresholds) -> HealthCheck {
    let resolved = existing_ancestor(path);
    match (fs2::total_space(&resolved), fs2::available_space(&resolved)) {
        (Ok(total), Ok(available)) if total > 0 => {
            disk_check_from(&resolved, total, available.min(total), thresholds)
        }
        _ => HealthCheck::warning(format!(
            "disk statistics unavailable for {}",
            resolved.display()
        )),
    }
}

#[allow(clippy::cast_precision_loss)]
fn disk_check_from(
    path: &Path,
    total: u64,
    available: u64,
    thresholds: &HealthThresholds,
) -> HealthCheck {
    let used = 1.0 - available as f64 / total as f64;
    HealthCheck {
        status: status_for_ratio(
            used,
            thresholds.disk_warning_ratio,
            thresholds.disk_critical_ratio,
        ),
        detail: format!(
            "{:.0}% used on {} ({} MiB free)",
            used * 100.0,
            path.display(),
            available / (1024 * 1024)
        ),
    }
}

/// Health derived from a breaker's state.
pub fn check_circuit(dependency: &str, state: CircuitState) -> HealthCheck {
    let status = HealthStatus::from_circuit(state);
    let detail = match state {
        CircuitState::Closed => format!("{dependency} circuit closed"),
        CircuitState::HalfOpen => format!("{dependency} circuit half-open, probing recovery"),
        CircuitState::Open => format!("{dependency} circuit open, calls short-circuited"),
    };
    HealthCheck { status, detail }
}

/// Worst status across a set of checks.
pub fn overall<'a, I>(checks: I) -> HealthStatus
where
    I: IntoIterator<Item = &'a HealthCheck>,
{
    checks
        .into_iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}
