//! Failure context shared by classification, recovery and messaging.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a caller should serve while a dependency is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedMode {
    /// Keyword search only; vector leg skipped.
    LexicalOnly,
    /// Serve the last result that was known to be good.
    LastKnownGood,
}

/// Outcomes of earlier recovery attempts for one dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryHistory {
    pub attempts: u32,
    pub successes: u32,
    pub total_recovery_ms: u64,
}

impl RecoveryHistory {
    pub fn record(&mut self, succeeded: bool, took: Duration) {
        self.attempts = self.attempts.saturating_add(1);
        if succeeded {
            self.successes = self.successes.saturating_add(1);
        }
        self.total_recovery_ms = self
            .total_recovery_ms
            .saturating_add(u64::try_from(took.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn success_ratio(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        f64::from(self.successes) / f64::from(self.attempts)
    }

    pub fn average_recovery_time(&self) -> Duration {
        if self.attempts == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_recovery_ms / u64::from(self.attempts))
    }
}

/// Everything known about a failure beyond the error itself.
///
/// Recovery writes back into it: a reduced `batch_size`, the chosen
/// `degraded_mode`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Dependency the failing call targeted, when the error doesn't say.
    pub dependency: Option<String>,
    pub operation: Option<String>,
    /// Zero-based retry attempt for the failing call.
    pub attempt: u32,
    /// Failures in a row against the same dependency.
    pub consecutive_failures: u32,
    pub batch_size: Option<usize>,
    /// Overrides the error's own retry hint.
    pub retry_after: Option<Duration>,
    pub degraded_mode: Option<DegradedMode>,
    /// Whether a last-known-good result exists to serve.
    pub has_last_known_good: bool,
    pub recovery_history: Option<RecoveryHistory>,
}

impl ErrorContext {
    pub fn for_dependency(id: impl Into<String>) -> Self {
        Self {
            dependency: Some(id.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn with_consecutive_failures(mut self, failures: u32) -> Self {
        self.consecutive_failures = failures;
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: RecoveryHistory) -> Self {
        self.recovery_history = Some(history);
        self
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_ratios() {
        let mut history = RecoveryHistory::default();
        assert_eq!(history.success_ratio(), 0.0);
        history.record(true, Duration::from_secs(2));
        history.record(true, Duration::from_secs(4));
        history.record(false, Duration::from_secs(6));
        assert_eq!(history.attempts, 3);
        assert!((history.success_ratio() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(history.average_recovery_time(), Duration::from_secs(4));
    }
}
