//! Per-dependency circuit breaker.
//!
//! State is persisted in a [`KeyValueStore`] under
//! `circuit_breaker:<id>:{state,state_changed_at,failure_count,success_count}`
//! so every process on the host sees the same breaker. The breaker only gates
//! whether a call is attempted; it never retries.
//!
//! ```text
//!            failure_count >= failure_threshold
//!   Closed ─────────────────────────────────────▶ Open
//!     ▲                                           │  ▲
//!     │ success_count >= success_threshold        │  │ any failure
//!     │                                           ▼  │
//!     └─────────────────────────────────────── HalfOpen
//!                      recovery_timeout elapsed ─┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ErrorCode, Result, RsError};
use crate::storage::KeyValueStore;
use crate::utils::clock::{Clock, checked_after, to_delta};

/// Namespace for persisted breaker state.
pub const STATE_NAMESPACE: &str = "circuit_breaker";
/// Namespace for per-call metric records.
pub const METRICS_NAMESPACE: &str = "circuit_breaker_metrics";
/// Metric records expire after an hour.
pub const METRICS_TTL: Duration = Duration::from_secs(3600);
/// Expired store entries are purged once every this many metric writes.
pub const PURGE_EVERY_METRICS: u64 = 256;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "closed" => Some(Self::Closed),
            "open" => Some(Self::Open),
            "half_open" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures in Closed that open the circuit.
    pub failure_threshold: u32,
    /// Seconds to stay Open before allowing a trial call.
    pub recovery_timeout_secs: u64,
    /// Trial successes in HalfOpen needed to close again.
    pub success_threshold: u32,
    /// Error codes that pass through without counting as failures.
    pub expected_errors: Vec<ErrorCode>,
    /// Calls slower than this are treated as timeouts. `None` disables.
    pub timeout_ms: Option<u64>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 3,
            expected_errors: vec![
                ErrorCode::ValidationFailed,
                ErrorCode::SearchQueryInvalid,
                ErrorCode::InvalidEmbedding,
            ],
            timeout_ms: Some(30_000),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn is_expected(&self, code: ErrorCode) -> bool {
        self.expected_errors.contains(&code)
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(RsError::Config(
                "breaker failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(RsError::Config(
                "breaker success_threshold must be greater than 0".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(RsError::Config(
                "breaker timeout_ms must be greater than 0 (omit it to disable)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Caller-supplied context, passed through to the fallback and logs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallContext {
    pub operation: Option<String>,
    pub attributes: Map<String, Value>,
}

impl CallContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of a breaker's persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CircuitRecord {
    pub state: CircuitState,
    pub state_changed_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub success_count: u32,
}

/// Statistics as exposed to dashboards and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatistics {
    pub dependency: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub state_changed_at: Option<DateTime<Utc>>,
    /// When an Open circuit will admit its next trial call.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub config: CircuitBreakerConfig,
}

/// Outcome of one gated call, as written to the metrics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    Success,
    Failure,
    /// Failure on the expected allow-list; not counted.
    Expected,
    /// Short-circuited while Open; the operation was not invoked.
    Rejected,
}

/// One metric record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetric {
    pub result: CallResult,
    pub duration_ms: u64,
    pub state: CircuitState,
    pub error_code: Option<ErrorCode>,
    pub timestamp: DateTime<Utc>,
}

/// Whether a call may proceed.
enum Admission {
    Proceed(CircuitState),
    Reject,
}

/// Fault-isolation gate around calls to a single dependency.
pub struct CircuitBreaker {
    dependency: String,
    config: CircuitBreakerConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    transitions: Mutex<()>,
    metric_seq: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.dependency)
            .field("config", &self.config)
            .field("store", &self.store.backend())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(
        dependency: impl Into<String>,
        config: CircuitBreakerConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dependency: dependency.into(),
            config,
            store,
            clock,
            transitions: Mutex::new(()),
            metric_seq: AtomicU64::new(0),
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`RsError::CircuitOpen`] without invoking `operation` while the
    /// circuit is open, and the operation's own error when it fails.
    pub fn execute<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.run(
            operation,
            None::<fn(Option<&RsError>, &CallContext) -> Result<T>>,
            &CallContext::default(),
        )
    }

    /// Run `operation`, answering with `fallback` when the circuit is open or
    /// the call fails with a counted error.
    ///
    /// The fallback receives the failure (`None` when short-circuited) and
    /// the caller's context. Expected errors are returned as-is.
    pub fn execute_with_fallback<T, F, G>(
        &self,
        operation: F,
        fallback: G,
        context: &CallContext,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
        G: FnOnce(Option<&RsError>, &CallContext) -> Result<T>,
    {
        self.run(operation, Some(fallback), context)
    }

    fn run<T, F, G>(&self, operation: F, fallback: Option<G>, context: &CallContext) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
        G: FnOnce(Option<&RsError>, &CallContext) -> Result<T>,
    {
        let state = match self.admit() {
            Admission::Proceed(state) => state,
            Admission::Reject => {
                tracing::debug!(
                    dependency = %self.dependency,
                    operation = context.operation.as_deref().unwrap_or("-"),
                    "circuit open, short-circuiting call"
                );
                self.record_metric(
                    CallResult::Rejected,
                    Duration::ZERO,
                    CircuitState::Open,
                    Some(ErrorCode::CircuitOpen),
                );
                return match fallback {
                    Some(fallback) => fallback(None, context),
                    None => Err(RsError::CircuitOpen {
                        dependency: self.dependency.clone(),
                    }),
                };
            }
        };

        let started = self.clock.now();
        let outcome = operation();
        let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();

        let outcome = match (outcome, self.config.timeout()) {
            (Ok(_), Some(limit)) if elapsed > limit => Err(RsError::Timeout {
                dependency: self.dependency.clone(),
                elapsed_ms: millis(elapsed),
                limit_ms: millis(limit),
            }),
            (outcome, _) => outcome,
        };

        match outcome {
            Ok(value) => {
                self.on_success();
                self.record_metric(CallResult::Success, elapsed, state, None);
                Ok(value)
            }
            Err(err) => {
                let code = err.code();
                if self.config.is_expected(code) {
                    tracing::debug!(
                        dependency = %self.dependency,
                        code = %code,
                        "expected error, not counted as circuit failure"
                    );
                    self.record_metric(CallResult::Expected, elapsed, state, Some(code));
                    return Err(err);
                }

                self.on_failure(&err);
                self.record_metric(CallResult::Failure, elapsed, state, Some(code));
                match fallback {
                    Some(fallback) => fallback(Some(&err), context),
                    None => Err(err),
                }
            }
        }
    }

    /// Decide whether a call may run, moving Open to HalfOpen once the
    /// recovery timeout has elapsed.
    fn admit(&self) -> Admission {
        let _guard = self.transitions.lock();
        let record = self.load();
        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => Admission::Proceed(record.state),
            CircuitState::Open => {
                if self.recovery_elapsed(&record) {
                    self.transition(CircuitState::Open, CircuitState::HalfOpen);
                    self.write_count("success_count", 0);
                    Admission::Proceed(CircuitState::HalfOpen)
                } else {
                    Admission::Reject
                }
            }
        }
    }

    fn recovery_elapsed(&self, record: &CircuitRecord) -> bool {
        match record.state_changed_at {
            Some(changed) => self.clock.now() - changed >= to_delta(self.config.recovery_timeout()),
            None => true,
        }
    }

    fn on_success(&self) {
        let _guard = self.transitions.lock();
        let record = self.load();
        match record.state {
            CircuitState::HalfOpen => {
                let successes = self.bump("success_count");
                if successes >= self.config.success_threshold {
                    self.transition(CircuitState::HalfOpen, CircuitState::Closed);
                    self.write_count("failure_count", 0);
                    self.write_count("success_count", 0);
                }
            }
            CircuitState::Closed => {
                if record.failure_count > 0 {
                    self.write_count("failure_count", 0);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, err: &RsError) {
        let _guard = self.transitions.lock();
        let record = self.load();
        let failures = self.bump("failure_count");
        tracing::warn!(
            dependency = %self.dependency,
            code = %err.code(),
            failures,
            state = %record.state,
            "dependency call failed"
        );
        match record.state {
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                self.transition(CircuitState::Closed, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::HalfOpen, CircuitState::Open);
                self.write_count("success_count", 0);
            }
            _ => {}
        }
    }

    /// Current statistics.
    pub fn statistics(&self) -> CircuitStatistics {
        let record = self.load();
        let next_attempt_at = match (record.state, record.state_changed_at) {
            (CircuitState::Open, Some(changed)) => {
                checked_after(changed, self.config.recovery_timeout())
            }
            _ => None,
        };
        CircuitStatistics {
            dependency: self.dependency.clone(),
            state: record.state,
            failure_count: record.failure_count,
            success_count: record.success_count,
            state_changed_at: record.state_changed_at,
            next_attempt_at,
            config: self.config.clone(),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.load().state
    }

    /// Force Closed and zero both counters.
    pub fn reset(&self) -> Result<()> {
        let _guard = self.transitions.lock();
        let now = self.clock.now_millis();
        self.store
            .set(STATE_NAMESPACE, &self.key("state"), json!(CircuitState::Closed.as_str()), None)?;
        self.store
            .set(STATE_NAMESPACE, &self.key("state_changed_at"), json!(now), None)?;
        self.store
            .set(STATE_NAMESPACE, &self.key("failure_count"), json!(0), None)?;
        self.store
            .set(STATE_NAMESPACE, &self.key("success_count"), json!(0), None)?;
        tracing::info!(dependency = %self.dependency, "circuit reset to closed");
        Ok(())
    }

    /// Metric records still inside the retention window, oldest first.
    pub fn recent_metrics(&self) -> Result<Vec<CallMetric>> {
        let prefix = format!("{}:", self.dependency);
        let mut metrics = Vec::new();
        for key in self.store.keys(METRICS_NAMESPACE, &prefix)? {
            if let Some(value) = self.store.get(METRICS_NAMESPACE, &key)? {
                metrics.push(serde_json::from_value::<CallMetric>(value)?);
            }
        }
        metrics.sort_by_key(|m| m.timestamp);
        Ok(metrics)
    }

    /// Load the persisted record. Store failures read as a Closed record.
    pub fn load(&self) -> CircuitRecord {
        match self.try_load() {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    dependency = %self.dependency,
                    error = %err,
                    "breaker state unreadable, assuming closed"
                );
                CircuitRecord::default()
            }
        }
    }

    fn try_load(&self) -> Result<CircuitRecord> {
        let state = self
            .store
            .get(STATE_NAMESPACE, &self.key("state"))?
            .and_then(|v| v.as_str().and_then(CircuitState::parse))
            .unwrap_or_default();
        let state_changed_at = self
            .store
            .get(STATE_NAMESPACE, &self.key("state_changed_at"))?
            .and_then(|v| v.as_i64())
            .and_then(DateTime::from_timestamp_millis);
        Ok(CircuitRecord {
            state,
            state_changed_at,
            failure_count: self.read_count("failure_count")?,
            success_count: self.read_count("success_count")?,
        })
    }

    fn read_count(&self, field: &str) -> Result<u32> {
        Ok(self
            .store
            .get(STATE_NAMESPACE, &self.key(field))?
            .and_then(|v| v.as_u64())
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX)))
    }

    fn key(&self, field: &str) -> String {
        format!("{}:{field}", self.dependency)
    }

    fn transition(&self, from: CircuitState, to: CircuitState) {
        let now = self.clock.now_millis();
        let written = self
            .store
            .set(STATE_NAMESPACE, &self.key("state"), json!(to.as_str()), None)
            .and_then(|()| {
                self.store
                    .set(STATE_NAMESPACE, &self.key("state_changed_at"), json!(now), None)
            });
        match written {
            Ok(()) => tracing::info!(
                dependency = %self.dependency,
                from = %from,
                to = %to,
                "circuit state transition"
            ),
            Err(err) => tracing::warn!(
                dependency = %self.dependency,
                from = %from,
                to = %to,
                error = %err,
                "failed to persist circuit state transition"
            ),
        }
    }

    fn bump(&self, field: &str) -> u32 {
        match self.store.increment(STATE_NAMESPACE, &self.key(field), 1) {
            Ok(n) => u32::try_from(n.max(0)).unwrap_or(u32::MAX),
            Err(err) => {
                tracing::warn!(
                    dependency = %self.dependency,
                    field,
                    error = %err,
                    "failed to update breaker counter"
                );
                0
            }
        }
    }

    fn write_count(&self, field: &str, value: u32) {
        if let Err(err) = self
            .store
            .set(STATE_NAMESPACE, &self.key(field), json!(value), None)
        {
            tracing::warn!(
                dependency = %self.dependency,
                field,
                error = %err,
                "failed to update breaker counter"
            );
        }
    }

    fn record_metric(
        &self,
        result: CallResult,
        duration: Duration,
        state: CircuitState,
        error_code: Option<ErrorCode>,
    ) {
        let timestamp = self.clock.now();
        let metric = CallMetric {
            result,
            duration_ms: millis(duration),
            state,
            error_code,
            timestamp,
        };
        tracing::trace!(
            dependency = %self.dependency,
            result = ?metric.result,
            duration_ms = metric.duration_ms,
            state = %state,
            "circuit call metric"
        );
        // Unique within one millisecond and across processes sharing the store.
        let seq = self.metric_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let key = format!(
            "{}:{:013}:{}:{seq:08}",
            self.dependency,
            timestamp.timestamp_millis(),
            std::process::id()
        );
        let stored = serde_json::to_value(&metric)
            .map_err(RsError::from)
            .and_then(|value| {
                self.store
                    .set(METRICS_NAMESPACE, &key, value, Some(METRICS_TTL))
            });
        if let Err(err) = stored {
            tracing::warn!(
                dependency = %self.dependency,
                error = %err,
                "failed to record circuit metric"
            );
        }
        if seq % PURGE_EVERY_METRICS == 0 {
            self.purge_expired();
        }
    }

    fn purge_expired(&self) {
        match self.store.purge_expired() {
            Ok(purged) => tracing::debug!(
                dependency = %self.dependency,
                purged,
                "purged expired state entries"
            ),
            Err(err) => tracing::warn!(
                dependency = %self.dependency,
                error = %err,
                "failed to purge expired state entries"
            ),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::utils::clock::ManualClock;
    use std::cell::Cell;

    fn breaker(config: CircuitBreakerConfig) -> (Arc<ManualClock>, CircuitBreaker) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (clock.clone(), CircuitBreaker::new("embedding_api", config, store, clock))
    }

    fn config(failures: u32, recovery_secs: u64, successes: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failures,
            recovery_timeout_secs: recovery_secs,
            success_threshold: successes,
            ..Default::default()
        }
    }

    fn fail() -> Result<u32> {
        Err(RsError::ServiceUnavailable {
            dependency: "embedding_api".into(),
            message: "503".into(),
        })
    }

    #[test]
    fn opens_after_threshold_and_short_circuits() {
        let (_clock, cb) = breaker(config(3, 60, 1));
        for _ in 0..2 {
            assert!(cb.execute(fail).is_err());
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        assert!(cb.execute(fail).is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let called = Cell::new(false);
        let err = cb
            .execute(|| {
                called.set(true);
                Ok(1)
            })
            .unwrap_err();
        assert!(!called.get());
        assert_eq!(err.code(), ErrorCode::CircuitOpen);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let (_clock, cb) = breaker(config(3, 60, 1));
        cb.execute(fail).unwrap_err();
        cb.execute(fail).unwrap_err();
        cb.execute(|| Ok(1)).unwrap();
        assert_eq!(cb.statistics().failure_count, 0);
        cb.execute(fail).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_recovery_timeout_invokes_operation() {
        let (clock, cb) = breaker(config(1, 30, 2));
        cb.execute(fail).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert!(cb.execute(|| Ok(1)).is_err());

        clock.advance(Duration::from_secs(1));
        let called = Cell::new(false);
        cb.execute(|| {
            called.set(true);
            Ok(1)
        })
        .unwrap();
        assert!(called.get());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.statistics().success_count, 1);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let (clock, cb) = breaker(config(1, 10, 3));
        cb.execute(fail).unwrap_err();
        clock.advance(Duration::from_secs(10));
        cb.execute(|| Ok(1)).unwrap();
        cb.execute(|| Ok(1)).unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.execute(fail).unwrap_err();
        let stats = cb.statistics();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.state_changed_at, Some(clock.now()));
    }

    #[test]
    fn half_open_successes_close_and_zero_counters() {
        let (clock, cb) = breaker(config(2, 5, 2));
        cb.execute(fail).unwrap_err();
        cb.execute(fail).unwrap_err();
        clock.advance(Duration::from_secs(5));
        cb.execute(|| Ok(1)).unwrap();
        cb.execute(|| Ok(1)).unwrap();
        let stats = cb.statistics();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
    }

    #[test]
    fn expected_errors_are_not_counted() {
        let (_clock, cb) = breaker(config(1, 60, 1));
        let err = cb
            .execute::<u32, _>(|| Err(RsError::Validation("bad input".into())))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        let stats = cb.statistics();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
    }

    #[test]
    fn fallback_receives_error_then_none_when_open() {
        let (_clock, cb) = breaker(config(1, 60, 1));
        let ctx = CallContext::new("embed").with("batch", 4);

        let value = cb
            .execute_with_fallback(fail, |err, ctx| {
                assert_eq!(err.map(RsError::code), Some(ErrorCode::ServiceUnavailable));
                assert_eq!(ctx.attributes.get("batch"), Some(&json!(4)));
                Ok(7)
            }, &ctx)
            .unwrap();
        assert_eq!(value, 7);

        let value = cb
            .execute_with_fallback(|| Ok(1), |err, _| {
                assert!(err.is_none());
                Ok(9)
            }, &ctx)
            .unwrap();
        assert_eq!(value, 9);
    }

    #[test]
    fn slow_call_counts_as_timeout() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            timeout_ms: Some(100),
            ..Default::default()
        };
        let (clock, cb) = breaker(cfg);
        let err = cb
            .execute(|| {
                clock.advance(Duration::from_millis(250));
                Ok(1)
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DependencyTimeout);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn timeout_disabled_allows_slow_calls() {
        let cfg = CircuitBreakerConfig {
            timeout_ms: None,
            ..Default::default()
        };
        let (clock, cb) = breaker(cfg);
        let value = cb
            .execute(|| {
                clock.advance(Duration::from_secs(600));
                Ok(5)
            })
            .unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn reset_forces_closed() {
        let (_clock, cb) = breaker(config(1, 60, 1));
        cb.execute(fail).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset().unwrap();
        let stats = cb.statistics();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert!(stats.next_attempt_at.is_none());
    }

    #[test]
    fn metrics_are_recorded_per_call() {
        let (clock, cb) = breaker(config(1, 60, 1));
        cb.execute(|| Ok(1)).unwrap();
        clock.advance(Duration::from_millis(5));
        cb.execute(fail).unwrap_err();
        clock.advance(Duration::from_millis(5));
        cb.execute(|| Ok(1)).unwrap_err();

        let metrics = cb.recent_metrics().unwrap();
        let results: Vec<CallResult> = metrics.iter().map(|m| m.result).collect();
        assert_eq!(results, vec![CallResult::Success, CallResult::Failure, CallResult::Rejected]);

        clock.advance(METRICS_TTL + Duration::from_secs(1));
        assert!(cb.recent_metrics().unwrap().is_empty());
    }

    #[test]
    fn open_statistics_report_next_attempt() {
        let (clock, cb) = breaker(config(1, 45, 1));
        cb.execute(fail).unwrap_err();
        let stats = cb.statistics();
        assert_eq!(
            stats.next_attempt_at,
            Some(clock.now() + chrono::TimeDelta::seconds(45))
        );
    }

    #[test]
    fn calls_in_the_same_millisecond_keep_separate_metrics() {
        let (_clock, cb) = breaker(config(5, 60, 1));
        cb.execute(|| Ok(1)).unwrap();
        cb.execute(fail).unwrap_err();
        cb.execute(|| Ok(1)).unwrap();

        let metrics = cb.recent_metrics().unwrap();
        let results: Vec<CallResult> = metrics.iter().map(|m| m.result).collect();
        assert_eq!(
            results,
            vec![CallResult::Success, CallResult::Failure, CallResult::Success]
        );
    }

    #[test]
    fn metric_writes_purge_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cb = CircuitBreaker::new(
            "embedding_api",
            config(5, 60, 1),
            store.clone(),
            clock.clone(),
        );
        let half = usize::try_from(PURGE_EVERY_METRICS / 2).unwrap();

        for _ in 0..half {
            cb.execute(|| Ok(1)).unwrap();
        }
        clock.advance(METRICS_TTL + Duration::from_secs(1));
        for _ in 0..half - 1 {
            cb.execute(|| Ok(1)).unwrap();
        }
        assert_eq!(store.stored_len(), 2 * half - 1);

        cb.execute(|| Ok(1)).unwrap();
        assert_eq!(store.stored_len(), half);
        assert_eq!(cb.recent_metrics().unwrap().len(), half);
    }

    #[test]
    fn unbounded_recovery_timeout_never_reports_next_attempt() {
        let (clock, cb) = breaker(config(1, u64::MAX, 1));
        cb.execute(fail).unwrap_err();
        let stats = cb.statistics();
        assert_eq!(stats.state, CircuitState::Open);
        assert!(stats.next_attempt_at.is_none());

        clock.advance(Duration::from_secs(86_400 * 365));
        assert_eq!(cb.execute(|| Ok(1)).unwrap_err().code(), ErrorCode::CircuitOpen);
    }

    #[test]
    fn invalid_embedding_is_expected_by_default() {
        let (_clock, cb) = breaker(CircuitBreakerConfig::default());
        for _ in 0..10 {
            let err = cb
                .execute(|| -> Result<u32> { Err(RsError::InvalidEmbedding("no tokens".into())) })
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidEmbedding);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.statistics().failure_count, 0);
    }

    #[test]
    fn config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(config(0, 1, 1).validate().is_err());
        assert!(config(1, 1, 0).validate().is_err());
    }
}
