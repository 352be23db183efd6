//! Error classification.
//!
//! A static table keyed by [`ErrorCode`] gives the base classification; the
//! failure context then adjusts it (repeated failures escalate, a good
//! recovery record de-escalates).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, RsError};
use crate::resilience::context::ErrorContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// One tier down, bottoming out at Low.
    pub const fn lowered(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactScope {
    User,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    ReconnectDatabase,
    /// Fall back to lexical-only search.
    GracefulFallback,
    RateLimitBackoff,
    BatchSizeReduction,
    CircuitBreakerFallback,
    Retry,
    None,
}

impl RecoveryStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReconnectDatabase => "reconnect_database",
            Self::GracefulFallback => "graceful_fallback",
            Self::RateLimitBackoff => "rate_limit_backoff",
            Self::BatchSizeReduction => "batch_size_reduction",
            Self::CircuitBreakerFallback => "circuit_breaker_fallback",
            Self::Retry => "retry",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Minimal,
    User,
    Admin,
}

/// How a failure should be treated. Recomputed per failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub error_code: ErrorCode,
    pub severity: Severity,
    pub impact_scope: ImpactScope,
    pub recovery_strategy: RecoveryStrategy,
    pub escalation_required: bool,
    pub user_notification_level: NotificationLevel,
}

/// Thresholds that make classification context-sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// External-service failures in a row that escalate to a breaker fallback.
    pub repeated_failure_threshold: u32,
    /// Failures in a row that raise a degraded index from Low to Medium.
    pub degraded_index_failure_threshold: u32,
    /// Recovery attempts needed before history can lower severity.
    pub history_min_attempts: u32,
    pub history_min_success_ratio: f64,
    pub history_max_avg_recovery_secs: u64,
    /// Batches at or below this size cannot be halved further.
    pub min_batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            repeated_failure_threshold: 5,
            degraded_index_failure_threshold: 3,
            history_min_attempts: 3,
            history_min_success_ratio: 0.8,
            history_max_avg_recovery_secs: 10,
            min_batch_size: 1,
        }
    }
}

/// Base row of the classification table.
struct Rule {
    severity: Severity,
    scope: ImpactScope,
    strategy: RecoveryStrategy,
    escalate: bool,
    notify: NotificationLevel,
}

const fn rule(
    severity: Severity,
    scope: ImpactScope,
    strategy: RecoveryStrategy,
    escalate: bool,
    notify: NotificationLevel,
) -> Rule {
    Rule {
        severity,
        scope,
        strategy,
        escalate,
        notify,
    }
}

const DATABASE_DOWN: Rule = rule(
    Severity::Critical,
    ImpactScope::System,
    RecoveryStrategy::ReconnectDatabase,
    true,
    NotificationLevel::Admin,
);

const SERVICE_UNAVAILABLE: Rule = rule(
    Severity::Medium,
    ImpactScope::User,
    RecoveryStrategy::GracefulFallback,
    false,
    NotificationLevel::User,
);

const REPEATED_SERVICE_FAILURE: Rule = rule(
    Severity::High,
    ImpactScope::System,
    RecoveryStrategy::CircuitBreakerFallback,
    true,
    NotificationLevel::Admin,
);

/// Static classification table.
fn base_rule(code: ErrorCode) -> Rule {
    use ImpactScope::{System, User};
    use NotificationLevel as N;
    use RecoveryStrategy as S;
    use Severity::{High, Low, Medium};

    match code {
        ErrorCode::ConnectionFailed => DATABASE_DOWN,
        ErrorCode::ServiceUnavailable => SERVICE_UNAVAILABLE,
        ErrorCode::VectorIndexDegraded => rule(Low, User, S::None, false, N::Minimal),
        ErrorCode::RateLimited => rule(Medium, User, S::RateLimitBackoff, false, N::User),
        ErrorCode::MemoryExhausted => rule(High, System, S::BatchSizeReduction, false, N::Admin),
        ErrorCode::CircuitOpen => rule(Medium, User, S::CircuitBreakerFallback, false, N::User),
        ErrorCode::DependencyTimeout | ErrorCode::Transient => rule(Low, User, S::Retry, false, N::Minimal),
        ErrorCode::ValidationFailed
        | ErrorCode::InvalidFingerprint
        | ErrorCode::InvalidEmbedding
        | ErrorCode::InvalidWeights
        | ErrorCode::SearchQueryInvalid
        | ErrorCode::ContentTooLarge
        | ErrorCode::ConfigInvalid
        | ErrorCode::ConfigMissingRequired
        | ErrorCode::UnknownDependency => rule(Low, User, S::None, false, N::User),
        ErrorCode::DatabaseError
        | ErrorCode::StorageError
        | ErrorCode::SerializationError
        | ErrorCode::IoError
        | ErrorCode::InternalError => rule(High, System, S::None, true, N::Admin),
    }
}

/// Maps failures to [`Classification`]s.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify `error` in `context`.
    pub fn classify(&self, error: &RsError, context: &ErrorContext) -> Classification {
        let code = error.code();
        let dependency = error.dependency().or(context.dependency.as_deref());

        let mut rule = base_rule(code);

        // A refused connection to anything but the database is an outage of
        // that service, not a database outage.
        if code == ErrorCode::ConnectionFailed && dependency.is_some_and(|d| d != "database") {
            rule = SERVICE_UNAVAILABLE;
        }

        let external_failure = matches!(
            code,
            ErrorCode::ServiceUnavailable | ErrorCode::DependencyTimeout | ErrorCode::ConnectionFailed
        ) && rule.strategy != RecoveryStrategy::ReconnectDatabase;
        if external_failure && context.consecutive_failures >= self.config.repeated_failure_threshold {
            rule = REPEATED_SERVICE_FAILURE;
        }

        if code == ErrorCode::VectorIndexDegraded
            && context.consecutive_failures >= self.config.degraded_index_failure_threshold
        {
            rule.severity = Severity::Medium;
        }

        if code == ErrorCode::MemoryExhausted {
            rule.escalate = !self.can_halve(context.batch_size);
        }

        let mut severity = rule.severity;
        if self.history_is_reassuring(context) {
            severity = severity.lowered();
        }

        let classification = Classification {
            error_code: code,
            severity,
            impact_scope: rule.scope,
            recovery_strategy: rule.strategy,
            escalation_required: rule.escalate,
            user_notification_level: rule.notify,
        };
        tracing::debug!(
            code = %code,
            dependency = dependency.unwrap_or("-"),
            severity = %classification.severity,
            strategy = classification.recovery_strategy.as_str(),
            "classified error"
        );
        classification
    }

    /// Whether `batch_size` can be halved without going below the floor.
    pub fn can_halve(&self, batch_size: Option<usize>) -> bool {
        batch_size.is_some_and(|size| size / 2 >= self.config.min_batch_size.max(1))
    }

    fn history_is_reassuring(&self, context: &ErrorContext) -> bool {
        let Some(history) = context.recovery_history else {
            return false;
        };
        history.attempts >= self.config.history_min_attempts
            && history.success_ratio() >= self.config.history_min_success_ratio
            && history.average_recovery_time()
                <= Duration::from_secs(self.config.history_max_avg_recovery_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::context::RecoveryHistory;

    fn db_down() -> RsError {
        RsError::Connectivity {
            dependency: "database".into(),
            message: "connection refused".into(),
        }
    }

    fn api_down() -> RsError {
        RsError::ServiceUnavailable {
            dependency: "embedding_api".into(),
            message: "503".into(),
        }
    }

    fn good_history() -> RecoveryHistory {
        RecoveryHistory {
            attempts: 5,
            successes: 5,
            total_recovery_ms: 5_000,
        }
    }

    #[test]
    fn database_connectivity_is_critical_and_escalates() {
        let c = ErrorClassifier::default().classify(&db_down(), &ErrorContext::default());
        assert_eq!(c.severity, Severity::Critical);
        assert!(c.escalation_required);
        assert_eq!(c.impact_scope, ImpactScope::System);
        assert_eq!(c.recovery_strategy, RecoveryStrategy::ReconnectDatabase);
        assert_eq!(c.user_notification_level, NotificationLevel::Admin);
    }

    #[test]
    fn service_unavailable_is_medium_without_escalation() {
        let c = ErrorClassifier::default().classify(&api_down(), &ErrorContext::default());
        assert_eq!(c.severity, Severity::Medium);
        assert!(!c.escalation_required);
        assert_eq!(c.recovery_strategy, RecoveryStrategy::GracefulFallback);
        assert_eq!(c.user_notification_level, NotificationLevel::User);
    }

    #[test]
    fn non_database_connectivity_is_a_service_outage() {
        let err = RsError::Connectivity {
            dependency: "embedding_api".into(),
            message: "dns".into(),
        };
        let c = ErrorClassifier::default().classify(&err, &ErrorContext::default());
        assert_eq!(c.severity, Severity::Medium);
        assert_eq!(c.recovery_strategy, RecoveryStrategy::GracefulFallback);
    }

    #[test]
    fn repeated_service_failures_escalate_to_breaker_fallback() {
        let ctx = ErrorContext::default().with_consecutive_failures(5);
        let c = ErrorClassifier::default().classify(&api_down(), &ctx);
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.recovery_strategy, RecoveryStrategy::CircuitBreakerFallback);
        assert!(c.escalation_required);
        assert_eq!(c.user_notification_level, NotificationLevel::Admin);

        let ctx = ErrorContext::default().with_consecutive_failures(4);
        let c = ErrorClassifier::default().classify(&api_down(), &ctx);
        assert_eq!(c.recovery_strategy, RecoveryStrategy::GracefulFallback);
    }

    #[test]
    fn degraded_index_rises_with_consecutive_failures() {
        let err = RsError::DegradedIndex("stale".into());
        let classifier = ErrorClassifier::default();
        let c = classifier.classify(&err, &ErrorContext::default());
        assert_eq!(c.severity, Severity::Low);
        assert_eq!(c.user_notification_level, NotificationLevel::Minimal);
        let c = classifier.classify(&err, &ErrorContext::default().with_consecutive_failures(3));
        assert_eq!(c.severity, Severity::Medium);
    }

    #[test]
    fn memory_escalates_only_when_batch_is_minimal() {
        let err = RsError::MemoryExhausted("oom".into());
        let classifier = ErrorClassifier::default();
        let c = classifier.classify(&err, &ErrorContext::default().with_batch_size(64));
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.recovery_strategy, RecoveryStrategy::BatchSizeReduction);
        assert!(!c.escalation_required);

        let c = classifier.classify(&err, &ErrorContext::default().with_batch_size(1));
        assert!(c.escalation_required);
        let c = classifier.classify(&err, &ErrorContext::default());
        assert!(c.escalation_required);
    }

    #[test]
    fn good_history_lowers_severity_one_tier() {
        let classifier = ErrorClassifier::default();
        let ctx = ErrorContext::default().with_history(good_history());
        assert_eq!(classifier.classify(&api_down(), &ctx).severity, Severity::Low);
        assert_eq!(classifier.classify(&db_down(), &ctx).severity, Severity::High);
    }

    #[test]
    fn weak_history_does_not_lower_severity() {
        let classifier = ErrorClassifier::default();
        let too_few = RecoveryHistory {
            attempts: 2,
            successes: 2,
            total_recovery_ms: 100,
        };
        let slow = RecoveryHistory {
            attempts: 4,
            successes: 4,
            total_recovery_ms: 80_000,
        };
        let flaky = RecoveryHistory {
            attempts: 10,
            successes: 7,
            total_recovery_ms: 1_000,
        };
        for history in [too_few, slow, flaky] {
            let ctx = ErrorContext::default().with_history(history);
            assert_eq!(classifier.classify(&api_down(), &ctx).severity, Severity::Medium);
        }
    }

    #[test]
    fn every_code_classifies() {
        let classifier = ErrorClassifier::default();
        for code in ErrorCode::all() {
            let rule = base_rule(code);
            if rule.escalate {
                assert_eq!(rule.notify, NotificationLevel::Admin, "{code:?}");
            }
        }
        let c = classifier.classify(
            &RsError::CircuitOpen {
                dependency: "vector_index".into(),
            },
            &ErrorContext::default(),
        );
        assert_eq!(c.recovery_strategy, RecoveryStrategy::CircuitBreakerFallback);
    }
}
