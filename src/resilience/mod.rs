//! Resilience engine
//!
//! Keeps unreliable dependencies (database, embedding API, vector index) from
//! turning transient failures into outages.
//!
//! ```text
//!   caller ──▶ CircuitBreaker::execute ──▶ dependency
//!                    │ failure
//!                    ▼
//!             ErrorClassifier ──┬──▶ ErrorRecoveryService
//!                               └──▶ DegradationMessageService
//! ```

pub mod circuit_breaker;
pub mod classifier;
pub mod context;
pub mod degradation;
pub mod health;
pub mod recovery;
pub mod registry;

pub use circuit_breaker::{
    CallContext, CallMetric, CallResult, CircuitBreaker, CircuitBreakerConfig, CircuitRecord, CircuitState,
    CircuitStatistics,
};
pub use classifier::{
    Classification, ClassifierConfig, ErrorClassifier, ImpactScope, NotificationLevel, RecoveryStrategy, Severity,
};
pub use context::{DegradedMode, ErrorContext, RecoveryHistory};
pub use degradation::{DegradationMessage, DegradationMessageService, MessageIcon, ServiceStatus, StatusReport};
pub use health::{HealthCheck, HealthProbe, HealthStatus, HealthThresholds};
pub use recovery::{ErrorRecoveryService, Reconnect, RecoveryConfig, RecoveryOutcome, RetryConfig, with_retry, with_retry_if};
pub use registry::{CircuitBreakerRegistry, DEFAULT_DEPENDENCIES};
