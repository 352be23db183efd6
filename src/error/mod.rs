//! Error handling for resilient-search.
//!
//! This module provides:
//! - [`RsError`]: The main error enum for all operations
//! - [`ErrorCode`]: Standardized error codes, doubling as the error *kind*
//! - [`StructuredError`]: Rich error type with suggestion and context for CLI output

mod codes;
mod suggestions;

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;
pub use suggestions::suggest_for_error;

/// Main error type.
#[derive(Error, Debug)]
pub enum RsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Unknown dependency: {0}")]
    UnknownDependency(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid content fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Hybrid weights must sum to 1.0 (text_weight={text_weight}, vector_weight={vector_weight})")]
    InvalidWeights { text_weight: f32, vector_weight: f32 },

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Content too large: {size} bytes exceeds limit of {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("Cannot connect to {dependency}: {message}")]
    Connectivity { dependency: String, message: String },

    #[error("Service {dependency} unavailable: {message}")]
    ServiceUnavailable { dependency: String, message: String },

    #[error("Rate limited by {dependency}")]
    RateLimited {
        dependency: String,
        retry_after: Option<Duration>,
    },

    #[error("Memory exhausted: {0}")]
    MemoryExhausted(String),

    #[error("Vector index degraded: {0}")]
    DegradedIndex(String),

    #[error("Call to {dependency} timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        dependency: String,
        elapsed_ms: u64,
        limit_ms: u64,
    },

    #[error("Circuit open for {dependency}")]
    CircuitOpen { dependency: String },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RsError {
    /// Get the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::UnknownDependency(_) => ErrorCode::UnknownDependency,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::InvalidFingerprint(_) => ErrorCode::InvalidFingerprint,
            Self::InvalidEmbedding(_) => ErrorCode::InvalidEmbedding,
            Self::InvalidWeights { .. } => ErrorCode::InvalidWeights,
            Self::QueryParse(_) => ErrorCode::SearchQueryInvalid,
            Self::ContentTooLarge { .. } => ErrorCode::ContentTooLarge,
            Self::Connectivity { .. } => ErrorCode::ConnectionFailed,
            Self::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::MemoryExhausted(_) => ErrorCode::MemoryExhausted,
            Self::DegradedIndex(_) => ErrorCode::VectorIndexDegraded,
            Self::Timeout { .. } => ErrorCode::DependencyTimeout,
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::Transient(_) => ErrorCode::Transient,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Dependency the error is attributed to, when the variant carries one.
    #[must_use]
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::Connectivity { dependency, .. }
            | Self::ServiceUnavailable { dependency, .. }
            | Self::RateLimited { dependency, .. }
            | Self::Timeout { dependency, .. }
            | Self::CircuitOpen { dependency } => Some(dependency.as_str()),
            Self::UnknownDependency(id) => Some(id.as_str()),
            _ => None,
        }
    }

    /// Server-provided retry hint for rate-limited calls.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::CircuitOpen { dependency } => Some(serde_json::json!({ "dependency": dependency })),
            Self::Connectivity { dependency, .. } | Self::ServiceUnavailable { dependency, .. } => {
                Some(serde_json::json!({ "dependency": dependency }))
            }
            Self::RateLimited {
                dependency,
                retry_after,
            } => Some(serde_json::json!({
                "dependency": dependency,
                "retry_after_secs": retry_after.map(|d| d.as_secs_f64()),
            })),
            Self::Timeout {
                dependency,
                elapsed_ms,
                limit_ms,
            } => Some(serde_json::json!({
                "dependency": dependency,
                "elapsed_ms": elapsed_ms,
                "limit_ms": limit_ms,
            })),
            Self::UnknownDependency(id) => Some(serde_json::json!({ "dependency": id })),
            Self::ContentTooLarge { size, limit } => {
                Some(serde_json::json!({ "size": size, "limit": limit }))
            }
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_rs_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "CIRCUIT_OPEN")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 102)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable without operator action
    pub recoverable: bool,

    /// Error category (e.g., "dependency", "search")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from an `RsError`.
    #[must_use]
    pub fn from_rs_error(err: &RsError) -> Self {
        let code = err.code();
        let context = err.context();
        let suggestion = suggest_for_error(code, context.as_ref());

        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion,
            context,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self.suggestion = suggest_for_error(self.code, self.context.as_ref());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&RsError> for StructuredError {
    fn from(err: &RsError) -> Self {
        Self::from_rs_error(err)
    }
}

/// Result type alias using `RsError`.
pub type Result<T> = std::result::Result<T, RsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rs_error_code_mapping() {
        assert_eq!(
            RsError::CircuitOpen {
                dependency: "database".into()
            }
            .code(),
            ErrorCode::CircuitOpen
        );
        assert_eq!(RsError::Config("bad".into()).code(), ErrorCode::ConfigInvalid);
        assert_eq!(
            RsError::RateLimited {
                dependency: "embedding_api".into(),
                retry_after: None
            }
            .code(),
            ErrorCode::RateLimited
        );
    }

    #[test]
    fn test_dependency_and_retry_after() {
        let err = RsError::RateLimited {
            dependency: "embedding_api".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.dependency(), Some("embedding_api"));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(RsError::Transient("x".into()).dependency(), None);
    }

    #[test]
    fn test_structured_error_from_rs_error() {
        let err = RsError::CircuitOpen {
            dependency: "vector_index".into(),
        };
        let structured = StructuredError::from_rs_error(&err);

        assert_eq!(structured.code, ErrorCode::CircuitOpen);
        assert_eq!(structured.numeric_code, 102);
        assert!(structured.message.contains("vector_index"));
        assert!(structured.suggestion.contains("vector_index"));
        assert!(structured.recoverable);
        assert_eq!(structured.category, "dependency");
    }

    #[test]
    fn test_structured_error_serialization() {
        let err = StructuredError::new(ErrorCode::RateLimited, "slow down");
        let json = serde_json::to_string(&err).unwrap();

        assert!(json.contains("RATE_LIMITED"));
        assert!(json.contains("\"numeric_code\":103"));
        assert!(json.contains("\"recoverable\":true"));
        assert!(!json.contains("\"context\""));
    }

    #[test]
    fn test_structured_error_display() {
        let err = StructuredError::new(ErrorCode::ConnectionFailed, "refused");
        assert_eq!(format!("{err}"), "[E501] refused");
    }
}
