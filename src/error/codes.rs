//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Dependency errors (remote services, circuit breakers)
//! - 2xx: Index errors
//! - 3xx: Config errors
//! - 4xx: Search errors
//! - 5xx: Network errors
//! - 6xx: Storage errors
//! - 7xx: Resource errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors
//!
//! The code is the error *kind*: classification, the breaker's expected-error
//! allow-list and degradation message templates are all keyed by it.

use serde::{Deserialize, Serialize};

/// Standardized error codes.
///
/// Each variant maps to a numeric code (e.g., `ServiceUnavailable` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Dependency errors (1xx)
    // ========================================
    /// E101: External service answered with an outage or refused the call
    ServiceUnavailable,
    /// E102: Circuit breaker is open; the call was not attempted
    CircuitOpen,
    /// E103: External service is throttling requests
    RateLimited,
    /// E104: Call exceeded its configured timeout
    DependencyTimeout,
    /// E105: Dependency id is not in the known set
    UnknownDependency,

    // ========================================
    // Index errors (2xx)
    // ========================================
    /// E201: Vector index answers but is degraded (stale, partial, rebuilding)
    VectorIndexDegraded,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file has invalid syntax or values
    ConfigInvalid,
    /// E302: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Search errors (4xx)
    // ========================================
    /// E401: Search query could not be compiled
    SearchQueryInvalid,
    /// E402: Search content exceeds the size ceiling
    ContentTooLarge,

    // ========================================
    // Network errors (5xx)
    // ========================================
    /// E501: Cannot connect to a dependency
    ConnectionFailed,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Database operation failed
    DatabaseError,
    /// E602: Key/value store operation failed
    StorageError,
    /// E603: Serialization/deserialization failed
    SerializationError,

    // ========================================
    // Resource errors (7xx)
    // ========================================
    /// E701: Process ran out of memory for the requested work
    MemoryExhausted,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Generic validation failure
    ValidationFailed,
    /// E802: Content fingerprint has the wrong format
    InvalidFingerprint,
    /// E803: Embedding vector is empty or non-finite
    InvalidEmbedding,
    /// E804: Hybrid weights do not sum to 1.0
    InvalidWeights,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: Unexpected internal error
    InternalError,
    /// E902: Transient failure, retry is expected to succeed
    Transient,
    /// E903: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ServiceUnavailable` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::ServiceUnavailable => 101,
            Self::CircuitOpen => 102,
            Self::RateLimited => 103,
            Self::DependencyTimeout => 104,
            Self::UnknownDependency => 105,

            Self::VectorIndexDegraded => 201,

            Self::ConfigInvalid => 301,
            Self::ConfigMissingRequired => 302,

            Self::SearchQueryInvalid => 401,
            Self::ContentTooLarge => 402,

            Self::ConnectionFailed => 501,

            Self::DatabaseError => 601,
            Self::StorageError => 602,
            Self::SerializationError => 603,

            Self::MemoryExhausted => 701,

            Self::ValidationFailed => 801,
            Self::InvalidFingerprint => 802,
            Self::InvalidEmbedding => 803,
            Self::InvalidWeights => 804,

            Self::InternalError => 901,
            Self::Transient => 902,
            Self::IoError => 903,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default operator-facing suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "The remote service is unavailable. Results fall back to keyword search until it recovers",
            Self::CircuitOpen => "Calls are short-circuited while the breaker cools down. Run `rsx breakers` to inspect state",
            Self::RateLimited => "Requests are being throttled. Reduce request volume or wait for the retry window",
            Self::DependencyTimeout => "The dependency answered too slowly. Check its latency or raise the breaker timeout",
            Self::UnknownDependency => "Add the dependency to `breaker.known_dependencies` in the config file",

            Self::VectorIndexDegraded => "The vector index is degraded. Reindex embeddings or serve keyword results meanwhile",

            Self::ConfigInvalid => "Run `rsx config` to see current values. Check TOML syntax in config file",
            Self::ConfigMissingRequired => "Set the missing value in the config file or via its RSX_* environment variable",

            Self::SearchQueryInvalid => "Check query syntax. Use quotes for phrases and AND/OR/NOT for boolean logic",
            Self::ContentTooLarge => "Shorten the search input or raise `search.max_content_bytes`",

            Self::ConnectionFailed => "Check that the database is running and reachable from this host",

            Self::DatabaseError => "Run `rsx health` to check database health",
            Self::StorageError => "Check permissions and free space for the state store directory",
            Self::SerializationError => "Stored state may be corrupted. Reset the affected breaker with `rsx breakers --reset`",

            Self::MemoryExhausted => "Lower the batch size or give the process more memory",

            Self::ValidationFailed => "Review the input and fix the reported field",
            Self::InvalidFingerprint => "Cache keys must be 64-character lowercase hex SHA-256 digests",
            Self::InvalidEmbedding => "Embeddings must be non-empty and contain only finite numbers",
            Self::InvalidWeights => "text_weight and vector_weight must sum to 1.0",

            Self::InternalError => "An unexpected error occurred. Please report this issue with full error output",
            Self::Transient => "Temporary failure. Retrying shortly should succeed",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable without operator action.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::ServiceUnavailable
            | Self::CircuitOpen
            | Self::RateLimited
            | Self::DependencyTimeout
            | Self::VectorIndexDegraded
            | Self::SearchQueryInvalid
            | Self::ContentTooLarge
            | Self::ConnectionFailed
            | Self::MemoryExhausted
            | Self::ValidationFailed
            | Self::InvalidFingerprint
            | Self::InvalidEmbedding
            | Self::InvalidWeights
            | Self::Transient => true,

            Self::UnknownDependency
            | Self::ConfigInvalid
            | Self::ConfigMissingRequired
            | Self::DatabaseError
            | Self::StorageError
            | Self::SerializationError
            | Self::InternalError
            | Self::IoError => false,
        }
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "dependency",
            2 => "index",
            3 => "config",
            4 => "search",
            5 => "network",
            6 => "storage",
            7 => "resource",
            8 => "validation",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ServiceUnavailable,
            Self::CircuitOpen,
            Self::RateLimited,
            Self::DependencyTimeout,
            Self::UnknownDependency,
            Self::VectorIndexDegraded,
            Self::ConfigInvalid,
            Self::ConfigMissingRequired,
            Self::SearchQueryInvalid,
            Self::ContentTooLarge,
            Self::ConnectionFailed,
            Self::DatabaseError,
            Self::StorageError,
            Self::SerializationError,
            Self::MemoryExhausted,
            Self::ValidationFailed,
            Self::InvalidFingerprint,
            Self::InvalidEmbedding,
            Self::InvalidWeights,
            Self::InternalError,
            Self::Transient,
            Self::IoError,
        ]
        .into_iter()
    }

    /// Parse a code from either its `E101` form or its serialized name.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Some(digits) = trimmed.strip_prefix('E') {
            if let Ok(numeric) = digits.parse::<u16>() {
                return Self::all().find(|code| code.numeric() == numeric);
            }
        }
        let upper = trimmed.to_uppercase();
        serde_json::from_value(serde_json::Value::String(upper)).ok()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
