//! User-facing degradation messages.
//!
//! Messages are built from the error code and its classification only; the
//! raw error text never reaches users. Admin-level messages add the error code
//! and category so operators can find the failure in logs.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, RsError};
use crate::resilience::classifier::{Classification, ErrorClassifier, NotificationLevel, RecoveryStrategy, Severity};
use crate::resilience::context::ErrorContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIcon {
    Info,
    Warning,
    Error,
}

impl MessageIcon {
    pub const fn for_level(level: NotificationLevel) -> Self {
        match level {
            NotificationLevel::Minimal => Self::Info,
            NotificationLevel::User => Self::Warning,
            NotificationLevel::Admin => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradationMessage {
    pub title: String,
    pub message: String,
    pub icon: MessageIcon,
    pub alternatives: Vec<String>,
    pub estimated_resolution: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Operational,
    Degraded,
}

/// Aggregate view over several concurrent failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ServiceStatus,
    pub total_issues: usize,
    pub affected_features: Vec<String>,
    pub title: String,
    pub highest_severity: Option<Severity>,
    pub messages: Vec<DegradationMessage>,
}

/// Template text for one family of failures.
struct Template {
    title: &'static str,
    message: &'static str,
    alternatives: &'static [&'static str],
    features: &'static [&'static str],
}

const DATABASE: Template = Template {
    title: "Search temporarily unavailable",
    message: "We can't reach the search database right now. Your query could not be completed.",
    alternatives: &[
        "Try again in a few minutes",
        "Browse content by category instead",
    ],
    features: &["search", "indexing"],
};

const SEMANTIC: Template = Template {
    title: "Smart search is limited",
    message: "Meaning-based matching is temporarily unavailable. Results are based on keywords only.",
    alternatives: &[
        "Use specific keywords that appear in the content",
        "Put exact phrases in double quotes",
        "Try again later for meaning-based results",
    ],
    features: &["semantic search"],
};

const INDEX: Template = Template {
    title: "Search results may be incomplete",
    message: "Part of the search index is being refreshed. Some recent content may not appear yet.",
    alternatives: &[
        "Refine your query with additional keywords",
        "Check back shortly for complete results",
    ],
    features: &["semantic search"],
};

const RATE_LIMIT: Template = Template {
    title: "Search is busy",
    message: "Search is handling a lot of requests. Results may take a little longer or use keywords only.",
    alternatives: &[
        "Wait a moment before searching again",
        "Use keyword search for faster results",
    ],
    features: &["semantic search"],
};

const CAPACITY: Template = Template {
    title: "Indexing is running slower",
    message: "Content processing is running with reduced capacity. New content may take longer to become searchable.",
    alternatives: &[
        "Existing content remains searchable",
        "Check back later for newly added content",
    ],
    features: &["indexing"],
};

const QUERY: Template = Template {
    title: "We couldn't understand that search",
    message: "Your search could not be processed as entered.",
    alternatives: &[
        "Check spelling and remove special characters",
        "Use AND, OR and NOT in capitals to combine terms",
        "Shorten very long queries",
    ],
    features: &[],
};

const TRANSIENT: Template = Template {
    title: "Search hiccup",
    message: "Something went briefly wrong while searching. It should resolve on its own.",
    alternatives: &["Run the search again"],
    features: &["search"],
};

const INTERNAL: Template = Template {
    title: "Search is experiencing problems",
    message: "An unexpected problem is affecting search. The site team has been notified.",
    alternatives: &[
        "Try again later",
        "Contact support if the problem continues",
    ],
    features: &["search"],
};

fn template(code: ErrorCode, dependency: Option<&str>) -> &'static Template {
    match code {
        ErrorCode::ConnectionFailed if dependency.is_none_or(|d| d == "database") => &DATABASE,
        ErrorCode::DatabaseError => &DATABASE,
        ErrorCode::ConnectionFailed | ErrorCode::ServiceUnavailable | ErrorCode::DependencyTimeout => &SEMANTIC,
        ErrorCode::CircuitOpen => match dependency {
            Some("database") => &DATABASE,
            Some("vector_index") => &INDEX,
            _ => &SEMANTIC,
        },
        ErrorCode::VectorIndexDegraded => &INDEX,
        ErrorCode::RateLimited => &RATE_LIMIT,
        ErrorCode::MemoryExhausted => &CAPACITY,
        ErrorCode::SearchQueryInvalid
        | ErrorCode::ContentTooLarge
        | ErrorCode::ValidationFailed
        | ErrorCode::InvalidFingerprint
        | ErrorCode::InvalidEmbedding
        | ErrorCode::InvalidWeights => &QUERY,
        ErrorCode::Transient => &TRANSIENT,
        ErrorCode::UnknownDependency
        | ErrorCode::ConfigInvalid
        | ErrorCode::ConfigMissingRequired
        | ErrorCode::StorageError
        | ErrorCode::SerializationError
        | ErrorCode::IoError
        | ErrorCode::InternalError => &INTERNAL,
    }
}

fn estimated_resolution(classification: &Classification) -> &'static str {
    match classification.recovery_strategy {
        RecoveryStrategy::RateLimitBackoff | RecoveryStrategy::Retry => "Usually within a minute",
        RecoveryStrategy::GracefulFallback | RecoveryStrategy::CircuitBreakerFallback => {
            "Usually within a few minutes"
        }
        RecoveryStrategy::ReconnectDatabase => "Being worked on; typically 5 to 15 minutes",
        RecoveryStrategy::BatchSizeReduction => "Processing continues at reduced speed",
        RecoveryStrategy::None => match classification.severity {
            Severity::Low => "Try adjusting your search",
            Severity::Medium => "Usually within a few minutes",
            Severity::High | Severity::Critical => "Under investigation",
        },
    }
}

/// Builds degradation messages and status reports.
#[derive(Debug, Clone, Default)]
pub struct DegradationMessageService {
    classifier: ErrorClassifier,
}

impl DegradationMessageService {
    pub fn new(classifier: ErrorClassifier) -> Self {
        Self { classifier }
    }

    /// Message for one failure.
    pub fn generate_message(&self, error: &RsError, context: &ErrorContext) -> DegradationMessage {
        let classification = self.classifier.classify(error, context);
        let dependency = error.dependency().or(context.dependency.as_deref());
        self.message_for(error.code(), dependency, &classification)
    }

    fn message_for(&self, code: ErrorCode, dependency: Option<&str>, classification: &Classification) -> DegradationMessage {
        let template = template(code, dependency);
        let mut message = template.message.to_string();
        if classification.user_notification_level == NotificationLevel::Admin {
            message.push_str(&format!(" (ref {} / {})", code, code.category()));
        }

        let mut alternatives: Vec<String> = template.alternatives.iter().map(ToString::to_string).collect();
        if alternatives.is_empty() {
            alternatives.push("Try again later".to_string());
        }

        DegradationMessage {
            title: template.title.to_string(),
            message,
            icon: MessageIcon::for_level(classification.user_notification_level),
            alternatives,
            estimated_resolution: estimated_resolution(classification).to_string(),
        }
    }

    /// Aggregate report over concurrent failures.
    pub fn generate_status_report(&self, errors: &[RsError], context: &ErrorContext) -> StatusReport {
        let mut affected_features: Vec<String> = Vec::new();
        let mut messages = Vec::with_capacity(errors.len());
        let mut highest: Option<Severity> = None;

        for error in errors {
            let classification = self.classifier.classify(error, context);
            let dependency = error.dependency().or(context.dependency.as_deref());
            let code = error.code();
            for feature in template(code, dependency).features {
                if !affected_features.iter().any(|f| f == feature) {
                    affected_features.push((*feature).to_string());
                }
            }
            highest = highest.max(Some(classification.severity));
            messages.push(self.message_for(code, dependency, &classification));
        }

        let title = match highest {
            None => "All search features are operational",
            Some(Severity::Critical) => "Search is significantly degraded",
            Some(Severity::High) => "Search is partially degraded",
            Some(Severity::Medium | Severity::Low) => "Some search features are limited",
        };

        StatusReport {
            status: if errors.is_empty() {
                ServiceStatus::Operational
            } else {
                ServiceStatus::Degraded
            },
            total_issues: errors.len(),
            affected_features,
            title: title.to_string(),
            highest_severity: highest,
            messages,
        }
    }
}
