//! Context-aware error suggestions.
//!
//! Complements the static suggestions in the `codes` module with hints that
//! name the affected dependency or limit when the error carries one.

use serde_json::Value;

use super::codes::ErrorCode;

/// Generate a context-aware suggestion for an error.
///
/// Falls back to [`ErrorCode::suggestion`] when the context lacks the
/// fields a specific hint needs.
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::CircuitOpen => suggest_circuit_open(context),
        ErrorCode::RateLimited => suggest_rate_limited(context),
        ErrorCode::DependencyTimeout => suggest_timeout(context),
        ErrorCode::UnknownDependency => suggest_unknown_dependency(context),
        ErrorCode::ContentTooLarge => suggest_content_too_large(context),
        ErrorCode::ConfigMissingRequired => suggest_config_missing_required(context),
        _ => code.suggestion().to_string(),
    }
}

fn dependency(context: Option<&Value>) -> Option<&str> {
    context
        .and_then(|c| c.get("dependency"))
        .and_then(Value::as_str)
}

fn suggest_circuit_open(context: Option<&Value>) -> String {
    match dependency(context) {
        Some(dep) => format!(
            "Circuit for '{dep}' is open and calls are short-circuited. Try:\n  - `rsx breakers` to see when it will probe again\n  - `rsx breakers --reset {dep}` once the dependency is healthy"
        ),
        None => ErrorCode::CircuitOpen.suggestion().to_string(),
    }
}

fn suggest_rate_limited(context: Option<&Value>) -> String {
    let retry_after = context
        .and_then(|c| c.get("retry_after_secs"))
        .and_then(Value::as_f64);

    match (dependency(context), retry_after) {
        (Some(dep), Some(secs)) => {
            format!("'{dep}' is throttling requests. Retry after {secs:.0}s or reduce request volume")
        }
        (Some(dep), None) => format!("'{dep}' is throttling requests. Reduce request volume and retry later"),
        _ => ErrorCode::RateLimited.suggestion().to_string(),
    }
}

fn suggest_timeout(context: Option<&Value>) -> String {
    let limit = context
        .and_then(|c| c.get("limit_ms"))
        .and_then(Value::as_u64);

    match (dependency(context), limit) {
        (Some(dep), Some(limit)) => format!(
            "'{dep}' took longer than {limit}ms. Check its latency, or raise `breaker.dependencies.{dep}.timeout_ms`"
        ),
        _ => ErrorCode::DependencyTimeout.suggestion().to_string(),
    }
}

fn suggest_unknown_dependency(context: Option<&Value>) -> String {
    match dependency(context) {
        Some(dep) => format!(
            "'{dep}' is not a known dependency. Add it to `breaker.known_dependencies` or fix the id"
        ),
        None => ErrorCode::UnknownDependency.suggestion().to_string(),
    }
}

fn suggest_content_too_large(context: Option<&Value>) -> String {
    let size = context.and_then(|c| c.get("size")).and_then(Value::as_u64);
    let limit = context.and_then(|c| c.get("limit")).and_then(Value::as_u64);

    match (size, limit) {
        (Some(size), Some(limit)) => format!(
            "Input is {size} bytes but the limit is {limit}. Shorten it or raise `search.max_content_bytes`"
        ),
        _ => ErrorCode::ContentTooLarge.suggestion().to_string(),
    }
}

fn suggest_config_missing_required(context: Option<&Value>) -> String {
    match context
        .and_then(|c| c.get("config_key"))
        .and_then(Value::as_str)
    {
        Some(key) => format!("Set `{key}` in the config file or its RSX_* environment variable"),
        None => ErrorCode::ConfigMissingRequired.suggestion().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn circuit_open_names_dependency() {
        let s = suggest_for_error(ErrorCode::CircuitOpen, Some(&json!({ "dependency": "database" })));
        assert!(s.contains("rsx breakers --reset database"));
    }

    #[test]
    fn rate_limited_mentions_retry_window() {
        let ctx = json!({ "dependency": "embedding_api", "retry_after_secs": 12.0 });
        let s = suggest_for_error(ErrorCode::RateLimited, Some(&ctx));
        assert!(s.contains("12s"));
    }

    #[test]
    fn falls_back_to_static_suggestion() {
        let s = suggest_for_error(ErrorCode::CircuitOpen, None);
        assert_eq!(s, ErrorCode::CircuitOpen.suggestion());

        let s = suggest_for_error(ErrorCode::InternalError, Some(&json!({})));
        assert_eq!(s, ErrorCode::InternalError.suggestion());
    }

    #[test]
    fn content_too_large_reports_sizes() {
        let ctx = json!({ "size": 2048, "limit": 1024 });
        let s = suggest_for_error(ErrorCode::ContentTooLarge, Some(&ctx));
        assert!(s.contains("2048") && s.contains("1024"));
    }
}
