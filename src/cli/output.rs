use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::{ErrorCode, Result, RsError, StructuredError};
use crate::resilience::{CircuitState, HealthStatus, MessageIcon};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable formatted output with colors (default)
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
}

/// Envelope for JSON output.
#[derive(Serialize)]
pub struct JsonResponse<T> {
    pub status: ResponseStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error {
        code: ErrorCode,
        /// e.g. `E501`
        code_string: String,
        numeric_code: u16,
        message: String,
        suggestion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
        recoverable: bool,
        category: String,
    },
}

impl From<StructuredError> for ResponseStatus {
    fn from(err: StructuredError) -> Self {
        Self::Error {
            code: err.code,
            code_string: err.code.code_string(),
            numeric_code: err.numeric_code,
            message: err.message,
            suggestion: err.suggestion,
            context: err.context,
            recoverable: err.recoverable,
            category: err.category,
        }
    }
}

pub fn json_ok<T: Serialize>(data: T) -> JsonResponse<T> {
    JsonResponse {
        status: ResponseStatus::Ok,
        timestamp: Utc::now(),
        version: crate::VERSION.to_string(),
        data,
        warnings: Vec::new(),
    }
}

pub fn json_error(err: &RsError) -> JsonResponse<serde_json::Value> {
    JsonResponse {
        status: err.to_structured().into(),
        timestamp: Utc::now(),
        version: crate::VERSION.to_string(),
        data: serde_json::Value::Null,
        warnings: Vec::new(),
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 20,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        let padded = format!("{key:width$}", width = self.key_width);
        self.lines.push(format!("{} {value}", padded.dimmed()));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn push_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

pub fn paint_state(state: CircuitState) -> String {
    match state {
        CircuitState::Closed => state.as_str().green().to_string(),
        CircuitState::HalfOpen => state.as_str().yellow().to_string(),
        CircuitState::Open => state.as_str().red().bold().to_string(),
    }
}

pub fn paint_health(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => status.as_str().green().to_string(),
        HealthStatus::Warning => status.as_str().yellow().to_string(),
        HealthStatus::Critical => status.as_str().red().bold().to_string(),
    }
}

pub fn icon_glyph(icon: MessageIcon) -> String {
    match icon {
        MessageIcon::Info => "i".blue().to_string(),
        MessageIcon::Warning => "!".yellow().bold().to_string(),
        MessageIcon::Error => "x".red().bold().to_string(),
    }
}
