//! Text normalization for indexing and queries.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, RsError};

/// Markup tags and HTML comments.
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!][^<>]*>").expect("tag pattern is valid")
});

/// Word-length window and size ceiling applied to all text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub min_word_length: usize,
    pub max_word_length: usize,
    pub max_content_bytes: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            min_word_length: 2,
            max_word_length: 50,
            max_content_bytes: 1024 * 1024,
        }
    }
}

impl TextConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_word_length == 0 || self.min_word_length > self.max_word_length {
            return Err(RsError::Config(format!(
                "search word length window [{}, {}] is empty",
                self.min_word_length, self.max_word_length
            )));
        }
        if self.max_content_bytes == 0 {
            return Err(RsError::Config(
                "search.max_content_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a word's character count is inside the window.
    pub fn keeps_word(&self, word: &str) -> bool {
        let len = word.chars().count();
        len >= self.min_word_length && len <= self.max_word_length
    }
}

/// Reject content over the size ceiling.
pub fn check_size(text: &str, config: &TextConfig) -> Result<()> {
    if text.len() > config.max_content_bytes {
        return Err(RsError::ContentTooLarge {
            size: text.len(),
            limit: config.max_content_bytes,
        });
    }
    Ok(())
}

/// Decode raw bytes, rejecting oversized or non-UTF-8 input.
pub fn decode(bytes: &[u8], config: &TextConfig) -> Result<String> {
    if bytes.len() > config.max_content_bytes {
        return Err(RsError::ContentTooLarge {
            size: bytes.len(),
            limit: config.max_content_bytes,
        });
    }
    String::from_utf8(bytes.to_vec())
        .map_err(|err| RsError::Validation(format!("content is not valid UTF-8: {}", err.utf8_error())))
}

/// Replace markup tags with spaces.
pub fn strip_tags(text: &str) -> String {
    TAG_REGEX.replace_all(text, " ").into_owned()
}

/// Replace control characters (including newlines and tabs) with spaces.
pub fn strip_control(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Collapse runs of whitespace and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full pipeline: size check, NFC, tags, control characters, whitespace,
/// word-length window.
pub fn normalize(text: &str, config: &TextConfig) -> Result<String> {
    check_size(text, config)?;
    let composed: String = text.nfc().collect();
    let stripped = strip_control(&strip_tags(&composed));
    Ok(stripped
        .split_whitespace()
        .filter(|word| config.keeps_word(word))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
