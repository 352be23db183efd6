//! Lexical query compilation.
//!
//! Free text becomes a [`LexicalExpr`] tree that renders to PostgreSQL
//! `tsquery` syntax:
//!
//! - `"quoted phrases"` become proximity chains (`a <-> b`), OR'd together
//! - remaining words are AND'd, with `AND`/`OR`/`NOT` passed through as
//!   operators and a `:*` prefix marker when stemming is on
//! - phrases and words are AND'd; empty input matches everything
//!
//! ```text
//! "hello world" foo   ──▶   (hello <-> world) & foo:*
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::search::text::{self, TextConfig};

/// Double-quoted phrases.
static PHRASE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("phrase pattern is valid"));

/// Characters with meaning in tsquery syntax.
const TSQUERY_SPECIALS: &[char] = &['&', '|', '!', '(', ')', ':', '*', '<', '>', '\\', '"'];

/// Parsed lexical query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LexicalExpr {
    MatchAll,
    Term(String),
    Prefix(String),
    Phrase(Vec<String>),
    Not(Box<LexicalExpr>),
    And(Vec<LexicalExpr>),
    Or(Vec<LexicalExpr>),
}

/// Binding strength, loosest first. Mirrors tsquery precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Or,
    And,
    Not,
    Atom,
}

impl LexicalExpr {
    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::MatchAll)
    }

    /// AND of `parts`, collapsing trivial cases.
    fn and(mut parts: Vec<Self>) -> Self {
        match parts.len() {
            0 => Self::MatchAll,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    fn or(mut parts: Vec<Self>) -> Self {
        match parts.len() {
            0 => Self::MatchAll,
            1 => parts.remove(0),
            _ => Self::Or(parts),
        }
    }

    fn precedence(&self) -> Precedence {
        match self {
            Self::Or(_) => Precedence::Or,
            Self::And(_) => Precedence::And,
            Self::Not(_) => Precedence::Not,
            Self::MatchAll | Self::Term(_) | Self::Prefix(_) | Self::Phrase(_) => Precedence::Atom,
        }
    }

    /// Render as tsquery text. `MatchAll` renders empty.
    pub fn to_tsquery(&self) -> String {
        match self {
            Self::MatchAll => String::new(),
            Self::Term(word) => word.clone(),
            Self::Prefix(word) => format!("{word}:*"),
            Self::Phrase(words) => format!("({})", words.join(" <-> ")),
            Self::Not(inner) => format!("!{}", inner.render_child(Precedence::Not)),
            Self::And(parts) => parts
                .iter()
                .map(|p| p.render_child(Precedence::And))
                .collect::<Vec<_>>()
                .join(" & "),
            Self::Or(parts) => parts
                .iter()
                .map(|p| p.render_child(Precedence::Or))
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    fn render_child(&self, parent: Precedence) -> String {
        let rendered = self.to_tsquery();
        if self.precedence() < parent {
            format!("({rendered})")
        } else {
            rendered
        }
    }
}

impl std::fmt::Display for LexicalExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_tsquery())
    }
}

/// Make a word safe as a tsquery lexeme.
///
/// Operator characters are stripped. A word that still contains whitespace
/// or a quote is wrapped in single quotes with inner quotes doubled.
pub fn escape_term(word: &str) -> Option<String> {
    let stripped: String = word.chars().filter(|c| !TSQUERY_SPECIALS.contains(c)).collect();
    let stripped = stripped.trim();
    if stripped.is_empty() || stripped.chars().all(|c| c == '\'') {
        return None;
    }
    if stripped.contains(|c: char| c.is_whitespace() || c == '\'') {
        Some(format!("'{}'", stripped.replace('\'', "''")))
    } else {
        Some(stripped.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Or,
    Not,
}

fn operator(word: &str) -> Option<Operator> {
    match word.to_uppercase().as_str() {
        "AND" => Some(Operator::And),
        "OR" => Some(Operator::Or),
        "NOT" => Some(Operator::Not),
        _ => None,
    }
}

/// Compiles search text into [`LexicalExpr`] trees.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    text: TextConfig,
    stemming: bool,
}

impl QueryCompiler {
    pub fn new(text: TextConfig, stemming: bool) -> Self {
        Self { text, stemming }
    }

    pub fn compile(&self, input: &str) -> LexicalExpr {
        let cleaned = text::strip_control(&text::strip_tags(input));

        let phrases: Vec<LexicalExpr> = PHRASE_REGEX
            .captures_iter(&cleaned)
            .filter_map(|cap| self.phrase(cap.get(1).map_or("", |m| m.as_str())))
            .collect();
        let remainder = PHRASE_REGEX.replace_all(&cleaned, " ");
        let words = self.words(&remainder);

        match (phrases.is_empty(), words) {
            (true, None) => LexicalExpr::MatchAll,
            (true, Some(words)) => words,
            (false, None) => LexicalExpr::or(phrases),
            (false, Some(words)) => LexicalExpr::and(vec![LexicalExpr::or(phrases), words]),
        }
    }

    fn phrase(&self, body: &str) -> Option<LexicalExpr> {
        let words: Vec<String> = body
            .split_whitespace()
            .filter(|w| self.text.keeps_word(w))
            .filter_map(escape_term)
            .collect();
        (!words.is_empty()).then_some(LexicalExpr::Phrase(words))
    }

    fn term(&self, word: &str) -> Option<LexicalExpr> {
        if !self.text.keeps_word(word) {
            return None;
        }
        let escaped = escape_term(word)?;
        Some(if self.stemming {
            LexicalExpr::Prefix(escaped)
        } else {
            LexicalExpr::Term(escaped)
        })
    }

    /// Words with boolean operators: `a b` and `a AND b` are AND, `a OR b`
    /// is OR (binding looser than AND), `NOT a` negates the next term.
    /// Dangling operators are dropped.
    fn words(&self, remainder: &str) -> Option<LexicalExpr> {
        let mut groups: Vec<Vec<LexicalExpr>> = vec![Vec::new()];
        let mut negate = false;

        for word in remainder.split_whitespace() {
            match operator(word) {
                Some(Operator::And) => {}
                Some(Operator::Or) => {
                    if groups.last().is_some_and(|g| !g.is_empty()) {
                        groups.push(Vec::new());
                    }
                }
                Some(Operator::Not) => negate = !negate,
                None => {
                    let Some(term) = self.term(word) else {
                        continue;
                    };
                    let term = if negate {
                        LexicalExpr::Not(Box::new(term))
                    } else {
                        term
                    };
                    negate = false;
                    if let Some(group) = groups.last_mut() {
                        group.push(term);
                    }
                }
            }
        }

        let alternatives: Vec<LexicalExpr> = groups
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(LexicalExpr::and)
            .collect();
        (!alternatives.is_empty()).then(|| LexicalExpr::or(alternatives))
    }
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(TextConfig::default(), true)
    }
}
