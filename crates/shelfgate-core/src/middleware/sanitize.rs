//! Recursive sanitization of request bodies and query strings.
//!
//! Strings are trimmed and then either HTML-escaped ([`SanitizeMode::Escape`]) or stripped
//! of markup ([`SanitizeMode::Html`]). Traversal uses an explicit stack and stops
//! descending at `max_depth`; strings nested deeper than that are left as they arrived.
//! Sanitization never rejects a request.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr, sync::LazyLock};

/// Nesting level past which containers are not descended into.
pub const MAX_SANITIZE_DEPTH: usize = 10;

static SCRIPT_OR_STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(script|style)\b[^>]*>.*?<\s*/\s*(script|style)\s*>")
        .expect("block pattern is valid")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeMode {
    /// Escape markup characters as HTML entities
    #[default]
    Escape,
    /// Remove tags, dropping script and style blocks with their content
    Html,
}

impl fmt::Display for SanitizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Escape => write!(f, "escape"),
            Self::Html => write!(f, "html"),
        }
    }
}

impl FromStr for SanitizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "escape" => Ok(Self::Escape),
            "html" => Ok(Self::Html),
            other => Err(format!("unknown sanitize mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    pub mode: SanitizeMode,
    pub max_depth: usize,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self { mode: SanitizeMode::default(), max_depth: MAX_SANITIZE_DEPTH }
    }
}

impl SanitizeOptions {
    #[must_use]
    pub fn with_mode(mode: SanitizeMode) -> Self {
        Self { mode, ..Self::default() }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(c),
        }
    }
    out
}

fn strip_html(input: &str) -> String {
    let without_blocks = SCRIPT_OR_STYLE_BLOCK.replace_all(input, "");
    TAG.replace_all(&without_blocks, "").trim().to_string()
}

/// Trims and sanitizes one string.
#[must_use]
pub fn sanitize_string(input: &str, mode: SanitizeMode) -> String {
    let trimmed = input.trim();
    match mode {
        SanitizeMode::Escape => escape_html(trimmed),
        SanitizeMode::Html => strip_html(trimmed),
    }
}

/// Sanitizes every string in `value` in place, down to `options.max_depth` levels.
pub fn sanitize_value(value: &mut Value, options: SanitizeOptions) {
    let mut stack: Vec<(&mut Value, usize)> = vec![(value, 0)];

    while let Some((current, depth)) = stack.pop() {
        match current {
            Value::String(s) => *s = sanitize_string(s, options.mode),
            Value::Array(items) if depth < options.max_depth => {
                stack.extend(items.iter_mut().map(|item| (item, depth + 1)));
            }
            Value::Object(map) if depth < options.max_depth => {
                stack.extend(map.values_mut().map(|item| (item, depth + 1)));
            }
            _ => {}
        }
    }
}

/// Sanitizes query parameter values in place. Keys are left as sent.
pub fn sanitize_query(pairs: &mut [(String, String)], mode: SanitizeMode) {
    for (_, value) in pairs.iter_mut() {
        *value = sanitize_string(value, mode);
    }
}
