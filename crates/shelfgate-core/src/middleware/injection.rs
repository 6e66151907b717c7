//! Pattern-based detection of SQL, script and NoSQL-operator injection payloads.
//!
//! Every string in the body and query is checked against three pattern families. Object
//! keys that start with `$` are treated as NoSQL operators. The first hit wins; the
//! detector reports the family and the location, never the payload itself.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::{fmt, sync::LazyLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionKind {
    Sql,
    Xss,
    NoSql,
}

impl fmt::Display for InjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql => write!(f, "sql"),
            Self::Xss => write!(f, "xss"),
            Self::NoSql => write!(f, "nosql"),
        }
    }
}

/// Where a payload was found, e.g. `body.author.name` or `query.search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionMatch {
    pub kind: InjectionKind,
    pub field: String,
}

static PATTERNS: LazyLock<Vec<(InjectionKind, Regex)>> = LazyLock::new(|| {
    let sql = [
        r"(?i)\bunion\b\s+(all\s+)?\bselect\b",
        r"(?i);\s*(drop|delete|insert|update|alter|truncate|create|exec)\b",
        r"(?i)\b(drop|truncate|alter)\s+(table|database|schema)\b",
        r"(?i)\binsert\s+into\b.+\bvalues\b",
        r"(?i)\bdelete\s+from\b",
        r#"(?i)['"]\s*(or|and)\s+['"]?[\w-]+['"]?\s*(=|<|>|like)\s*['"]?[\w-]+"#,
        r"(?i)\b(or|and)\s+\d+\s*=\s*\d+",
        r#"(?i)['"]\s*(--|#|/\*)"#,
        r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(",
        r"(?i)\bwaitfor\s+delay\b",
        r"(?i)\bexec(ute)?\s+(xp_|sp_)\w+",
    ];
    let xss = [
        r"(?i)<\s*script\b",
        r"(?i)<\s*/\s*script\s*>",
        r"(?i)javascript\s*:",
        r"(?i)vbscript\s*:",
        r"(?i)\bon(error|load|click|mouseover|mouseout|focus|blur|submit|change|keydown|keyup)\s*=",
        r"(?i)<\s*(iframe|object|embed|svg|applet|meta|base)\b",
        r"(?i)\bdocument\s*\.\s*(cookie|location|write)",
        r"(?i)\beval\s*\(",
        r"(?i)data\s*:\s*text/html",
    ];
    let nosql = [
        r"\$(where|ne|eq|gt|gte|lt|lte|in|nin|regex|exists|or|and|not|nor|expr|elemMatch)\b",
        r"(?i)\bdb\.\w+\.(find|remove|drop|update|insert)\s*\(",
    ];

    let compile = |kind: InjectionKind, patterns: &[&str]| -> Vec<(InjectionKind, Regex)> {
        patterns
            .iter()
            .map(|p| (kind, Regex::new(p).expect("injection pattern is valid")))
            .collect()
    };

    let mut all = compile(InjectionKind::Sql, &sql);
    all.extend(compile(InjectionKind::Xss, &xss));
    all.extend(compile(InjectionKind::NoSql, &nosql));
    all
});

/// First pattern family matching `input`, if any.
#[must_use]
pub fn detect_in_str(input: &str) -> Option<InjectionKind> {
    PATTERNS.iter().find(|(_, re)| re.is_match(input)).map(|(kind, _)| *kind)
}

/// Scans every string and object key under `value`. Traversal is iterative and unbounded
/// in depth.
#[must_use]
pub fn scan_value(value: &Value, root: &str) -> Option<InjectionMatch> {
    let mut stack: Vec<(&Value, String)> = vec![(value, root.to_string())];

    while let Some((current, path)) = stack.pop() {
        match current {
            Value::String(s) => {
                if let Some(kind) = detect_in_str(s) {
                    return Some(InjectionMatch { kind, field: path });
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push((item, format!("{path}[{i}]")));
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let field = format!("{path}.{key}");
                    if key.starts_with('$') {
                        return Some(InjectionMatch { kind: InjectionKind::NoSql, field });
                    }
                    if let Some(kind) = detect_in_str(key) {
                        return Some(InjectionMatch { kind, field });
                    }
                    stack.push((item, field));
                }
            }
            _ => {}
        }
    }

    None
}

/// Scans query keys and values.
#[must_use]
pub fn scan_query(pairs: &[(String, String)]) -> Option<InjectionMatch> {
    pairs.iter().find_map(|(key, value)| {
        detect_in_str(key)
            .or_else(|| detect_in_str(value))
            .map(|kind| InjectionMatch { kind, field: format!("query.{key}") })
    })
}

/// Scans the body first, then the query.
#[must_use]
pub fn detect_injection(
    body: Option<&Value>,
    query: &[(String, String)],
) -> Option<InjectionMatch> {
    body.and_then(|b| scan_value(b, "body")).or_else(|| scan_query(query))
}
