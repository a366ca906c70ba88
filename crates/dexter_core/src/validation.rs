//! Input validation and sanitization.
//!
//! # Responsibility
//! - Reject malformed input before it reaches the store.
//!
//! # Invariants
//! - Every check here is pure: no I/O except `validate_file_path` existence.
//! - Callers run these before opening a write scope, so a validation failure
//!   never leaves a partial mutation behind.

use crate::model::action::ActionStatus;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

pub const KNOWN_INTEGRATION_TYPES: &[&str] = &[
    "google_gmail",
    "google_drive",
    "google_sheets",
    "google_appscript",
    "hubspot",
    "openai",
    "tavily",
    "github",
];

static DANGEROUS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    compile_patterns(&[
        r"DROP\s+TABLE",
        r"DROP\s+DATABASE",
        r"TRUNCATE\s+TABLE",
        r"DELETE\s+FROM\s+\w+\s*(?:;|$)",
        r"UPDATE\s+\w+\s+SET\s+[^;]*$",
    ])
});
static DDL_PATTERNS: Lazy<Vec<(&'static str, Regex)>> =
    Lazy::new(|| compile_patterns(&[r"CREATE\s+TABLE", r"ALTER\s+TABLE", r"DROP\s+"]));
static INJECTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    compile_patterns(&[
        r";\s*DROP",
        r";\s*DELETE",
        r";\s*UPDATE",
        r"--\s*$",
        r"/\*.*\*/",
        r"UNION\s+SELECT",
        r"EXEC\s*\(",
        r"EXECUTE\s*\(",
    ])
});
static WHERE_CLAUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid where regex"));

/// Input rejected before any store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidId { field: &'static str, value: i64 },
    DangerousQuery(&'static str),
    InvalidJson(String),
    UnsafePath(String),
    UnknownValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    TooLong { max_chars: usize, actual: usize },
    Empty(&'static str),
    /// Free-form rejection from a caller-supplied validator.
    Rejected(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId { field, value } => {
                write!(f, "invalid {field}: must be positive, got {value}")
            }
            Self::DangerousQuery(pattern) => {
                write!(f, "query contains dangerous pattern: {pattern}")
            }
            Self::InvalidJson(message) => write!(f, "invalid JSON: {message}"),
            Self::UnsafePath(message) => write!(f, "unsafe file path: {message}"),
            Self::UnknownValue {
                field,
                value,
                expected,
            } => write!(f, "invalid {field} `{value}`; expected one of {expected}"),
            Self::TooLong { max_chars, actual } => write!(
                f,
                "string exceeds maximum length of {max_chars} characters (got {actual})"
            ),
            Self::Empty(field) => write!(f, "{field} cannot be empty"),
            Self::Rejected(message) => write!(f, "validation failed: {message}"),
        }
    }
}

impl Error for ValidationError {}

pub fn validate_workspace_id(workspace_id: i64) -> Result<i64, ValidationError> {
    validate_id("workspace_id", workspace_id)
}

/// `None` is the global scope and always valid.
pub fn validate_scope(workspace_id: Option<i64>) -> Result<(), ValidationError> {
    if let Some(workspace_id) = workspace_id {
        validate_workspace_id(workspace_id)?;
    }
    Ok(())
}

pub fn validate_id(field: &'static str, value: i64) -> Result<i64, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::InvalidId { field, value });
    }
    Ok(value)
}

/// Rejects destructive or injection-shaped SQL. DDL is rejected unless
/// `allow_ddl` is set.
pub fn validate_sql_query(query: &str, allow_ddl: bool) -> Result<&str, ValidationError> {
    let normalized = query.trim().to_ascii_uppercase();

    for (pattern, re) in DANGEROUS_PATTERNS.iter() {
        if re.is_match(&normalized) && !is_guarded_update(pattern, &normalized) {
            return Err(ValidationError::DangerousQuery(pattern));
        }
    }
    if !allow_ddl {
        for (pattern, re) in DDL_PATTERNS.iter() {
            if re.is_match(&normalized) {
                return Err(ValidationError::DangerousQuery(pattern));
            }
        }
    }
    for (pattern, re) in INJECTION_PATTERNS.iter() {
        if re.is_match(&normalized) {
            return Err(ValidationError::DangerousQuery(pattern));
        }
    }
    Ok(query)
}

/// Parses `text` and requires a JSON object at the top level.
pub fn validate_json(
    text: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, ValidationError> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::InvalidJson(
            "JSON must be an object".to_string(),
        )),
        Err(err) => Err(ValidationError::InvalidJson(err.to_string())),
    }
}

/// Rejects parent-directory traversal, unexpected extensions and, when
/// `must_exist` is set, missing files.
pub fn validate_file_path(
    path: &str,
    must_exist: bool,
    allowed_extensions: &[&str],
) -> Result<PathBuf, ValidationError> {
    let candidate = Path::new(path);
    if candidate
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(ValidationError::UnsafePath(format!(
            "path traversal detected in `{path}`"
        )));
    }

    if !allowed_extensions.is_empty() {
        let extension = candidate
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if !allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.') == extension)
        {
            return Err(ValidationError::UnsafePath(format!(
                "extension `{extension}` not in {allowed_extensions:?}"
            )));
        }
    }

    if must_exist && !candidate.exists() {
        return Err(ValidationError::UnsafePath(format!(
            "file does not exist: {path}"
        )));
    }
    Ok(candidate.to_path_buf())
}

pub fn validate_action_status(status: &str) -> Result<ActionStatus, ValidationError> {
    ActionStatus::parse(status).ok_or_else(|| ValidationError::UnknownValue {
        field: "status",
        value: status.to_string(),
        expected: "pending|in_progress|completed|failed|cancelled",
    })
}

pub fn validate_integration_type(integration_type: &str) -> Result<&str, ValidationError> {
    if KNOWN_INTEGRATION_TYPES.contains(&integration_type) {
        Ok(integration_type)
    } else {
        Err(ValidationError::UnknownValue {
            field: "integration_type",
            value: integration_type.to_string(),
            expected: "google_gmail|google_drive|google_sheets|google_appscript|hubspot|openai|tavily|github",
        })
    }
}

/// Strips control characters (keeping `\n` when allowed), enforces the
/// length cap, and trims surrounding whitespace.
pub fn sanitize_string(
    value: &str,
    max_chars: Option<usize>,
    allow_newlines: bool,
) -> Result<String, ValidationError> {
    let sanitized: String = value
        .chars()
        .filter(|c| !c.is_control() || (allow_newlines && *c == '\n'))
        .collect();

    if let Some(max_chars) = max_chars {
        let actual = sanitized.chars().count();
        if actual > max_chars {
            return Err(ValidationError::TooLong { max_chars, actual });
        }
    }
    Ok(sanitized.trim().to_string())
}

pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(())
}

fn compile_patterns(patterns: &[&'static str]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .map(|pattern| {
            let re = Regex::new(&format!("(?i){pattern}")).expect("valid sql guard regex");
            (*pattern, re)
        })
        .collect()
}

fn is_guarded_update(pattern: &str, query: &str) -> bool {
    pattern.starts_with("UPDATE") && WHERE_CLAUSE_RE.is_match(query)
}
