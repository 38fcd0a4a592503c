use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

/// Number of targets shown by a dry run
pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("No matching tasks")]
    NoMatches,
    #[error("{count} tasks matched; re-run with --yes to apply to all of them, or --dry-run to preview")]
    BulkConfirmationRequired { count: usize },
    #[error("Title '{title}' looks like a flag assignment; use {suggestion} instead, or pass --allow-unsafe-title")]
    UnsafeTitle { title: String, suggestion: String },
    #[error("Deleting '{title}' needs confirmation; re-run with --confirm {id} or --confirm '{title}'")]
    ConfirmationRequired { id: String, title: String },
}

#[derive(Debug, Clone, Copy)]
pub struct GateRequest {
    pub dry_run: bool,
    pub confirm_bulk: bool,
    pub preview_limit: usize,
}

impl Default for GateRequest {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirm_bulk: false,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum GateDecision<'a, T> {
    Execute,
    Preview { shown: &'a [T], total: usize },
}

/// Decide whether a mutation over `targets` may run.
///
/// Dry runs preview regardless of count. More than one target needs
/// `confirm_bulk`. Nothing is dispatched or logged on any error path.
pub fn evaluate<'a, T>(targets: &'a [T], request: GateRequest) -> Result<GateDecision<'a, T>, GateError> {
    let total = targets.len();
    if total == 0 {
        return Err(GateError::NoMatches);
    }
    if request.dry_run {
        debug!(total, "dry run, previewing");
        let shown = &targets[..total.min(request.preview_limit)];
        return Ok(GateDecision::Preview { shown, total });
    }
    if total > 1 && !request.confirm_bulk {
        info!(count = total, "bulk mutation blocked without confirmation");
        return Err(GateError::BulkConfirmationRequired { count: total });
    }
    Ok(GateDecision::Execute)
}

const UNSAFE_TITLE_KEYS: &[&str] = &[
    "tag",
    "tags",
    "add-tags",
    "when",
    "deadline",
    "list",
    "list-id",
    "area",
    "area-id",
    "project",
    "project-id",
    "heading",
    "notes",
    "id",
    "auth-token",
];

static FLAG_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:--)?([A-Za-z][A-Za-z0-9_-]*)\s*=").expect("valid flag regex"));

/// Reject titles such as `tags=work` or `--when=today`, which are almost
/// always a mistyped flag.
pub fn guard_unsafe_title(title: &str, allow: bool) -> Result<(), GateError> {
    if allow {
        return Ok(());
    }
    let Some(captures) = FLAG_ASSIGNMENT.captures(title) else {
        return Ok(());
    };
    let key = captures[1].to_lowercase().replace('_', "-");
    if !UNSAFE_TITLE_KEYS.contains(&key.as_str()) && !key.starts_with("repeat-") {
        return Ok(());
    }
    let suggestion = match key.as_str() {
        "tag" | "tags" => "--tags".to_string(),
        "add-tags" => "--add-tags".to_string(),
        other => format!("--{other}"),
    };
    Err(GateError::UnsafeTitle {
        title: title.to_string(),
        suggestion,
    })
}

/// A single named delete goes through only when `typed` repeats the ID or the
/// title exactly (surrounding whitespace aside).
pub fn confirm_named_target(id: &str, title: &str, typed: Option<&str>) -> Result<(), GateError> {
    let typed = typed.map(str::trim).unwrap_or_default();
    if !typed.is_empty() && (typed == id.trim() || typed == title.trim()) {
        return Ok(());
    }
    info!(id, "named delete not confirmed");
    Err(GateError::ConfirmationRequired {
        id: id.to_string(),
        title: title.to_string(),
    })
}
