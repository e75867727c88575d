//! Preflight gate for inbound failure reports.
//!
//! Checks run in a fixed order and stop at the first failing category:
//! packet shape, path policy, file existence, then test commands. Path policy
//! is evaluated before existence so a forbidden path is never looked up on disk.

use crate::domain::models::repair::{FailureReport, PreflightStopReason};
use crate::services::test_commands::{normalize_test_commands, validate_commands};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static path pattern compiles")
}

static ALLOWED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^client/",
        r"^server/",
        r"^scripts/",
        r"^docs/",
        r"^tsconfig\.json$",
        r"^package\.json$",
        r"^vitest\.config\.ts$",
        r"^README\.md$",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static DENIED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(^|/)\.env",
        r"^drizzle/",
        r"^node_modules/",
        r"^\.git/",
        r"(?i)secrets",
        r"(?i)password",
        r"pnpm-lock\.yaml$",
        r"package-lock\.json$",
        r"yarn\.lock$",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

const REQUIRED_FIELDS: [&str; 3] = ["failureType", "errorMessage", "stopReasonReported"];

/// Why a repository-relative path fails the policy, if it does.
pub fn path_violation(path: &str) -> Option<&'static str> {
    if path.is_empty() {
        return Some("empty path");
    }
    if path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute() {
        return Some("absolute paths are not allowed");
    }
    if path.split(['/', '\\']).any(|seg| seg == "..") {
        return Some("parent directory segments are not allowed");
    }
    if DENIED.iter().any(|re| re.is_match(path)) {
        return Some("matches the deny-list");
    }
    if !ALLOWED.iter().any(|re| re.is_match(path)) {
        return Some("is outside the allow-list");
    }
    None
}

/// Whether `path` passes both the denylist and the allow-list.
pub fn is_path_allowed(path: &str) -> bool {
    path_violation(path).is_none()
}

/// Result of preflight on an inbound report.
#[derive(Debug, Clone, PartialEq)]
pub enum PreflightOutcome {
    /// Normalized report, ready for the repair pipeline.
    Passed(Box<FailureReport>),
    /// The report may not enter the pipeline.
    Rejected {
        /// First failing check.
        stop_reason: PreflightStopReason,
        /// Every problem found by that check.
        errors: Vec<String>,
    },
}

impl PreflightOutcome {
    fn rejected(stop_reason: PreflightStopReason, errors: Vec<String>) -> Self {
        Self::Rejected {
            stop_reason,
            errors,
        }
    }

    /// Whether the report passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }
}

/// Normalize the loosely-shaped inbound report into the documented shape.
///
/// `logs` may be a string, `command` may be absent, `targets` may hold strings
/// or `{ "path": ... }` objects and `testCommands` may be prose. Anything else
/// is left for deserialization to reject.
pub fn normalize_report(raw: &Map<String, Value>) -> Result<Map<String, Value>, Vec<String>> {
    let mut report = raw.clone();
    let mut errors = Vec::new();

    let logs = match raw.get("logs") {
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    };
    report.insert("logs".into(), Value::Array(logs));

    let command_missing = match raw.get("command") {
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => true,
    };
    if command_missing {
        report.insert("command".into(), Value::String("unknown".into()));
    }

    if let Some(targets) = raw.get("targets") {
        match targets {
            Value::Array(items) => {
                let mut paths = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => paths.push(Value::String(s.clone())),
                        Value::Object(obj) => match obj.get("path") {
                            Some(Value::String(s)) => paths.push(Value::String(s.clone())),
                            _ => errors.push(format!("/targets/{i}: missing 'path'")),
                        },
                        _ => errors.push(format!("/targets/{i}: must be a path string")),
                    }
                }
                report.insert("targets".into(), Value::Array(paths));
            }
            Value::Null => {
                report.remove("targets");
            }
            _ => errors.push("/targets: must be an array".to_string()),
        }
    }

    let commands = normalize_test_commands(raw.get("testCommands"));
    report.insert(
        "testCommands".into(),
        Value::Array(commands.into_iter().map(Value::String).collect()),
    );

    if errors.is_empty() {
        Ok(report)
    } else {
        Err(errors)
    }
}

/// Run the full gate against a raw report and a repository root.
pub fn preflight(raw: &Value, repo_root: &Path) -> PreflightOutcome {
    let Some(object) = raw.as_object() else {
        return PreflightOutcome::rejected(
            PreflightStopReason::PacketInvalid,
            vec!["(root): failure report must be a JSON object".to_string()],
        );
    };

    let normalized = match normalize_report(object) {
        Ok(n) => n,
        Err(errors) => return PreflightOutcome::rejected(PreflightStopReason::PacketInvalid, errors),
    };

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| {
            !matches!(normalized.get(**field), Some(Value::String(s)) if !s.trim().is_empty())
        })
        .map(|field| format!("missing required field '{field}'"))
        .collect();
    if !missing.is_empty() {
        return PreflightOutcome::rejected(PreflightStopReason::PacketInvalid, missing);
    }

    let report: FailureReport = match serde_json::from_value(Value::Object(normalized)) {
        Ok(r) => r,
        Err(e) => {
            debug!(line = e.line(), column = e.column(), "failure report shape mismatch");
            return PreflightOutcome::rejected(
                PreflightStopReason::PacketInvalid,
                vec!["(root): fields do not match the failure report shape".to_string()],
            );
        }
    };

    let paths = report.referenced_paths();

    let forbidden: Vec<String> = paths
        .iter()
        .filter_map(|p| path_violation(p).map(|why| format!("{p}: {why}")))
        .collect();
    if !forbidden.is_empty() {
        return PreflightOutcome::rejected(PreflightStopReason::TargetForbidden, forbidden);
    }

    let missing_files: Vec<String> = paths
        .iter()
        .filter(|p| !repo_root.join(p).exists())
        .map(|p| format!("{p}: does not exist in the repository"))
        .collect();
    if !missing_files.is_empty() {
        return PreflightOutcome::rejected(PreflightStopReason::TargetMissing, missing_files);
    }

    let command_errors = validate_commands(&report.test_commands);
    if !command_errors.is_empty() {
        return PreflightOutcome::rejected(PreflightStopReason::TestCommandsInvalid, command_errors);
    }

    info!(
        failure_type = %report.failure_type,
        paths = paths.len(),
        test_commands = report.test_commands.len(),
        "preflight passed"
    );
    PreflightOutcome::Passed(Box::new(report))
}
