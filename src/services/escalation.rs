//! Escalation retry support: recognising stale-context apply failures and
//! building an enriched failure report for the single retry.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::domain::models::{EscalationConfig, FailureReport, PatchProposal};
use crate::services::preflight::is_path_allowed;

/// Context level recorded on an enriched report.
pub const ESCALATION_LEVEL: &str = "L2";
/// Reason recorded on an enriched report.
pub const ESCALATION_REASON: &str = "apply_failed_dependency_context";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static escalation pattern compiles")
}

static STALE_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)depends on old contents|patch does not apply|patch failed|corrupt patch|does not match index")
});
static DIFF_GIT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^diff --git a/(.+?) b/(.+?)$"));
static PLUS_FILE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^\+\+\+ b/(.+?)$"));

/// Whether apply output carries the stale-context signature.
pub fn is_stale_context(stderr: &str) -> bool {
    STALE_CONTEXT.is_match(stderr)
}

/// Files a patch touches, in first-seen order: diff headers first, then
/// each change's declared file.
pub fn touched_files(patch: &PatchProposal) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    let mut push = |path: &str| {
        let path = path.trim();
        if !path.is_empty() && path != "/dev/null" && !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    };

    for change in &patch.changes {
        if let Some(diff) = change.diff.as_deref() {
            for caps in DIFF_GIT.captures_iter(diff) {
                push(&caps[1]);
                push(&caps[2]);
            }
            for caps in PLUS_FILE.captures_iter(diff) {
                push(&caps[1]);
            }
        }
    }
    for change in &patch.changes {
        push(&change.file);
    }
    files
}

/// An enriched report plus what was added to it.
#[derive(Debug, Clone)]
pub struct Enrichment {
    /// Report with the added snapshots.
    pub report: FailureReport,
    /// Paths that were added.
    pub files_added: Vec<String>,
    /// Bytes of snapshot content added.
    pub bytes_added: usize,
}

/// Re-read touched and previously snapshotted files from `repo_root` into a
/// copy of `report`, within the configured file and byte bounds. Paths that
/// fail the path policy are never read.
pub async fn enrich_report(
    report: &FailureReport,
    patch: Option<&PatchProposal>,
    repo_root: &Path,
    bounds: &EscalationConfig,
) -> Enrichment {
    let mut candidates = patch.map(touched_files).unwrap_or_default();
    for path in report.file_snapshots.keys() {
        if !candidates.contains(path) {
            candidates.push(path.clone());
        }
    }

    let mut enriched = report.clone();
    let mut files_added = Vec::new();
    let mut bytes_added = 0usize;

    for path in candidates {
        if files_added.len() >= bounds.max_files {
            break;
        }
        if !is_path_allowed(&path) {
            debug!(path = %path, "skipping path outside policy");
            continue;
        }
        let contents = match tokio::fs::read_to_string(repo_root.join(&path)).await {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path, error = %e, "could not read file for escalation");
                continue;
            }
        };
        if bytes_added + contents.len() > bounds.max_total_bytes {
            debug!(path = %path, bytes = contents.len(), "file exceeds remaining byte budget");
            continue;
        }
        bytes_added += contents.len();
        enriched.file_snapshots.insert(path.clone(), contents);
        files_added.push(path);
    }

    enriched.context_level = Some(ESCALATION_LEVEL.to_string());
    enriched.escalation_reason = Some(ESCALATION_REASON.to_string());

    info!(files = files_added.len(), bytes = bytes_added, "failure report enriched");
    Enrichment {
        report: enriched,
        files_added,
        bytes_added,
    }
}
