//! Format gate applied to an approved patch before it reaches the verifier.
//!
//! Every edit or create must carry a unified diff and the patch must name at
//! least one whitelisted test command.

use crate::domain::models::repair::{PatchOperation, PatchProposal, RepairStopReason};
use crate::services::test_commands::validate_command;
use tracing::debug;

/// Rejection from the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchGateFailure {
    /// Stop reason for the run.
    pub stop_reason: RepairStopReason,
    /// What was wrong with the patch.
    pub errors: Vec<String>,
}

impl PatchGateFailure {
    fn new(stop_reason: RepairStopReason, errors: Vec<String>) -> Self {
        Self { stop_reason, errors }
    }
}

/// Remove a surrounding markdown fence from a diff, if present.
pub fn strip_diff_fence(diff: &str) -> String {
    let trimmed = diff.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return diff.to_string();
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    let mut out = body.trim_end_matches('\n').to_string();
    out.push('\n');
    out
}

fn diff_problem(diff: &str) -> Option<&'static str> {
    if diff.contains("*** Begin Patch") || diff.contains("*** Update File:") {
        return Some("uses an apply_patch envelope instead of a unified diff");
    }
    if !diff.contains("diff --git") {
        return Some("diff is missing a 'diff --git' header");
    }
    if !diff.lines().any(|l| l.starts_with("---")) || !diff.lines().any(|l| l.starts_with("+++")) {
        return Some("diff is missing '---'/'+++' file headers");
    }
    None
}

/// Check `patch` and return a copy with fences stripped from its diffs and
/// non-whitelisted test commands removed.
pub fn gate_patch(patch: &PatchProposal) -> Result<PatchProposal, PatchGateFailure> {
    let mut gated = patch.clone();
    let mut format_errors = Vec::new();

    if gated.changes.is_empty() {
        format_errors.push("patch has no changes".to_string());
    }

    for (i, change) in gated.changes.iter_mut().enumerate() {
        if change.operation == PatchOperation::Delete {
            continue;
        }
        match change.diff.as_deref().map(strip_diff_fence) {
            None => format_errors.push(format!("changes[{i}] ({}): no diff", change.file)),
            Some(diff) if diff.trim().is_empty() => {
                format_errors.push(format!("changes[{i}] ({}): no diff", change.file));
            }
            Some(diff) => {
                if let Some(problem) = diff_problem(&diff) {
                    format_errors.push(format!("changes[{i}] ({}): {problem}", change.file));
                }
                change.diff = Some(diff);
            }
        }
    }
    if !format_errors.is_empty() {
        return Err(PatchGateFailure::new(RepairStopReason::PatchInvalidFormat, format_errors));
    }

    let mut command_errors = Vec::new();
    gated.test_commands.retain(|cmd| {
        let line = cmd.to_line();
        match validate_command(&line) {
            Ok(()) => true,
            Err(e) => {
                command_errors.push(format!("testCommands: '{}' {e}", cmd.cmd));
                false
            }
        }
    });
    if gated.test_commands.is_empty() {
        if command_errors.is_empty() {
            command_errors.push("patch names no test commands".to_string());
        }
        return Err(PatchGateFailure::new(RepairStopReason::TestsMissingTestCommands, command_errors));
    }
    if !command_errors.is_empty() {
        debug!(dropped = command_errors.len(), "dropped non-whitelisted test commands");
    }

    Ok(gated)
}
