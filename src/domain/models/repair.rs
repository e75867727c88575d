//! Repair pipeline value types: the normalized failure report, each agent's
//! output, and the repair record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::budget::CapKind;

/// A failure report after preflight normalization. The only shape the repair
/// pipeline accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// Failure category, e.g. `test_failure`.
    pub failure_type: String,
    /// Stop reason the failing run reported for itself.
    pub stop_reason_reported: String,
    /// Primary error text.
    pub error_message: String,
    /// Stack trace, when one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Component or subsystem the failure belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Trailing log lines.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Command that produced the failure.
    pub command: String,
    /// Repository-relative path to file contents.
    #[serde(default)]
    pub file_snapshots: BTreeMap<String, String>,
    /// Repository-relative paths the failure points at.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Normalized, whitelisted command lines.
    #[serde(default)]
    pub test_commands: Vec<String>,
    /// Set on reports enriched by escalation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_level: Option<String>,
    /// Why the report was escalated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
}

impl FailureReport {
    /// Every path this report refers to: targets then snapshot keys, deduplicated.
    pub fn referenced_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for p in self.targets.iter().chain(self.file_snapshots.keys()) {
            if !paths.contains(p) {
                paths.push(p.clone());
            }
        }
        paths
    }
}

/// Diagnostician output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    /// Most probable root cause.
    pub likely_cause: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Other symptoms that may share the cause.
    pub related_issues: Vec<String>,
}

/// What a patch change does to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    /// Modify an existing file.
    Edit,
    /// Add a new file.
    Create,
    /// Remove a file.
    Delete,
}

/// One file-level change in a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchChange {
    /// Repository-relative path.
    pub file: String,
    /// Kind of change.
    pub operation: PatchOperation,
    /// Short summary of the change.
    pub description: String,
    /// Unified diff for the file, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Why the change fixes the failure.
    pub rationale: String,
}

/// A machine-executable test invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCommand {
    /// Program to run.
    pub cmd: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory relative to the repository root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl TestCommand {
    /// Render as a single command line; arguments containing whitespace are
    /// double-quoted.
    pub fn to_line(&self) -> String {
        let mut line = self.cmd.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.chars().any(char::is_whitespace) && !arg.starts_with(['"', '\'']) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Coder output: a candidate patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProposal {
    /// File changes, in application order.
    pub changes: Vec<PatchChange>,
    /// Human-readable verification steps.
    pub test_plan: Vec<String>,
    /// Machine-executable test invocations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_commands: Vec<TestCommand>,
    /// How to undo the patch.
    pub rollback_plan: String,
}

/// Reviewer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCritique {
    /// Whether the reviewer accepts the patch as is.
    pub approved: bool,
    /// Problems found in the patch.
    pub concerns: Vec<String>,
    /// Proposed improvements.
    pub suggestions: Vec<String>,
}

/// Arbiter ruling on a reviewed patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArbiterVerdict {
    /// Accept the patch.
    Apply,
    /// Give up on the failure.
    Reject,
    /// Send the patch back to the coder.
    Revise,
}

impl ArbiterVerdict {
    /// Wire name of the verdict.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Reject => "reject",
            Self::Revise => "revise",
        }
    }
}

/// Arbiter output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbiterDecision {
    /// The ruling.
    pub decision: ArbiterVerdict,
    /// Reasoning behind the ruling.
    pub rationale: String,
    /// Patch to apply in place of the coder's, if the arbiter amended it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_patch: Option<PatchProposal>,
}

/// Preflight rejection categories, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightStopReason {
    /// Report failed schema or field checks.
    PacketInvalid,
    /// A target matched the denylist.
    TargetForbidden,
    /// A target does not exist on disk.
    TargetMissing,
    /// Test commands were empty or not whitelisted.
    TestCommandsInvalid,
}

impl PreflightStopReason {
    /// Wire name of the reason.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PacketInvalid => "packet_invalid",
            Self::TargetForbidden => "target_forbidden",
            Self::TargetMissing => "target_missing",
            Self::TestCommandsInvalid => "test_commands_invalid",
        }
    }
}

/// Why a repair run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStopReason {
    /// Patch applied and tests passed.
    Ok,
    /// Arbiter rejected the patch.
    PatchFailed,
    /// Revision loop exhausted its iterations.
    MaxIters,
    /// A blocker phrase requires a human.
    HumanReviewRequired,
    /// Cost cap reached.
    CostCap,
    /// Token cap reached.
    TokenCap,
    /// Patch lacked a usable diff.
    PatchInvalidFormat,
    /// Patch carried no runnable test commands.
    TestsMissingTestCommands,
    /// Tests ran and failed.
    TestsFailed,
    /// Patch could not be applied.
    ApplyFailed,
    /// Run was cancelled.
    Cancelled,
    /// Preflight: report failed validation.
    PacketInvalid,
    /// Preflight: forbidden target.
    TargetForbidden,
    /// Preflight: missing target.
    TargetMissing,
    /// Preflight: invalid test commands.
    TestCommandsInvalid,
}

impl RepairStopReason {
    /// Wire name of the reason.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::PatchFailed => "patch_failed",
            Self::MaxIters => "max_iters",
            Self::HumanReviewRequired => "human_review_required",
            Self::CostCap => "cost_cap",
            Self::TokenCap => "token_cap",
            Self::PatchInvalidFormat => "patch_invalid_format",
            Self::TestsMissingTestCommands => "tests_missing_test_commands",
            Self::TestsFailed => "tests_failed",
            Self::ApplyFailed => "apply_failed",
            Self::Cancelled => "cancelled",
            Self::PacketInvalid => "packet_invalid",
            Self::TargetForbidden => "target_forbidden",
            Self::TargetMissing => "target_missing",
            Self::TestCommandsInvalid => "test_commands_invalid",
        }
    }
}

impl From<CapKind> for RepairStopReason {
    fn from(kind: CapKind) -> Self {
        match kind {
            CapKind::CostCap => Self::CostCap,
            CapKind::TokenCap => Self::TokenCap,
        }
    }
}

impl From<PreflightStopReason> for RepairStopReason {
    fn from(reason: PreflightStopReason) -> Self {
        match reason {
            PreflightStopReason::PacketInvalid => Self::PacketInvalid,
            PreflightStopReason::TargetForbidden => Self::TargetForbidden,
            PreflightStopReason::TargetMissing => Self::TargetMissing,
            PreflightStopReason::TestCommandsInvalid => Self::TestCommandsInvalid,
        }
    }
}

/// Models that served each repair role in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleModels {
    /// Diagnostician model.
    pub diagnostician: String,
    /// Coder model.
    pub coder: String,
    /// Reviewer model.
    pub reviewer: String,
    /// Arbiter model.
    pub arbiter: String,
}

impl RoleModels {
    /// Placeholder used when no agent ran.
    pub fn none() -> Self {
        Self {
            diagnostician: "none".into(),
            coder: "none".into(),
            reviewer: "none".into(),
            arbiter: "none".into(),
        }
    }
}

/// Diagnosis as recorded, with the models that produced the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisSummary {
    /// Most probable root cause.
    pub likely_cause: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Related symptoms.
    pub related_issues: Vec<String>,
    /// Models per role.
    pub models: RoleModels,
}

/// Final patch as recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPlan {
    /// File changes.
    pub changes: Vec<PatchChange>,
    /// Verification steps.
    pub test_plan: Vec<String>,
    /// Machine-executable test invocations.
    #[serde(default)]
    pub test_commands: Vec<TestCommand>,
    /// Undo instructions.
    pub rollback_plan: String,
}

/// Execution facts for a repair run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// Whether the patch was applied.
    pub applied: bool,
    /// Whether the test commands passed.
    pub tests_passed: bool,
    /// Final outcome.
    pub stop_reason: RepairStopReason,
    /// Outcome of the agent loop before execution facts were folded in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_stop_reason: Option<RepairStopReason>,
    /// Execution log lines.
    pub logs: Vec<String>,
    /// Wall-clock time of the run.
    pub latency_ms: u64,
    /// Total spend in USD.
    pub cost_usd: f64,
}

/// Per-run quality scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScores {
    /// Score for the coder role.
    pub coder_score: f64,
    /// Score for the reviewer role.
    pub reviewer_score: f64,
    /// Score for the arbiter role.
    pub arbiter_score: f64,
    /// Mean of the role scores.
    pub overall_score: f64,
    /// Change applied to agent trust.
    pub trust_delta: f64,
}

/// Raw agent outputs kept for human review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAudit {
    /// Raw coder reply.
    pub coder_proposal: String,
    /// Raw reviewer reply.
    pub reviewer_critique: String,
    /// Raw arbiter reply.
    pub arbiter_decision: String,
}

/// Identity and bookkeeping for a repair run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairMeta {
    /// Unique run id.
    pub repair_id: String,
    /// Trace id shared with logs.
    pub trace_id: String,
    /// Run start time.
    pub timestamp: DateTime<Utc>,
    /// Failure category taken from the report.
    pub failure_type: String,
    /// Coder iterations performed.
    pub iterations: u32,
    /// Whether the run used an escalated report.
    #[serde(default)]
    pub escalated: bool,
}

/// Terminal artifact of a repair run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRecord {
    /// Run identity.
    pub meta: RepairMeta,
    /// Diagnosis summary.
    pub diagnosis: DiagnosisSummary,
    /// Patch that was or would have been applied.
    pub patch_plan: PatchPlan,
    /// Execution facts.
    pub execution: ExecutionReport,
    /// Run scores.
    pub scorecard: RunScores,
    /// Raw agent outputs.
    pub audit: RepairAudit,
}

/// Escalation bookkeeping written next to the repair record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMeta {
    /// Whether escalation was attempted.
    pub escalation_triggered: bool,
    /// Whether a second run happened.
    pub did_retry: bool,
    /// Number of retries.
    pub retry_count: u32,
    /// Context level used for the retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Why escalation triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Files added to the escalated report.
    #[serde(default)]
    pub files_added: Vec<String>,
    /// Snapshot bytes added to the escalated report.
    #[serde(default)]
    pub bytes_added: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_spaced_args() {
        let cmd = TestCommand {
            cmd: "node".into(),
            args: vec!["-e".into(), "console.log(1); process.exit(0)".into()],
            cwd: None,
        };
        assert_eq!(cmd.to_line(), r#"node -e "console.log(1); process.exit(0)""#);
    }

    #[test]
    fn test_referenced_paths_dedupes() {
        let mut report = FailureReport {
            targets: vec!["server/a.ts".into(), "server/b.ts".into()],
            ..Default::default()
        };
        report.file_snapshots.insert("server/a.ts".into(), "x".into());
        report.file_snapshots.insert("client/c.ts".into(), "y".into());
        assert_eq!(
            report.referenced_paths(),
            vec!["server/a.ts", "server/b.ts", "client/c.ts"]
        );
    }

    #[test]
    fn test_stop_reason_wire_names_match_as_str() {
        for reason in [
            RepairStopReason::Ok,
            RepairStopReason::MaxIters,
            RepairStopReason::TestsMissingTestCommands,
            RepairStopReason::TargetForbidden,
        ] {
            assert_eq!(
                serde_json::to_value(reason).unwrap(),
                serde_json::Value::String(reason.as_str().to_string())
            );
        }
    }
}
