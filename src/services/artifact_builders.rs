//! Terminal artifact builders.
//!
//! Every run, wherever it stops, ends in exactly one of these: a
//! [`DecisionRecord`] for copy runs, a [`RepairRecord`] for repair runs.
//! Builders are pure; persistence lives in the artifact store.

use chrono::{DateTime, Utc};

use crate::domain::models::{
    ArbiterDecision, ArbiterVerdict, BudgetState, CopyStopReason, CopyTelemetry, Critique, Decision,
    DecisionRecord, Diagnosis, DiagnosisSummary, ExecutionReport, FinalChoice, PatchPlan, PatchProposal,
    RepairAudit, RepairMeta, RepairRecord, RepairStopReason, ReviewCritique, RoleModels, RunScores,
    TraceContext, Variant,
};
use crate::domain::ports::VerificationOutcome;
use crate::infrastructure::logging::scrub_secrets;

// ============================================================================
// Copy
// ============================================================================

/// Everything a copy run produced up to its terminal state.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    /// Final decision.
    pub decision: Decision,
    /// Why the run ended.
    pub stop_reason: CopyStopReason,
    /// Variants from the last completed round.
    pub variants: Vec<Variant>,
    /// Critiques of those variants.
    pub critiques: Vec<Critique>,
    /// Errors that ended the run.
    pub errors: Vec<String>,
    /// Rounds started.
    pub rounds_executed: u32,
}

/// Assemble the decision record from an outcome and the run's budget.
pub fn build_decision_record(outcome: CopyOutcome, budget: &BudgetState, trace: &TraceContext) -> DecisionRecord {
    let CopyOutcome {
        decision,
        stop_reason,
        variants,
        critiques,
        errors,
        rounds_executed,
    } = outcome;

    DecisionRecord {
        needs_human: decision.needs_human,
        final_choice: FinalChoice {
            chosen_index: decision.chosen_index,
            chosen_variant: decision.chosen_variant,
            confidence: decision.confidence,
            reasoning: decision.reasoning,
        },
        variants,
        critiques,
        telemetry: CopyTelemetry {
            trace_id: trace.trace_id(),
            rounds_executed,
            total_calls: budget.calls,
            total_input_tokens: budget.input_tokens,
            total_output_tokens: budget.output_tokens,
            estimated_cost_usd: budget.estimated_cost_usd,
            models_used: budget.models_used.clone(),
            latency_ms_total: budget.latency_ms_total,
            stop_reason,
        },
        errors,
    }
}

// ============================================================================
// Repair
// ============================================================================

/// Everything the repair loop produced, before execution facts.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// Diagnostician output, if it ran.
    pub diagnosis: Option<Diagnosis>,
    /// Model per role.
    pub models: RoleModels,
    /// Last coder proposal.
    pub proposal: Option<PatchProposal>,
    /// Last reviewer critique.
    pub review: Option<ReviewCritique>,
    /// Arbiter ruling.
    pub arbiter: Option<ArbiterDecision>,
    /// Why the loop stopped.
    pub loop_stop_reason: RepairStopReason,
    /// Coder iterations.
    pub iterations: u32,
    /// Raw agent replies.
    pub audit: RepairAudit,
    /// Loop log lines, unscrubbed.
    pub logs: Vec<String>,
}

impl RepairOutcome {
    /// An outcome for a run that stopped before any agent was called.
    pub fn blocked(stop_reason: RepairStopReason, logs: Vec<String>) -> Self {
        Self {
            diagnosis: None,
            models: RoleModels::none(),
            proposal: None,
            review: None,
            arbiter: None,
            loop_stop_reason: stop_reason,
            iterations: 0,
            audit: RepairAudit::default(),
            logs,
        }
    }

    /// The patch that would be applied: the arbiter's final patch when it
    /// gave one, else the last proposal.
    pub fn final_patch(&self) -> Option<&PatchProposal> {
        self.arbiter
            .as_ref()
            .and_then(|a| a.final_patch.as_ref())
            .or(self.proposal.as_ref())
    }
}

/// Identity and timing of the run being recorded.
#[derive(Debug, Clone)]
pub struct RepairRunInfo {
    /// Run id.
    pub repair_id: String,
    /// Failure category.
    pub failure_type: String,
    /// Whether the report was escalated.
    pub escalated: bool,
    /// Run start time.
    pub timestamp: DateTime<Utc>,
}

/// `applied` is true only for an `apply` decision the verifier applied with
/// passing tests. Pure, so deriving it twice gives the same answer.
pub fn derive_applied(arbiter: Option<&ArbiterDecision>, verification: Option<&VerificationOutcome>) -> bool {
    let approved = arbiter.is_some_and(|a| a.decision == ArbiterVerdict::Apply);
    approved && verification.is_some_and(|v| v.applied && v.tests_passed)
}

/// Terminal stop reason once execution facts are known.
pub fn derive_stop_reason(
    loop_stop_reason: RepairStopReason,
    verification: Option<&VerificationOutcome>,
) -> RepairStopReason {
    if loop_stop_reason != RepairStopReason::Ok {
        return loop_stop_reason;
    }
    match verification {
        None => RepairStopReason::HumanReviewRequired,
        Some(v) if !v.attempted => RepairStopReason::HumanReviewRequired,
        Some(v) if !v.applied => RepairStopReason::ApplyFailed,
        Some(v) if !v.tests_passed => RepairStopReason::TestsFailed,
        Some(_) => RepairStopReason::Ok,
    }
}

/// Scores for the three loop agents. All zero when the arbiter never ran.
pub fn run_scores(review: Option<&ReviewCritique>, arbiter: Option<&ArbiterDecision>) -> RunScores {
    let Some(arbiter) = arbiter else {
        return RunScores::default();
    };
    let apply = arbiter.decision == ArbiterVerdict::Apply;
    let approved = review.is_some_and(|r| r.approved);
    let no_concerns = review.is_some_and(|r| r.concerns.is_empty());
    RunScores {
        coder_score: if approved { 0.9 } else { 0.5 },
        reviewer_score: if no_concerns { 0.9 } else { 0.7 },
        arbiter_score: if apply { 0.9 } else { 0.5 },
        overall_score: if apply { 0.85 } else { 0.5 },
        trust_delta: if apply { 0.05 } else { -0.02 },
    }
}

fn diagnosis_summary(diagnosis: Option<&Diagnosis>, models: RoleModels) -> DiagnosisSummary {
    match diagnosis {
        Some(d) => DiagnosisSummary {
            likely_cause: d.likely_cause.clone(),
            confidence: d.confidence,
            related_issues: d.related_issues.clone(),
            models,
        },
        None => DiagnosisSummary {
            likely_cause: "not diagnosed".to_string(),
            confidence: 0.0,
            related_issues: Vec::new(),
            models,
        },
    }
}

fn patch_plan(patch: Option<&PatchProposal>) -> PatchPlan {
    patch.map_or_else(PatchPlan::default, |p| PatchPlan {
        changes: p.changes.clone(),
        test_plan: p.test_plan.clone(),
        test_commands: p.test_commands.clone(),
        rollback_plan: p.rollback_plan.clone(),
    })
}

/// Assemble the repair record. Log lines are scrubbed of secrets here.
pub fn build_repair_record(
    outcome: RepairOutcome,
    verification: Option<&VerificationOutcome>,
    budget: &BudgetState,
    trace: &TraceContext,
    info: RepairRunInfo,
) -> RepairRecord {
    let applied = outcome.loop_stop_reason == RepairStopReason::Ok
        && derive_applied(outcome.arbiter.as_ref(), verification);
    let stop_reason = derive_stop_reason(outcome.loop_stop_reason, verification);
    let tests_passed = verification.is_some_and(|v| v.tests_passed) && applied;

    let mut logs: Vec<String> = outcome.logs.iter().map(|l| scrub_secrets(l)).collect();
    if let Some(v) = verification {
        logs.extend(v.logs.iter().map(|l| scrub_secrets(l)));
    }

    let loop_stop_reason = (outcome.loop_stop_reason != stop_reason).then_some(outcome.loop_stop_reason);
    let scorecard = run_scores(outcome.review.as_ref(), outcome.arbiter.as_ref());
    let patch_plan = patch_plan(outcome.final_patch());
    let audit = RepairAudit {
        coder_proposal: scrub_secrets(&outcome.audit.coder_proposal),
        reviewer_critique: scrub_secrets(&outcome.audit.reviewer_critique),
        arbiter_decision: scrub_secrets(&outcome.audit.arbiter_decision),
    };

    RepairRecord {
        meta: RepairMeta {
            repair_id: info.repair_id,
            trace_id: trace.trace_id(),
            timestamp: info.timestamp,
            failure_type: info.failure_type,
            iterations: outcome.iterations,
            escalated: info.escalated,
        },
        diagnosis: diagnosis_summary(outcome.diagnosis.as_ref(), outcome.models),
        patch_plan,
        execution: ExecutionReport {
            applied,
            tests_passed,
            stop_reason,
            loop_stop_reason,
            logs,
            latency_ms: budget.latency_ms_total,
            cost_usd: budget.estimated_cost_usd,
        },
        scorecard,
        audit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter(decision: ArbiterVerdict) -> ArbiterDecision {
        ArbiterDecision {
            decision,
            rationale: "r".to_string(),
            final_patch: None,
        }
    }

    fn verified(applied: bool, tests_passed: bool) -> VerificationOutcome {
        VerificationOutcome {
            attempted: true,
            applied,
            tests_passed,
            apply_stderr: None,
            logs: Vec::new(),
        }
    }

    fn info() -> RepairRunInfo {
        RepairRunInfo {
            repair_id: "rep-1".to_string(),
            failure_type: "typecheck".to_string(),
            escalated: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_applied_requires_apply_and_passing_tests() {
        let apply = arbiter(ArbiterVerdict::Apply);
        assert!(derive_applied(Some(&apply), Some(&verified(true, true))));
        assert!(!derive_applied(Some(&apply), Some(&verified(true, false))));
        assert!(!derive_applied(Some(&arbiter(ArbiterVerdict::Reject)), Some(&verified(true, true))));
        assert!(!derive_applied(None, Some(&verified(true, true))));
    }

    #[test]
    fn test_stop_reason_from_execution_facts() {
        let ok = RepairStopReason::Ok;
        assert_eq!(derive_stop_reason(ok, Some(&VerificationOutcome::default())), RepairStopReason::HumanReviewRequired);
        assert_eq!(derive_stop_reason(ok, Some(&verified(false, false))), RepairStopReason::ApplyFailed);
        assert_eq!(derive_stop_reason(ok, Some(&verified(true, false))), RepairStopReason::TestsFailed);
        assert_eq!(derive_stop_reason(ok, Some(&verified(true, true))), RepairStopReason::Ok);
        assert_eq!(
            derive_stop_reason(RepairStopReason::MaxIters, Some(&verified(true, true))),
            RepairStopReason::MaxIters
        );
    }

    #[test]
    fn test_scores_zero_without_arbiter() {
        assert_eq!(run_scores(None, None), RunScores::default());
        let review = ReviewCritique {
            approved: true,
            concerns: vec!["naming".to_string()],
            suggestions: Vec::new(),
        };
        let scores = run_scores(Some(&review), Some(&arbiter(ArbiterVerdict::Apply)));
        assert!((scores.coder_score - 0.9).abs() < f64::EPSILON);
        assert!((scores.reviewer_score - 0.7).abs() < f64::EPSILON);
        assert!((scores.trust_delta - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_blocked_record_has_zero_cost_and_placeholder_diagnosis() {
        let outcome = RepairOutcome::blocked(
            RepairStopReason::HumanReviewRequired,
            vec!["blocked: token=abcdefghijklmnop1234".to_string()],
        );
        let record = build_repair_record(
            outcome,
            None,
            &BudgetState::default(),
            &TraceContext::new("job", "run", "repair"),
            info(),
        );
        assert!(!record.execution.applied);
        assert_eq!(record.execution.stop_reason, RepairStopReason::HumanReviewRequired);
        assert!(record.execution.cost_usd.abs() < f64::EPSILON);
        assert_eq!(record.diagnosis.models, RoleModels::none());
        assert!(!record.execution.logs[0].contains("abcdefghijklmnop1234"));
        assert!(record.execution.loop_stop_reason.is_none());
    }

    #[test]
    fn test_decision_record_telemetry_mirrors_budget() {
        let budget = BudgetState {
            calls: 5,
            input_tokens: 100,
            ..BudgetState::default()
        };
        let record = build_decision_record(
            CopyOutcome {
                decision: Decision::needs_human("round limit reached"),
                stop_reason: CopyStopReason::NeedsHuman,
                variants: Vec::new(),
                critiques: Vec::new(),
                errors: Vec::new(),
                rounds_executed: 2,
            },
            &budget,
            &TraceContext::new("job", "run", "copy"),
        );
        assert!(record.needs_human);
        assert_eq!(record.final_choice.chosen_index, None);
        assert_eq!(record.telemetry.total_calls, 5);
        assert_eq!(record.telemetry.trace_id, "job:run");
    }
}
