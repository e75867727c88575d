//! Prompt builders for every role.
//!
//! Prompts go to the transport only. Nothing here is logged.

use serde::Serialize;

use crate::domain::models::{
    CopyBrief, Critique, Diagnosis, FailureReport, PatchProposal, ReviewCritique, TargetKey, Variant,
};
use crate::services::agent_invoker::AgentPrompt;

const ENVELOPE_RULE: &str = "Respond with a single JSON object only. It must include \
\"schemaVersion\": \"v1\" and \"requiresApproval\": true, and no keys other than the ones listed.";

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
}

fn notes_block(notes: &[String]) -> String {
    if notes.is_empty() {
        String::new()
    } else {
        format!("\n\nRevision notes from earlier rounds (address all of them):\n{}", bullets(notes))
    }
}

fn targets(brief: &CopyBrief) -> String {
    let keys: Vec<&str> = if brief.target_keys.is_empty() {
        TargetKey::ALL.iter().map(TargetKey::as_str).collect()
    } else {
        brief.target_keys.iter().map(TargetKey::as_str).collect()
    };
    keys.join(", ")
}

// ============================================================================
// Copy pipeline
// ============================================================================

/// Generator prompt. Revision notes from the collapser are appended when present.
pub fn generate(brief: &CopyBrief, candidate_count: u32, notes: &[String]) -> AgentPrompt {
    let system = format!(
        "You write website copy for local service businesses. {ENVELOPE_RULE} \
Keys: variants (array of {{targetKey, value, rationale?, confidence?, risks?}}), confidence, risks, assumptions."
    );
    let business = brief.business.as_ref().map(pretty).unwrap_or_default();
    let user = format!(
        "Propose exactly {candidate_count} variants.\n\nBrief:\n{}\n\nTarget sections: {}\n\nConstraints:\n{}\n\nBusiness facts:\n{}\n\n\
Headlines stay under 80 characters, subheadlines under 140, calls to action under 60. \
List sections carry 3 to 5 items.{}",
        brief.brief,
        targets(brief),
        bullets(&brief.constraints),
        if business.is_empty() { "none".to_string() } else { business },
        notes_block(notes),
    );
    AgentPrompt::new(system, user).with_candidates(candidate_count)
}

/// Critic prompt for one variant.
pub fn critique(brief: &CopyBrief, index: usize, variant: &Variant) -> AgentPrompt {
    let system = format!(
        "You critique website copy for accuracy, clarity and compliance. {ENVELOPE_RULE} \
Keys: score (0-1), issues, improvements, needsHuman, needsHumanReason?. \
Set needsHuman when the copy makes claims that cannot be verified from the brief."
    );
    let user = format!(
        "Brief:\n{}\n\nVariant {index}:\n{}",
        brief.brief,
        pretty(variant)
    );
    AgentPrompt::new(system, user)
}

/// Collapser prompt over every variant and its critique.
pub fn collapse(brief: &CopyBrief, variants: &[Variant], critiques: &[Critique]) -> AgentPrompt {
    let system = format!(
        "You pick the single best variant. {ENVELOPE_RULE} \
Keys: chosenIndex (index into the variant list, or null), confidence, reasoning, needsHuman, \
reviseRequested?, revisionNotes?. Request a revision only when every variant needs rework."
    );
    let user = format!(
        "Brief:\n{}\n\nVariants:\n{}\n\nCritiques:\n{}",
        brief.brief,
        pretty(variants),
        pretty(critiques)
    );
    AgentPrompt::new(system, user)
}

// ============================================================================
// Repair pipeline
// ============================================================================

fn failure_context(report: &FailureReport) -> String {
    format!(
        "- Type: {}\n- Error: {}\n- Stop reason: {}\n- Component: {}\n- Command: {}",
        report.failure_type,
        report.error_message,
        report.stop_reason_reported,
        report.component.as_deref().unwrap_or("unknown"),
        report.command,
    )
}

fn snapshots(report: &FailureReport) -> String {
    if report.file_snapshots.is_empty() {
        return "none".to_string();
    }
    report
        .file_snapshots
        .iter()
        .map(|(path, content)| format!("--- {path}\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Diagnostician prompt.
pub fn diagnose(report: &FailureReport) -> AgentPrompt {
    let system = format!(
        "You diagnose build and test failures. {ENVELOPE_RULE} Keys: likelyCause, confidence (0-1), relatedIssues."
    );
    let user = format!(
        "Failure:\n{}\n\nStack:\n{}\n\nLogs:\n{}\n\nFiles:\n{}",
        failure_context(report),
        report.stack.as_deref().unwrap_or("none"),
        bullets(&report.logs),
        snapshots(report),
    );
    AgentPrompt::new(system, user)
}

/// Coder prompt. Notes carry the arbiter's revision requests.
pub fn code(report: &FailureReport, diagnosis: &Diagnosis, notes: &[String]) -> AgentPrompt {
    let system = format!(
        "You propose minimal patches. {ENVELOPE_RULE} Keys: changes (array of {{file, operation: \
edit|create|delete, description, diff, rationale}}), testPlan, testCommands (array of {{cmd, args, cwd?}}), \
rollbackPlan. Every edit or create carries a unified diff starting with `diff --git`."
    );
    let user = format!(
        "Diagnosis:\n{}\n\nFailure:\n{}\n\nAllowed test commands: {}\n\nFiles:\n{}{}",
        pretty(diagnosis),
        failure_context(report),
        report.test_commands.join(", "),
        snapshots(report),
        notes_block(notes),
    );
    AgentPrompt::new(system, user)
}

/// Reviewer prompt.
pub fn review(report: &FailureReport, patch: &PatchProposal) -> AgentPrompt {
    let system = format!(
        "You review proposed patches for correctness and risk. {ENVELOPE_RULE} Keys: approved, concerns, suggestions."
    );
    let user = format!(
        "Failure:\n{}\n\nProposed patch:\n{}",
        failure_context(report),
        pretty(patch)
    );
    AgentPrompt::new(system, user)
}

/// Arbiter prompt.
pub fn arbitrate(diagnosis: &Diagnosis, patch: &PatchProposal, review: &ReviewCritique) -> AgentPrompt {
    let system = format!(
        "You make the final call on a proposed patch. {ENVELOPE_RULE} Keys: decision (apply|reject|revise), \
rationale, finalPatch? (same shape as the proposal, without schemaVersion or requiresApproval). \
Reject any patch whose changes are not in unified diff format, and any patch without at least one \
machine-executable test command."
    );
    let user = format!(
        "Diagnosis:\n{}\n\nProposed patch:\n{}\n\nReview:\n{}",
        pretty(diagnosis),
        pretty(patch),
        pretty(review)
    );
    AgentPrompt::new(system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_carries_notes_and_count() {
        let brief = CopyBrief {
            brief: "Plumber in Austin".to_string(),
            ..CopyBrief::default()
        };
        let prompt = generate(&brief, 3, &["shorter headline".to_string()]);
        assert_eq!(prompt.candidate_count, 3);
        assert!(prompt.user.contains("exactly 3 variants"));
        assert!(prompt.user.contains("- shorter headline"));
        assert!(prompt.system.contains("requiresApproval"));
    }

    #[test]
    fn test_arbiter_prompt_demands_unified_diff() {
        let diagnosis = Diagnosis {
            likely_cause: "x".to_string(),
            confidence: 0.5,
            related_issues: Vec::new(),
        };
        let patch = PatchProposal {
            changes: Vec::new(),
            test_plan: Vec::new(),
            test_commands: Vec::new(),
            rollback_plan: String::new(),
        };
        let review = ReviewCritique {
            approved: true,
            concerns: Vec::new(),
            suggestions: Vec::new(),
        };
        let prompt = arbitrate(&diagnosis, &patch, &review);
        assert!(prompt.system.contains("unified diff"));
        assert!(prompt.system.contains("machine-executable"));
    }
}
