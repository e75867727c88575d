//! Repair pipeline: diagnose → (code → review → arbitrate)* → verify, with at
//! most one escalation retry.
//!
//! Every exit path produces a [`RepairRecord`], including reports rejected by
//! preflight and failures blocked before any agent call.

use chrono::Utc;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::{
    AgentCallResult, AgentRole, ArbiterDecision, ArbiterVerdict, BudgetCaps, BudgetCheck, BudgetState, Diagnosis,
    EscalationConfig, FailureReport, PatchProposal, RepairAudit, RepairConfig, RepairRecord, RepairStopReason,
    RetryMeta, ReviewCritique, RoleModels, TraceContext,
};
use crate::domain::ports::{PatchVerifier, VerificationOutcome};
use crate::services::agent_invoker::{validate_call, AgentInvoker, AgentPrompt, ContractFailure};
use crate::services::artifact_builders::{build_repair_record, RepairOutcome, RepairRunInfo};
use crate::services::budget_tracker::BudgetTracker;
use crate::services::escalation::{enrich_report, is_stale_context, ESCALATION_LEVEL, ESCALATION_REASON};
use crate::services::patch_format::gate_patch;
use crate::services::preflight::{preflight, PreflightOutcome};
use crate::services::prompts;

/// Most coder iterations a run may be configured for.
pub const MAX_ITERATIONS_LIMIT: u32 = 5;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static blocker pattern compiles")
}

/// Failures no code change can fix.
static BLOCKERS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?i)[`'"]?workflows[`'"]?\s+permission|insufficient permissions|github app permission|missing permission|resource not accessible by integration"#,
    )
});

/// Whether the failure text names a non-code blocker.
pub fn is_blocked(error_message: &str) -> bool {
    BLOCKERS.is_match(error_message)
}

/// Resolved limits and environment for one repair run.
#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// Coder iterations allowed.
    pub max_iterations: u32,
    /// Budget caps.
    pub caps: BudgetCaps,
    /// Escalation retry bounds.
    pub escalation: EscalationConfig,
    /// Root that report paths are resolved against.
    pub repo_root: PathBuf,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self::from_config(&RepairConfig::default())
    }
}

impl RepairOptions {
    /// Options from config, iterations clamped to `[1, 5]`.
    pub fn from_config(config: &RepairConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.clamp(1, MAX_ITERATIONS_LIMIT),
            caps: config.caps(),
            escalation: config.escalation.clone(),
            repo_root: PathBuf::from("."),
        }
    }

    /// Resolve report paths against `repo_root`.
    #[must_use]
    pub fn with_repo_root(mut self, repo_root: impl Into<PathBuf>) -> Self {
        self.repo_root = repo_root.into();
        self
    }
}

/// A finished repair run and its escalation sidecars.
#[derive(Debug, Clone)]
pub struct RepairRun {
    /// Terminal record of the last attempt.
    pub record: RepairRecord,
    /// Escalation bookkeeping.
    pub retry_meta: RetryMeta,
    /// Set only when escalation triggered.
    pub original_report: Option<FailureReport>,
    /// Escalated report, when the run retried.
    pub escalated_report: Option<FailureReport>,
}

impl RepairRun {
    fn single(record: RepairRecord) -> Self {
        Self {
            record,
            retry_meta: RetryMeta::default(),
            original_report: None,
            escalated_report: None,
        }
    }
}

// ============================================================================
// Single attempt
// ============================================================================

struct Halt {
    reason: RepairStopReason,
    message: String,
}

impl Halt {
    fn new(reason: RepairStopReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    fn provider(step: &str, err: &ProviderError) -> Self {
        if err.kind() == ProviderErrorKind::Cancelled {
            Self::new(RepairStopReason::Cancelled, "run cancelled")
        } else {
            Self::new(
                RepairStopReason::HumanReviewRequired,
                format!("{step} call failed: {}", err.message()),
            )
        }
    }

    fn contract(step: &str, failure: &ContractFailure) -> Self {
        let detail = match failure {
            ContractFailure::Parse => "was not a JSON object".to_string(),
            ContractFailure::Schema(f) => format!("failed {}: {}", f.code.as_str(), f.errors.join("; ")),
        };
        Self::new(RepairStopReason::HumanReviewRequired, format!("{step} output {detail}"))
    }
}

fn parse<T: DeserializeOwned>(step: &str, value: Value) -> Result<T, Halt> {
    serde_json::from_value(value).map_err(|_| {
        Halt::new(
            RepairStopReason::HumanReviewRequired,
            format!("{step} output has an unexpected shape"),
        )
    })
}

/// Per-attempt state. Never shared between attempts.
struct Attempt<'a> {
    invoker: &'a AgentInvoker,
    report: &'a FailureReport,
    options: &'a RepairOptions,
    trace: &'a TraceContext,
    cancel: &'a CancellationToken,
    budget: BudgetTracker,
    diagnosis: Option<Diagnosis>,
    proposal: Option<PatchProposal>,
    review: Option<ReviewCritique>,
    arbiter: Option<ArbiterDecision>,
    models: RoleModels,
    audit: RepairAudit,
    notes: Vec<String>,
    logs: Vec<String>,
    iterations: u32,
}

impl<'a> Attempt<'a> {
    fn new(
        invoker: &'a AgentInvoker,
        report: &'a FailureReport,
        options: &'a RepairOptions,
        trace: &'a TraceContext,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            invoker,
            report,
            options,
            trace,
            cancel,
            budget: BudgetTracker::new(options.caps),
            diagnosis: None,
            proposal: None,
            review: None,
            arbiter: None,
            models: RoleModels::none(),
            audit: RepairAudit::default(),
            notes: Vec::new(),
            logs: Vec::new(),
            iterations: 0,
        }
    }

    async fn call(&mut self, role: AgentRole, step: &str, prompt: &AgentPrompt) -> Result<Value, Halt> {
        let trace = self.trace.with_step(step);
        let max_tokens = self.budget.max_tokens_for_next_call();
        let result: AgentCallResult = self
            .invoker
            .call(role, &trace, prompt, max_tokens, self.cancel)
            .await
            .map_err(|e| Halt::provider(step, &e))?;
        self.budget.record(step, &result);

        let model = result.model_id.clone();
        match role {
            AgentRole::Diagnostician => self.models.diagnostician = model,
            AgentRole::Coder => {
                self.models.coder = model;
                self.audit.coder_proposal = result.raw_text.clone();
            }
            AgentRole::Reviewer => {
                self.models.reviewer = model;
                self.audit.reviewer_critique = result.raw_text.clone();
            }
            AgentRole::Arbiter => {
                self.models.arbiter = model;
                self.audit.arbiter_decision = result.raw_text.clone();
            }
            _ => {}
        }

        validate_call(&result, role.contract()).map_err(|f| Halt::contract(step, &f))
    }

    fn check_budget(&self) -> Result<(), Halt> {
        match self.budget.check() {
            BudgetCheck::Ok => Ok(()),
            BudgetCheck::Exceeded(kind) => Err(Halt::new(kind.into(), format!("{} reached", kind.as_str()))),
        }
    }

    async fn diagnose(&mut self) -> Result<Diagnosis, Halt> {
        let value = self
            .call(AgentRole::Diagnostician, "diagnose", &prompts::diagnose(self.report))
            .await?;
        let diagnosis: Diagnosis = parse("diagnose", value)?;
        self.logs
            .push(format!("diagnosis confidence {:.2}", diagnosis.confidence));
        self.diagnosis = Some(diagnosis.clone());
        self.check_budget()?;
        Ok(diagnosis)
    }

    /// One code → review → arbitrate pass. `Ok(None)` means revise and go again.
    async fn iterate(&mut self, diagnosis: &Diagnosis) -> Result<Option<RepairStopReason>, Halt> {
        self.iterations += 1;
        let iteration = self.iterations;

        let value = self
            .call(AgentRole::Coder, "code", &prompts::code(self.report, diagnosis, &self.notes))
            .await?;
        let proposal: PatchProposal = parse("code", value)?;
        self.proposal = Some(proposal.clone());
        self.check_budget()?;

        let value = self
            .call(AgentRole::Reviewer, "review", &prompts::review(self.report, &proposal))
            .await?;
        let review: ReviewCritique = parse("review", value)?;
        self.review = Some(review.clone());
        self.check_budget()?;

        let value = self
            .call(
                AgentRole::Arbiter,
                "arbitrate",
                &prompts::arbitrate(diagnosis, &proposal, &review),
            )
            .await?;
        let decision: ArbiterDecision = parse("arbitrate", value)?;
        let verdict = decision.decision;
        let rationale = decision.rationale.clone();
        self.arbiter = Some(decision);
        self.logs
            .push(format!("iteration {iteration}: arbiter {}", verdict.as_str()));
        info!(iteration, decision = verdict.as_str(), approved = review.approved, "arbiter decided");

        // A terminal verdict makes no further call, so the cap only gates revision.
        match verdict {
            ArbiterVerdict::Apply => Ok(Some(RepairStopReason::Ok)),
            ArbiterVerdict::Reject => Ok(Some(RepairStopReason::PatchFailed)),
            ArbiterVerdict::Revise if iteration >= self.options.max_iterations => {
                Ok(Some(RepairStopReason::MaxIters))
            }
            ArbiterVerdict::Revise => {
                let concerns = if review.concerns.is_empty() {
                    "none".to_string()
                } else {
                    review.concerns.join("; ")
                };
                self.notes.push(format!(
                    "Iteration {iteration}: reviewer concerns: {concerns}. Arbiter: {rationale}"
                ));
                self.check_budget()?;
                Ok(None)
            }
        }
    }

    /// Check the approved patch's format. A failing patch turns the decision
    /// into a reject.
    fn gate(&mut self) -> RepairStopReason {
        let Some(patch) = self.arbiter.as_ref().and_then(|a| a.final_patch.as_ref()).or(self.proposal.as_ref())
        else {
            return RepairStopReason::PatchInvalidFormat;
        };
        match gate_patch(patch) {
            Ok(gated) => {
                if let Some(arbiter) = self.arbiter.as_mut() {
                    arbiter.final_patch = Some(gated);
                }
                RepairStopReason::Ok
            }
            Err(failure) => {
                warn!(
                    stop_reason = failure.stop_reason.as_str(),
                    errors = failure.errors.len(),
                    "approved patch failed the format gate"
                );
                self.logs.extend(failure.errors.iter().map(|e| format!("format gate: {e}")));
                if let Some(arbiter) = self.arbiter.as_mut() {
                    arbiter.decision = ArbiterVerdict::Reject;
                }
                failure.stop_reason
            }
        }
    }

    async fn drive(&mut self) -> Result<RepairStopReason, Halt> {
        let diagnosis = self.diagnose().await?;
        loop {
            if let Some(stop) = self.iterate(&diagnosis).await? {
                if stop == RepairStopReason::Ok {
                    return Ok(self.gate());
                }
                return Ok(stop);
            }
        }
    }

    fn into_outcome(self, loop_stop_reason: RepairStopReason) -> (RepairOutcome, BudgetState) {
        let outcome = RepairOutcome {
            diagnosis: self.diagnosis,
            models: self.models,
            proposal: self.proposal,
            review: self.review,
            arbiter: self.arbiter,
            loop_stop_reason,
            iterations: self.iterations,
            audit: self.audit,
            logs: self.logs,
        };
        (outcome, self.budget.into_state())
    }
}

/// What one attempt left behind for the escalation decision.
struct AttemptResult {
    record: RepairRecord,
    verification: Option<VerificationOutcome>,
    patch: Option<PatchProposal>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs repair jobs. Cheap to clone; holds no per-run state.
#[derive(Clone)]
pub struct RepairPipeline {
    invoker: Arc<AgentInvoker>,
    verifier: Arc<dyn PatchVerifier>,
}

impl RepairPipeline {
    /// Pipeline calling agents through `invoker` and applying patches through `verifier`.
    pub fn new(invoker: Arc<AgentInvoker>, verifier: Arc<dyn PatchVerifier>) -> Self {
        Self { invoker, verifier }
    }

    /// Preflight `raw`, then run. A rejected report still yields a record.
    pub async fn run_from_raw(
        &self,
        raw: &Value,
        options: &RepairOptions,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> RepairRun {
        match preflight(raw, &options.repo_root) {
            PreflightOutcome::Passed(report) => self.run(&report, options, trace, cancel).await,
            PreflightOutcome::Rejected { stop_reason, errors } => {
                warn!(
                    job_id = %trace.job_id,
                    stop_reason = stop_reason.as_str(),
                    errors = errors.len(),
                    "failure report rejected by preflight"
                );
                let failure_type = raw
                    .get("failureType")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let outcome = RepairOutcome::blocked(stop_reason.into(), errors);
                let record = build_repair_record(
                    outcome,
                    None,
                    &BudgetState::default(),
                    trace,
                    run_info(trace, failure_type, false),
                );
                RepairRun::single(record)
            }
        }
    }

    /// Run a preflighted report, escalating once on a stale-context apply
    /// failure when escalation is enabled.
    pub async fn run(
        &self,
        report: &FailureReport,
        options: &RepairOptions,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> RepairRun {
        let span = info_span!("repair_run", job_id = %trace.job_id, run_id = %trace.run_id);
        async move {
            let first = self.attempt(report, options, trace, cancel, false).await;

            let stale = first
                .verification
                .as_ref()
                .filter(|v| v.attempted && !v.applied)
                .and_then(|v| v.apply_stderr.as_deref())
                .is_some_and(is_stale_context);
            if !options.escalation.enabled || !stale {
                return RepairRun::single(first.record);
            }

            let mut retry_meta = RetryMeta {
                escalation_triggered: true,
                level: Some(ESCALATION_LEVEL.to_string()),
                reason: Some(ESCALATION_REASON.to_string()),
                ..RetryMeta::default()
            };
            if cancel.is_cancelled() {
                info!("escalation skipped: run cancelled");
                return RepairRun {
                    record: first.record,
                    retry_meta,
                    original_report: Some(report.clone()),
                    escalated_report: None,
                };
            }

            let enrichment =
                enrich_report(report, first.patch.as_ref(), &options.repo_root, &options.escalation).await;
            warn!(
                files_added = enrichment.files_added.len(),
                bytes_added = enrichment.bytes_added,
                "stale patch context; escalating once"
            );
            retry_meta.did_retry = true;
            retry_meta.retry_count = 1;
            retry_meta.files_added = enrichment.files_added;
            retry_meta.bytes_added = enrichment.bytes_added;

            let second = self.attempt(&enrichment.report, options, trace, cancel, true).await;
            RepairRun {
                record: second.record,
                retry_meta,
                original_report: Some(report.clone()),
                escalated_report: Some(enrichment.report),
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        report: &FailureReport,
        options: &RepairOptions,
        trace: &TraceContext,
        cancel: &CancellationToken,
        escalated: bool,
    ) -> AttemptResult {
        let info = run_info(trace, report.failure_type.clone(), escalated);

        if is_blocked(&report.error_message) {
            warn!(failure_type = %report.failure_type, "failure is a non-code blocker; no agents called");
            let outcome = RepairOutcome::blocked(
                RepairStopReason::HumanReviewRequired,
                vec!["blocked: failure requires a permission or platform change".to_string()],
            );
            return AttemptResult {
                record: build_repair_record(outcome, None, &BudgetState::default(), trace, info),
                verification: None,
                patch: None,
            };
        }

        info!(
            failure_type = %report.failure_type,
            max_iterations = options.max_iterations,
            escalated,
            "repair attempt started"
        );
        let mut attempt = Attempt::new(&self.invoker, report, options, trace, cancel);
        let loop_stop_reason = match attempt.drive().await {
            Ok(stop) => stop,
            Err(halt) => {
                warn!(stop_reason = halt.reason.as_str(), reason = %halt.message, "repair attempt halted");
                attempt.logs.push(halt.message);
                halt.reason
            }
        };

        let (outcome, budget) = attempt.into_outcome(loop_stop_reason);
        let patch = outcome.final_patch().cloned();

        let verification = match (&patch, loop_stop_reason) {
            (Some(patch), RepairStopReason::Ok) => Some(self.verifier.verify(patch, report).await),
            _ => None,
        };

        let record = build_repair_record(outcome, verification.as_ref(), &budget, trace, info);
        info!(
            stop_reason = record.execution.stop_reason.as_str(),
            applied = record.execution.applied,
            iterations = record.meta.iterations,
            cost_usd = record.execution.cost_usd,
            verifier = self.verifier.name(),
            "repair attempt finished"
        );
        AttemptResult {
            record,
            verification,
            patch,
        }
    }
}

fn run_info(trace: &TraceContext, failure_type: String, escalated: bool) -> RepairRunInfo {
    RepairRunInfo {
        repair_id: trace.run_id.clone(),
        failure_type,
        escalated,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transports::{canned_response, FixtureReply, FixtureTransport};
    use crate::adapters::verifiers::{ProposalOnlyVerifier, ScriptedVerifier};
    use crate::domain::models::{ContractName, CostModel, RoleTable};
    use serde_json::json;

    fn pipeline(transport: Arc<FixtureTransport>, verifier: Arc<dyn PatchVerifier>) -> RepairPipeline {
        let invoker = AgentInvoker::new(transport, RoleTable::default(), CostModel::default());
        RepairPipeline::new(Arc::new(invoker), verifier)
    }

    fn report() -> FailureReport {
        FailureReport {
            failure_type: "typecheck".into(),
            stop_reason_reported: "tests_failed".into(),
            error_message: "TS2339: Property 'x' does not exist on type 'Y'".into(),
            command: "pnpm typecheck".into(),
            targets: vec!["server/routes.ts".into()],
            test_commands: vec!["pnpm typecheck".into()],
            ..FailureReport::default()
        }
    }

    fn trace() -> TraceContext {
        TraceContext::new("job-1", "rep-1", "repair")
    }

    fn arbiter_reply(decision: &str) -> FixtureReply {
        let mut value = canned_response(ContractName::ArbiterDecision, 1);
        value["decision"] = json!(decision);
        if decision != "apply" {
            value.as_object_mut().unwrap().remove("finalPatch");
        }
        FixtureReply::Json(value)
    }

    #[test]
    fn test_blocker_phrases() {
        assert!(is_blocked("Resource not accessible by integration"));
        assert!(is_blocked("refusing to allow a GitHub App to create or update workflow without `workflows` permission"));
        assert!(!is_blocked("TS2339: Property 'x' does not exist"));
    }

    #[test]
    fn test_iterations_clamped() {
        let config = RepairConfig {
            max_iterations: 40,
            ..RepairConfig::default()
        };
        assert_eq!(RepairOptions::from_config(&config).max_iterations, MAX_ITERATIONS_LIMIT);
    }

    #[tokio::test]
    async fn test_blocked_failure_calls_no_agent() {
        let transport = Arc::new(FixtureTransport::new());
        let repair = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier));
        let mut report = report();
        report.error_message = "HttpError: Resource not accessible by integration".into();

        let run = repair
            .run(&report, &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::HumanReviewRequired);
        assert!(!run.record.execution.applied);
        assert!(run.record.execution.cost_usd.abs() < f64::EPSILON);
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_apply_with_passing_verifier_is_ok() {
        let repair = pipeline(Arc::new(FixtureTransport::new()), Arc::new(ScriptedVerifier::passing()));
        let run = repair
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        let exec = &run.record.execution;
        assert_eq!(exec.stop_reason, RepairStopReason::Ok);
        assert!(exec.applied && exec.tests_passed);
        assert_eq!(run.record.meta.iterations, 1);
        assert!(!run.retry_meta.escalation_triggered);
    }

    #[tokio::test]
    async fn test_proposal_only_requires_human_review() {
        let repair = pipeline(Arc::new(FixtureTransport::new()), Arc::new(ProposalOnlyVerifier));
        let run = repair
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::HumanReviewRequired);
        assert_eq!(run.record.execution.loop_stop_reason, Some(RepairStopReason::Ok));
        assert!(!run.record.execution.applied);
    }

    #[tokio::test]
    async fn test_revise_until_iterations_run_out() {
        let transport = Arc::new(FixtureTransport::new().with_default_reply(AgentRole::Arbiter, arbiter_reply("revise")));
        let repair = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier));
        let run = repair
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::MaxIters);
        assert_eq!(run.record.meta.iterations, 2);
        assert_eq!(transport.call_count(AgentRole::Coder).await, 2);

        let calls = transport.calls().await;
        let second_code = calls.iter().filter(|c| c.role == AgentRole::Coder).nth(1).unwrap();
        assert!(second_code.user_prompt.contains("Iteration 1"));
    }

    #[tokio::test]
    async fn test_reject_is_patch_failed() {
        let transport = Arc::new(FixtureTransport::new().with_reply(AgentRole::Arbiter, arbiter_reply("reject")));
        let repair = pipeline(transport, Arc::new(ScriptedVerifier::passing()));
        let run = repair
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::PatchFailed);
        assert!(!run.record.execution.applied);
    }

    #[tokio::test]
    async fn test_unknown_decision_needs_human_review() {
        let transport = Arc::new(FixtureTransport::new().with_reply(AgentRole::Arbiter, arbiter_reply("maybe")));
        let repair = pipeline(transport, Arc::new(ScriptedVerifier::passing()));
        let run = repair
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::HumanReviewRequired);
        assert!(run.record.execution.logs.iter().any(|l| l.contains("arbitrate output failed")));
    }

    #[tokio::test]
    async fn test_apply_without_test_commands_is_rejected_by_gate() {
        let mut value = canned_response(ContractName::ArbiterDecision, 1);
        value["finalPatch"]["testCommands"] = json!([]);
        let transport = Arc::new(FixtureTransport::new().with_reply(AgentRole::Arbiter, FixtureReply::Json(value)));
        let verifier = Arc::new(ScriptedVerifier::passing());
        let repair = pipeline(transport, verifier.clone());
        let run = repair
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::TestsMissingTestCommands);
        assert!(verifier.seen_reports().await.is_empty());
        assert!((run.record.scorecard.arbiter_score - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_apply_survives_cap_reached_by_arbiter_call() {
        let uncapped = pipeline(Arc::new(FixtureTransport::new()), Arc::new(ScriptedVerifier::passing()))
            .run(&report(), &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        let spent = uncapped.record.execution.cost_usd;
        assert!(spent > 0.0);

        let options = RepairOptions {
            caps: BudgetCaps {
                cost_cap_usd: spent,
                ..RepairOptions::default().caps
            },
            ..RepairOptions::default()
        };
        let run = pipeline(Arc::new(FixtureTransport::new()), Arc::new(ScriptedVerifier::passing()))
            .run(&report(), &options, &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::Ok);
        assert!(run.record.execution.applied);
    }

    #[tokio::test]
    async fn test_revise_stops_at_cap_reached_by_arbiter_call() {
        let revise = || FixtureTransport::new().with_default_reply(AgentRole::Arbiter, arbiter_reply("revise"));
        let options = RepairOptions {
            max_iterations: 1,
            ..RepairOptions::default()
        };
        let one_pass = pipeline(Arc::new(revise()), Arc::new(ProposalOnlyVerifier))
            .run(&report(), &options, &trace(), &CancellationToken::new())
            .await;
        let spent = one_pass.record.execution.cost_usd;

        let options = RepairOptions {
            caps: BudgetCaps {
                cost_cap_usd: spent,
                ..RepairOptions::default().caps
            },
            ..RepairOptions::default()
        };
        let transport = Arc::new(revise());
        let run = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier))
            .run(&report(), &options, &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::CostCap);
        assert_eq!(transport.call_count(AgentRole::Coder).await, 1);
    }

    #[tokio::test]
    async fn test_backticked_workflows_permission_calls_no_agent() {
        let transport = Arc::new(FixtureTransport::new());
        let repair = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier));
        let mut report = report();
        report.error_message =
            "! [remote rejected] refusing to allow a GitHub App to create or update workflow `.github/workflows/ci.yml` without `workflows` permission".into();

        let run = repair
            .run(&report, &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::HumanReviewRequired);
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_token_cap_after_diagnosis() {
        let options = RepairOptions {
            caps: BudgetCaps {
                cost_cap_usd: 10.0,
                max_tokens_total: 10,
                max_tokens_per_call: 2_000,
            },
            ..RepairOptions::default()
        };
        let transport = Arc::new(FixtureTransport::new());
        let repair = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier));
        let run = repair.run(&report(), &options, &trace(), &CancellationToken::new()).await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::TokenCap);
        assert_eq!(transport.calls().await.len(), 1);
        assert!(run.record.patch_plan.changes.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = Arc::new(FixtureTransport::new());
        let repair = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier));
        let run = repair.run(&report(), &RepairOptions::default(), &trace(), &cancel).await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::Cancelled);
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_preflight_rejection_still_yields_record() {
        let transport = Arc::new(FixtureTransport::new());
        let repair = pipeline(transport.clone(), Arc::new(ProposalOnlyVerifier));
        let raw = json!({ "failureType": "typecheck", "targets": [".env"] });
        let run = repair
            .run_from_raw(&raw, &RepairOptions::default(), &trace(), &CancellationToken::new())
            .await;
        assert_eq!(run.record.execution.stop_reason, RepairStopReason::PacketInvalid);
        assert_eq!(run.record.meta.failure_type, "typecheck");
        assert!(transport.calls().await.is_empty());
    }
}
