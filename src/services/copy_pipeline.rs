//! Copy pipeline: generate → critique → collapse.
//!
//! Calls are strictly sequential. Every exit path, including provider
//! failures, budget caps and cancellation, produces a [`DecisionRecord`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::{
    AgentCallResult, AgentRole, BudgetCaps, BudgetCheck, CapKind, CollapseOutput, CopyBrief, CopyConfig,
    CopyStopReason, Critique, Decision, DecisionRecord, TraceContext, Variant,
};
use crate::services::agent_invoker::{validate_call, AgentInvoker, AgentPrompt, ContractFailure};
use crate::services::artifact_builders::{build_decision_record, CopyOutcome};
use crate::services::budget_tracker::BudgetTracker;
use crate::services::prompts;
use crate::services::validation::{enforce_section_caps, MAX_VARIANTS};

/// Most generation rounds a run may be configured for.
pub const MAX_ROUNDS_LIMIT: u32 = 6;

/// Resolved limits for one copy run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopyOptions {
    /// Generation rounds before deferring to a human.
    pub max_rounds: u32,
    /// Variants requested per round.
    pub candidate_count: u32,
    /// Budget caps.
    pub caps: BudgetCaps,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self::from_config(&CopyConfig::default())
    }
}

impl CopyOptions {
    /// Rounds clamped to `[1, 6]`, candidates to `[1, 8]`.
    pub fn from_config(config: &CopyConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            candidate_count: config.candidate_count,
            caps: config.caps(),
        }
        .clamped()
    }

    /// Clamp rounds and candidates into their allowed ranges.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            max_rounds: self.max_rounds.clamp(1, MAX_ROUNDS_LIMIT),
            candidate_count: self.candidate_count.clamp(1, MAX_VARIANTS as u32),
            caps: self.caps,
        }
    }
}

/// Why a step stopped the run.
struct Halt {
    reason: CopyStopReason,
    message: String,
    errors: Vec<String>,
}

impl Halt {
    fn new(reason: CopyStopReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    fn cap(kind: CapKind) -> Self {
        let reason = match kind {
            CapKind::CostCap => CopyStopReason::CostCap,
            CapKind::TokenCap => CopyStopReason::TokenCap,
        };
        Self::new(reason, format!("{} reached", kind.as_str()))
    }

    fn provider(err: &ProviderError) -> Self {
        if err.kind() == ProviderErrorKind::Cancelled {
            Self::new(CopyStopReason::Cancelled, "run cancelled")
        } else {
            Self::new(CopyStopReason::ProviderError, err.message())
        }
    }

    fn contract(step: &str, failure: ContractFailure) -> Self {
        match failure {
            ContractFailure::Parse => {
                Self::new(CopyStopReason::JsonParseFailed, format!("{step} output was not a JSON object"))
            }
            ContractFailure::Schema(f) => {
                Self::new(CopyStopReason::SchemaFailed, format!("{step} output failed validation")).with_errors(f.errors)
            }
        }
    }
}

/// Mutable state of one run. Never shared.
struct Run<'a> {
    invoker: &'a AgentInvoker,
    brief: &'a CopyBrief,
    options: CopyOptions,
    trace: &'a TraceContext,
    cancel: &'a CancellationToken,
    budget: BudgetTracker,
    variants: Vec<Variant>,
    critiques: Vec<Critique>,
    notes: Vec<String>,
    round: u32,
}

fn parse<T: DeserializeOwned>(step: &str, value: Value) -> Result<T, Halt> {
    serde_json::from_value(value).map_err(|e| {
        Halt::new(CopyStopReason::SchemaFailed, format!("{step} output has an unexpected shape"))
            .with_errors(vec![format!("(root): {e}")])
    })
}

impl Run<'_> {
    async fn call(&mut self, role: AgentRole, step: &str, prompt: &AgentPrompt) -> Result<AgentCallResult, Halt> {
        let trace = self.trace.with_step(step);
        let max_tokens = self.budget.max_tokens_for_next_call();
        let result = self
            .invoker
            .call(role, &trace, prompt, max_tokens, self.cancel)
            .await
            .map_err(|e| Halt::provider(&e))?;
        self.budget.record(step, &result);
        Ok(result)
    }

    fn check_budget(&self) -> Result<(), Halt> {
        match self.budget.check() {
            BudgetCheck::Ok => Ok(()),
            BudgetCheck::Exceeded(kind) => Err(Halt::cap(kind)),
        }
    }

    async fn generate(&mut self) -> Result<(), Halt> {
        let prompt = prompts::generate(self.brief, self.options.candidate_count, &self.notes);
        let result = self.call(AgentRole::Generator, "generate", &prompt).await?;
        let value = validate_call(&result, AgentRole::Generator.contract()).map_err(|f| Halt::contract("generate", f))?;
        if let Err(failure) = enforce_section_caps(&value) {
            return Err(Halt::new(CopyStopReason::CapViolation, "generated copy exceeds section caps")
                .with_errors(failure.errors));
        }

        let mut variants: Vec<Variant> = parse("generate", value["variants"].clone())?;
        variants.truncate(self.options.candidate_count as usize);
        if variants.is_empty() {
            return Err(Halt::new(CopyStopReason::NoVariants, "generator returned no variants"));
        }
        info!(round = self.round, variants = variants.len(), "variants generated");
        self.variants = variants;
        self.critiques.clear();
        self.check_budget()
    }

    async fn critique_all(&mut self) -> Result<(), Halt> {
        for index in 0..self.variants.len() {
            let prompt = prompts::critique(self.brief, index, &self.variants[index]);
            let result = self.call(AgentRole::Critic, "critique", &prompt).await?;
            let value =
                validate_call(&result, AgentRole::Critic.contract()).map_err(|f| Halt::contract("critique", f))?;
            let mut critique: Critique = parse("critique", value)?;
            critique.variant_index = index;
            let needs_human = critique.needs_human;
            let reason = critique.needs_human_reason.clone();
            self.critiques.push(critique);

            if needs_human {
                warn!(round = self.round, variant = index, "critic escalated to a human");
                let message = reason.unwrap_or_else(|| format!("critic flagged variant {index}"));
                return Err(Halt::new(CopyStopReason::NeedsHuman, message));
            }
            self.check_budget()?;
        }
        Ok(())
    }

    /// `Ok(Some(decision))` when done, `Ok(None)` when another round was
    /// requested.
    async fn collapse(&mut self) -> Result<Option<Decision>, Halt> {
        let prompt = prompts::collapse(self.brief, &self.variants, &self.critiques);
        let result = self.call(AgentRole::Collapser, "collapse", &prompt).await?;
        let value =
            validate_call(&result, AgentRole::Collapser.contract()).map_err(|f| Halt::contract("collapse", f))?;
        let output: CollapseOutput = parse("collapse", value)?;

        if output.needs_human {
            return Err(Halt::new(CopyStopReason::NeedsHuman, output.reasoning));
        }

        if output.revise_requested {
            if self.round >= self.options.max_rounds {
                return Err(Halt::new(CopyStopReason::NeedsHuman, "round limit reached"));
            }
            let note = output.revision_notes.unwrap_or(output.reasoning);
            self.notes.push(note);
            info!(round = self.round, notes = self.notes.len(), "collapse requested a revision");
            self.check_budget()?;
            return Ok(None);
        }

        let chosen = output
            .chosen_index
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.variants.len());
        let Some(index) = chosen else {
            return Err(Halt::new(
                CopyStopReason::InvalidChoice,
                format!("collapse chose an index outside 0..{}", self.variants.len()),
            ));
        };
        Ok(Some(Decision::chosen(
            index,
            self.variants[index].clone(),
            output.confidence,
            output.reasoning,
        )))
    }

    async fn drive(&mut self) -> Result<Decision, Halt> {
        while self.round < self.options.max_rounds {
            self.round += 1;
            self.generate().await?;
            self.critique_all().await?;
            if let Some(decision) = self.collapse().await? {
                return Ok(decision);
            }
        }
        Err(Halt::new(CopyStopReason::NeedsHuman, "round limit reached"))
    }
}

/// Runs copy jobs. Cheap to clone; holds no per-run state.
#[derive(Clone)]
pub struct CopyPipeline {
    invoker: Arc<AgentInvoker>,
}

impl CopyPipeline {
    /// Pipeline calling agents through `invoker`.
    pub const fn new(invoker: Arc<AgentInvoker>) -> Self {
        Self { invoker }
    }

    /// Run one copy job to its decision record.
    /// | Never fails: agent, contract and budget problems end the run with a
    /// stop reason instead.
    pub async fn run(
        &self,
        brief: &CopyBrief,
        options: CopyOptions,
        trace: &TraceContext,
        cancel: &CancellationToken,
    ) -> DecisionRecord {
        let options = options.clamped();
        let span = info_span!("copy_run", job_id = %trace.job_id, run_id = %trace.run_id);

        async move {
            info!(
                max_rounds = options.max_rounds,
                candidates = options.candidate_count,
                cost_cap_usd = options.caps.cost_cap_usd,
                "copy run started"
            );
            let mut run = Run {
                invoker: &self.invoker,
                brief,
                options,
                trace,
                cancel,
                budget: BudgetTracker::new(options.caps),
                variants: Vec::new(),
                critiques: Vec::new(),
                notes: Vec::new(),
                round: 0,
            };

            let (decision, stop_reason, errors) = match run.drive().await {
                Ok(decision) => (decision, CopyStopReason::Ok, Vec::new()),
                Err(halt) => (Decision::needs_human(halt.message), halt.reason, halt.errors),
            };

            info!(
                stop_reason = stop_reason.as_str(),
                rounds = run.round,
                calls = run.budget.state().calls,
                cost_usd = run.budget.state().estimated_cost_usd,
                "copy run finished"
            );

            let outcome = CopyOutcome {
                decision,
                stop_reason,
                variants: std::mem::take(&mut run.variants),
                critiques: std::mem::take(&mut run.critiques),
                errors,
                rounds_executed: run.round,
            };
            build_decision_record(outcome, run.budget.state(), trace)
        }
        .instrument(span)
        .await
    }
}
