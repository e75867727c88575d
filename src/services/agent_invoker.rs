//! Agent invoker: one role-scoped model call through the selected transport.
//!
//! Enforces the role's capability and timeout, honours run cancellation,
//! strips markdown fences, prices the call with the shared [`CostModel`], and
//! logs only counts, ids and fingerprints.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::{AgentCallResult, AgentRole, ContractName, CostModel, RoleTable, TraceContext};
use crate::domain::ports::{AgentRequest, AgentTransport};
use crate::infrastructure::logging::fingerprint;
use crate::services::validation::{validate, ValidationCode, ValidationFailure};

/// Prompt pair plus the generation fan-out.
#[derive(Debug, Clone)]
pub struct AgentPrompt {
    /// System message.
    pub system: String,
    /// User message.
    pub user: String,
    /// Candidates the generator should return; 1 for every other role.
    pub candidate_count: u32,
}

impl AgentPrompt {
    /// Single-candidate prompt.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            candidate_count: 1,
        }
    }

    /// Set the generation fan-out.
    #[must_use]
    pub const fn with_candidates(mut self, n: u32) -> Self {
        self.candidate_count = n;
        self
    }
}

/// Why a completed call's output could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractFailure {
    /// Output was not a JSON object, even after fence stripping.
    Parse,
    /// Parsed but failed the contract.
    Schema(ValidationFailure),
}

/// Strip a surrounding ```` ```json ```` (or bare ```` ``` ````) fence.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Makes agent calls through a transport and validates their output.
pub struct AgentInvoker {
    transport: Arc<dyn AgentTransport>,
    roles: RoleTable,
    pricing: CostModel,
}

impl AgentInvoker {
    /// Invoker over `transport` with per-role settings and a cost model.
    pub fn new(transport: Arc<dyn AgentTransport>, roles: RoleTable, pricing: CostModel) -> Self {
        Self {
            transport,
            roles,
            pricing,
        }
    }

    /// Role settings.
    pub const fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Name of the underlying transport, for logs.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Make one call as `role`.
    ///
    /// A call that never started (cancelled, capability missing) and a call
    /// that failed in flight both come back as a sanitized [`ProviderError`].
    pub async fn call(
        &self,
        role: AgentRole,
        trace: &TraceContext,
        prompt: &AgentPrompt,
        max_tokens: u64,
        cancel: &CancellationToken,
    ) -> Result<AgentCallResult, ProviderError> {
        let config = self.roles.get(role);
        let span = info_span!(
            "agent_call",
            job_id = %trace.job_id,
            run_id = %trace.run_id,
            step = %trace.step,
            role = %role,
            model = %config.model_id,
            transport = self.transport.name(),
        );

        async move {
            if !config.permits(role) {
                warn!("role configuration lacks the required capability");
                return Err(ProviderError::new(
                    ProviderErrorKind::MissingCapability,
                    format!("role {role} is not configured with capability {:?}", role.required_capability()),
                ));
            }
            if cancel.is_cancelled() {
                return Err(ProviderError::cancelled());
            }

            let request = AgentRequest {
                role,
                contract: role.contract(),
                model_id: config.model_id.clone(),
                system_prompt: prompt.system.clone(),
                user_prompt: prompt.user.clone(),
                max_tokens,
                temperature: config.temperature,
                trace: trace.clone(),
                candidate_count: prompt.candidate_count,
            };

            let started = Instant::now();
            let timeout = Duration::from_millis(config.timeout_ms);
            let outcome = tokio::select! {
                () = cancel.cancelled() => Err(ProviderError::cancelled()),
                res = tokio::time::timeout(timeout, self.transport.complete(&request)) => {
                    res.unwrap_or_else(|_| Err(ProviderError::timeout(config.timeout_ms)))
                }
            };
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    warn!(
                        kind = ?err.kind(),
                        error = %err,
                        upstream = err.fingerprint().unwrap_or("-"),
                        latency_ms,
                        "agent call failed"
                    );
                    return Err(err);
                }
            };

            let body = strip_json_fence(&response.text);
            let parsed_json = serde_json::from_str::<Value>(body).ok();
            if parsed_json.is_none() {
                warn!(response = %fingerprint(&response.text), "agent output is not JSON");
            }
            let estimated_cost_usd = self
                .pricing
                .estimate(response.input_tokens, response.output_tokens);

            info!(
                served_by = %response.model_id,
                input_tokens = response.input_tokens,
                output_tokens = response.output_tokens,
                latency_ms,
                cost_usd = estimated_cost_usd,
                response = %fingerprint(&response.text),
                "agent call completed"
            );

            Ok(AgentCallResult {
                role,
                model_id: response.model_id,
                raw_text: response.text,
                parsed_json,
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                latency_ms,
                estimated_cost_usd,
            })
        }
        .instrument(span)
        .await
    }
}

/// Validate a call's parsed output against `contract`.
pub fn validate_call(call: &AgentCallResult, contract: ContractName) -> Result<Value, ContractFailure> {
    let Some(parsed) = call.parsed_json.as_ref() else {
        return Err(ContractFailure::Parse);
    };
    validate(contract, parsed).map_err(|failure| {
        if failure.code == ValidationCode::InvalidJson {
            warn!(
                contract = %contract,
                response = %fingerprint(&call.raw_text),
                "agent output is not a JSON object"
            );
            return ContractFailure::Parse;
        }
        warn!(
            contract = %contract,
            errors = failure.errors.len(),
            response = %fingerprint(&call.raw_text),
            "agent output failed its contract"
        );
        ContractFailure::Schema(failure)
    })
}
