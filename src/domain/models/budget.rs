//! Budget state and caps for one orchestration run.

use serde::{Deserialize, Serialize};

use super::agent::AgentCallResult;

/// Linear cost model: `input * unit_in + output * unit_out` in USD.
///
/// One instance is shared by the invoker and every caller that estimates cost
/// so the tracker and its callers never drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostModel {
    /// USD per prompt token.
    #[serde(default = "default_unit_in")]
    pub unit_in_usd: f64,
    /// USD per completion token.
    #[serde(default = "default_unit_out")]
    pub unit_out_usd: f64,
}

const fn default_unit_in() -> f64 {
    0.000_01
}

const fn default_unit_out() -> f64 {
    0.000_03
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            unit_in_usd: default_unit_in(),
            unit_out_usd: default_unit_out(),
        }
    }
}

impl CostModel {
    /// Estimated USD for a call.
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64).mul_add(self.unit_in_usd, output_tokens as f64 * self.unit_out_usd)
    }
}

/// Ceilings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetCaps {
    /// Spend ceiling in USD.
    pub cost_cap_usd: f64,
    /// Token ceiling across all calls.
    pub max_tokens_total: u64,
    /// Token ceiling for a single call.
    pub max_tokens_per_call: u64,
}

impl Default for BudgetCaps {
    fn default() -> Self {
        Self {
            cost_cap_usd: 2.0,
            max_tokens_total: 12_000,
            max_tokens_per_call: 2_000,
        }
    }
}

/// Which cap a run ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    /// Spend reached the cost ceiling.
    CostCap,
    /// Tokens reached a token ceiling.
    TokenCap,
}

impl CapKind {
    /// Wire name, shared with the stop reasons.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CostCap => "cost_cap",
            Self::TokenCap => "token_cap",
        }
    }
}

/// Answer to "may the run make another call?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    /// Another call is allowed.
    Ok,
    /// A cap has been reached.
    Exceeded(CapKind),
}

impl BudgetCheck {
    /// Whether another call is allowed.
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// `(step, model)` pair recorded for each call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUse {
    /// Pipeline step, e.g. `generate-1`.
    pub step: String,
    /// Model that served the step.
    pub model_id: String,
}

/// Accumulator scoped to one run. Every field only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetState {
    /// Calls made.
    pub calls: u32,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Estimated spend in USD.
    pub estimated_cost_usd: f64,
    /// Summed call latency.
    pub latency_ms_total: u64,
    /// Every call's step and model, in order.
    pub models_used: Vec<ModelUse>,
}

impl BudgetState {
    /// Fold one completed call into the state.
    pub fn record(&mut self, step: &str, call: &AgentCallResult) {
        self.calls = self.calls.saturating_add(1);
        self.input_tokens = self.input_tokens.saturating_add(call.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(call.output_tokens);
        self.estimated_cost_usd += call.estimated_cost_usd.max(0.0);
        self.latency_ms_total = self.latency_ms_total.saturating_add(call.latency_ms);
        self.models_used.push(ModelUse {
            step: step.to_string(),
            model_id: call.model_id.clone(),
        });
    }

    /// Prompt plus completion tokens.
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}
