//! Per-run budget tracking.
//!
//! A [`BudgetTracker`] is created fresh for each orchestration run and owned by
//! that run alone. Callers fold in each completed call with
//! [`record`](BudgetTracker::record) and then ask
//! [`check`](BudgetTracker::check) whether the run may continue. A cap that
//! has been reached means "stop making calls"; the spend that got there is
//! already recorded.

use tracing::debug;

use crate::domain::models::{AgentCallResult, BudgetCaps, BudgetCheck, BudgetState, CapKind};

/// Floor for a single call's output-token request.
pub const MIN_TOKENS_PER_CALL: u64 = 256;

/// Pure cap check. Cost is checked before tokens, and a value that reaches a
/// cap counts as exceeding it.
pub fn would_exceed(state: &BudgetState, caps: &BudgetCaps) -> BudgetCheck {
    if state.estimated_cost_usd >= caps.cost_cap_usd {
        return BudgetCheck::Exceeded(CapKind::CostCap);
    }
    if state.total_tokens() >= caps.max_tokens_total {
        return BudgetCheck::Exceeded(CapKind::TokenCap);
    }
    BudgetCheck::Ok
}

/// Per-run budget: totals so far plus the caps they are checked against.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    state: BudgetState,
    caps: BudgetCaps,
}

impl BudgetTracker {
    /// Empty tracker for `caps`.
    pub fn new(caps: BudgetCaps) -> Self {
        Self {
            state: BudgetState::default(),
            caps,
        }
    }

    /// Configured caps.
    pub const fn caps(&self) -> &BudgetCaps {
        &self.caps
    }

    /// Totals so far.
    pub const fn state(&self) -> &BudgetState {
        &self.state
    }

    /// Fold a completed call into the run's totals.
    pub fn record(&mut self, step: &str, call: &AgentCallResult) {
        self.state.record(step, call);
        debug!(
            step,
            calls = self.state.calls,
            total_tokens = self.state.total_tokens(),
            cost_usd = self.state.estimated_cost_usd,
            "budget updated"
        );
    }

    /// Whether another call may be made.
    pub fn check(&self) -> BudgetCheck {
        would_exceed(&self.state, &self.caps)
    }

    /// Output tokens to request for the next call:
    /// `max(256, min(per_call, remaining))`.
    pub fn max_tokens_for_next_call(&self) -> u64 {
        let remaining = self
            .caps
            .max_tokens_total
            .saturating_sub(self.state.total_tokens());
        self.caps
            .max_tokens_per_call
            .min(remaining)
            .max(MIN_TOKENS_PER_CALL)
    }

    /// Final totals.
    pub fn into_state(self) -> BudgetState {
        self.state
    }
}
