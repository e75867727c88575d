//! Property tests: budget monotonicity, closed-world contracts, preflight
//! rejection of forbidden paths and chained commands.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::path::Path;

use courtside::adapters::transports::canned_response;
use courtside::domain::models::{
    AgentCallResult, AgentRole, BudgetCaps, BudgetCheck, BudgetState, ContractName, CostModel, PreflightStopReason,
};
use courtside::services::budget_tracker::{would_exceed, BudgetTracker, MIN_TOKENS_PER_CALL};
use courtside::services::preflight::{preflight, PreflightOutcome};
use courtside::services::test_commands::validate_command;
use courtside::services::validation::validate;

fn call(input_tokens: u64, output_tokens: u64) -> AgentCallResult {
    AgentCallResult {
        role: AgentRole::Generator,
        model_id: "m".into(),
        raw_text: String::new(),
        parsed_json: None,
        input_tokens,
        output_tokens,
        latency_ms: 1,
        estimated_cost_usd: CostModel::default().estimate(input_tokens, output_tokens),
    }
}

fn caps() -> BudgetCaps {
    BudgetCaps {
        cost_cap_usd: 0.5,
        max_tokens_total: 20_000,
        max_tokens_per_call: 2_000,
    }
}

fn stop_reason(raw: &Value) -> Option<PreflightStopReason> {
    match preflight(raw, Path::new("/nonexistent-root")) {
        PreflightOutcome::Passed(_) => None,
        PreflightOutcome::Rejected { stop_reason, .. } => Some(stop_reason),
    }
}

proptest! {
    /// Property: recorded totals never decrease and an exceeded cap stays exceeded.
    #[test]
    fn prop_budget_is_monotonic(calls in prop::collection::vec((0u64..5_000, 0u64..5_000), 1..30)) {
        let mut tracker = BudgetTracker::new(caps());
        let mut previous = BudgetState::default();
        let mut exceeded = false;

        for (input, output) in calls {
            tracker.record("step", &call(input, output));
            let state = tracker.state();
            prop_assert!(state.total_tokens() >= previous.total_tokens());
            prop_assert!(state.estimated_cost_usd >= previous.estimated_cost_usd);
            prop_assert_eq!(state.calls, previous.calls + 1);

            let now_exceeded = matches!(would_exceed(state, &caps()), BudgetCheck::Exceeded(_));
            prop_assert!(!exceeded || now_exceeded);
            exceeded = now_exceeded;
            previous = state.clone();
        }
    }

    /// Property: the next call's ceiling stays within [256, per-call cap].
    #[test]
    fn prop_token_ceiling_bounds(spent in 0u64..40_000) {
        let mut tracker = BudgetTracker::new(caps());
        tracker.record("step", &call(spent, 0));
        let ceiling = tracker.max_tokens_for_next_call();
        prop_assert!(ceiling >= MIN_TOKENS_PER_CALL);
        prop_assert!(ceiling <= caps().max_tokens_per_call.max(MIN_TOKENS_PER_CALL));
    }

    /// Property: no contract accepts an undeclared root key.
    #[test]
    fn prop_contracts_are_closed_world(index in 0usize..ContractName::ALL.len(), key in "[a-z]{3,12}") {
        let contract = ContractName::ALL[index];
        let mut value = canned_response(contract, 2);
        prop_assume!(value.get(&key).is_none());
        prop_assert!(validate(contract, &value).is_ok());

        value[key.as_str()] = json!("unexpected");
        let failure = validate(contract, &value).unwrap_err();
        prop_assert!(failure.errors.iter().any(|e| e.contains(&key)));
    }

    /// Property: any `.env*` target is forbidden, regardless of existence.
    #[test]
    fn prop_env_targets_forbidden(suffix in "[a-zA-Z0-9._-]{0,16}") {
        let raw = json!({
            "failureType": "typecheck",
            "stopReasonReported": "tests_failed",
            "errorMessage": "boom",
            "targets": [format!(".env{suffix}")],
        });
        prop_assert_eq!(stop_reason(&raw), Some(PreflightStopReason::TargetForbidden));
    }

    /// Property: an operator outside quotes is never whitelisted.
    #[test]
    fn prop_chained_commands_rejected(
        op in prop::sample::select(vec!["&&", "||", ";", "|"]),
        tail in "[a-z ]{1,12}",
    ) {
        let command = format!("pnpm test {op} {tail}");
        prop_assert!(validate_command(&command).is_err());
    }
}
