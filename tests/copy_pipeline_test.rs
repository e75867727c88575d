//! Copy pipeline integration tests against the fixture transport.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use courtside::adapters::transports::{canned_response, FixtureReply, FixtureTransport};
use courtside::domain::errors::ProviderErrorKind;
use courtside::domain::models::{AgentRole, BudgetCaps, ContractName, CopyStopReason, RoleTable};
use courtside::services::{CopyOptions, CopyPipeline};

fn critique(needs_human: bool) -> FixtureReply {
    let mut value = canned_response(ContractName::Critique, 1);
    value["needsHuman"] = json!(needs_human);
    if needs_human {
        value["needsHumanReason"] = json!("claims a license number we cannot verify");
    }
    FixtureReply::Json(value)
}

#[tokio::test]
async fn test_fixture_run_completes_in_one_round() {
    common::setup_test_logging();
    let transport = Arc::new(FixtureTransport::new());
    let pipeline = CopyPipeline::new(common::invoker(transport.clone()));

    let record = pipeline
        .run(&common::brief(), CopyOptions::default(), &common::trace("copy-1"), &CancellationToken::new())
        .await;

    assert!(!record.needs_human);
    assert_eq!(record.telemetry.stop_reason, CopyStopReason::Ok);
    assert_eq!(record.telemetry.rounds_executed, 1);
    assert_eq!(record.telemetry.total_calls, 5);
    assert_eq!(record.critiques.len(), record.variants.len());
    assert_eq!(record.final_choice.chosen_index, Some(0));
    assert!(record.telemetry.estimated_cost_usd > 0.0);
    assert_eq!(record.telemetry.trace_id, "test-job:copy-1");

    let steps: Vec<String> = transport.calls().await.into_iter().map(|c| c.step).collect();
    assert_eq!(steps, ["generate", "critique", "critique", "critique", "collapse"]);

    let wire = serde_json::to_value(&record).unwrap();
    assert!(wire.get("final").is_some());
    assert_eq!(wire["telemetry"]["stopReason"], "ok");
}

#[tokio::test]
async fn test_needs_human_critique_fails_fast() {
    let transport = Arc::new(
        FixtureTransport::new()
            .with_reply(AgentRole::Critic, critique(false))
            .with_reply(AgentRole::Critic, critique(true)),
    );
    let pipeline = CopyPipeline::new(common::invoker(transport.clone()));

    let record = pipeline
        .run(&common::brief(), CopyOptions::default(), &common::trace("copy-2"), &CancellationToken::new())
        .await;

    assert!(record.needs_human);
    assert_eq!(record.telemetry.stop_reason, CopyStopReason::NeedsHuman);
    assert_eq!(record.critiques.len(), 2);
    assert_eq!(transport.call_count(AgentRole::Critic).await, 2);
    assert_eq!(transport.call_count(AgentRole::Collapser).await, 0);
}

#[tokio::test]
async fn test_cost_cap_stops_after_generation() {
    let transport = Arc::new(FixtureTransport::new());
    let pipeline = CopyPipeline::new(common::invoker(transport.clone()));
    let options = CopyOptions {
        caps: BudgetCaps {
            cost_cap_usd: 0.000_001,
            max_tokens_total: 1_000_000,
            max_tokens_per_call: 2_000,
        },
        ..CopyOptions::default()
    };

    let record = pipeline
        .run(&common::brief(), options, &common::trace("copy-3"), &CancellationToken::new())
        .await;

    assert_eq!(record.telemetry.stop_reason, CopyStopReason::CostCap);
    assert_eq!(record.telemetry.total_calls, 1);
    assert!(!record.variants.is_empty());
    assert!(record.critiques.is_empty());
}

#[tokio::test]
async fn test_timeout_is_a_provider_error_not_a_panic() {
    let slow = FixtureReply::Delayed(
        Duration::from_millis(500),
        Box::new(FixtureReply::Json(canned_response(ContractName::CopyProposal, 3))),
    );
    let transport = Arc::new(FixtureTransport::new().with_reply(AgentRole::Generator, slow));
    let roles = RoleTable::default().with_timeout_ms(20);
    let pipeline = CopyPipeline::new(common::invoker_with_roles(transport, roles));

    let record = pipeline
        .run(&common::brief(), CopyOptions::default(), &common::trace("copy-4"), &CancellationToken::new())
        .await;

    assert!(record.needs_human);
    assert_eq!(record.telemetry.stop_reason, CopyStopReason::ProviderError);
    assert!(record.final_choice.reasoning.contains("timed out"));
}

#[tokio::test]
async fn test_cancellation_mid_call_still_yields_record() {
    let slow = FixtureReply::Delayed(
        Duration::from_secs(30),
        Box::new(FixtureReply::Json(canned_response(ContractName::CopyProposal, 3))),
    );
    let transport = Arc::new(FixtureTransport::new().with_reply(AgentRole::Generator, slow));
    let pipeline = CopyPipeline::new(common::invoker(transport));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let record = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.run(&common::brief(), CopyOptions::default(), &common::trace("copy-5"), &cancel),
    )
    .await
    .expect("cancelled run must finish promptly");

    assert_eq!(record.telemetry.stop_reason, CopyStopReason::Cancelled);
    assert!(record.needs_human);
}

#[tokio::test]
async fn test_injected_network_failure() {
    let transport = Arc::new(
        FixtureTransport::new().with_reply(AgentRole::Collapser, FixtureReply::Fail(ProviderErrorKind::Network)),
    );
    let pipeline = CopyPipeline::new(common::invoker(transport));

    let record = pipeline
        .run(&common::brief(), CopyOptions::default(), &common::trace("copy-6"), &CancellationToken::new())
        .await;

    assert_eq!(record.telemetry.stop_reason, CopyStopReason::ProviderError);
    assert_eq!(record.critiques.len(), 3);
    assert_eq!(record.telemetry.total_calls, 4);
}

#[tokio::test]
async fn test_oversized_headline_is_cap_violation() {
    let mut proposal = canned_response(ContractName::CopyProposal, 1);
    proposal["variants"][0]["value"] = json!("x".repeat(81));
    let transport = Arc::new(FixtureTransport::new().with_reply(AgentRole::Generator, FixtureReply::Json(proposal)));
    let pipeline = CopyPipeline::new(common::invoker(transport));

    let record = pipeline
        .run(&common::brief(), CopyOptions::default(), &common::trace("copy-7"), &CancellationToken::new())
        .await;

    assert_eq!(record.telemetry.stop_reason, CopyStopReason::CapViolation);
    assert!(record.errors.iter().any(|e| e.contains("80")));
}
