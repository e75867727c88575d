//! Record a run through the fixture transport, then replay it offline.

mod common;

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use courtside::adapters::transports::{FixtureTransport, ReplayEntry, ReplayTransport};
use courtside::domain::errors::ProviderErrorKind;
use courtside::domain::models::{AgentRole, ContractName, CostModel, RoleTable, TraceContext};
use courtside::domain::ports::{AgentRequest, AgentTransport};
use courtside::services::{AgentInvoker, CopyOptions, CopyPipeline};

fn request(role: AgentRole) -> AgentRequest {
    AgentRequest {
        role,
        contract: role.contract(),
        model_id: "openai/gpt-4o".to_string(),
        system_prompt: "system".to_string(),
        user_prompt: "user".to_string(),
        max_tokens: 256,
        temperature: None,
        trace: TraceContext::new("job", "run", role.as_str()),
        candidate_count: 1,
    }
}

async fn copy_run(transport: Arc<dyn AgentTransport>) -> courtside::domain::models::DecisionRecord {
    let invoker = Arc::new(AgentInvoker::new(transport, RoleTable::default(), CostModel::default()));
    CopyPipeline::new(invoker)
        .run(&common::brief(), CopyOptions::default(), &common::trace("replayed"), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_recorded_run_replays_identically() {
    let dir = common::temp_dir();
    let upstream = Arc::new(FixtureTransport::new());

    let recorded = copy_run(Arc::new(ReplayTransport::record(upstream.clone(), dir.path(), "session-1", false))).await;
    assert_eq!(recorded.telemetry.total_calls, 5);

    let critic: Vec<ReplayEntry> =
        serde_json::from_slice(&std::fs::read(dir.path().join("session-1/critic.json")).unwrap()).unwrap();
    assert_eq!(critic.len(), 3);

    let replayed = copy_run(Arc::new(ReplayTransport::replay(dir.path(), "session-1"))).await;

    assert_eq!(replayed.variants, recorded.variants);
    assert_eq!(replayed.final_choice, recorded.final_choice);
    assert_eq!(replayed.telemetry.total_input_tokens, recorded.telemetry.total_input_tokens);
    assert_eq!(replayed.telemetry.total_output_tokens, recorded.telemetry.total_output_tokens);
    assert_eq!(upstream.calls().await.len(), 5);
}

#[tokio::test]
async fn test_record_refuses_to_overwrite_existing_fixture() {
    let dir = common::temp_dir();
    let upstream: Arc<dyn AgentTransport> = Arc::new(FixtureTransport::new());

    let first = ReplayTransport::record(upstream.clone(), dir.path(), "s", false);
    first.complete(&request(AgentRole::Critic)).await.unwrap();

    let second = ReplayTransport::record(upstream.clone(), dir.path(), "s", false);
    let err = second.complete(&request(AgentRole::Critic)).await.unwrap_err();
    assert_eq!(err.kind(), ProviderErrorKind::Replay);

    let third = ReplayTransport::record(upstream, dir.path(), "s", true);
    assert!(third.complete(&request(AgentRole::Critic)).await.is_ok());
}

#[tokio::test]
async fn test_exhausted_fixture_repeats_last_entry() {
    let dir = common::temp_dir();
    let role_dir = dir.path().join("short");
    std::fs::create_dir_all(&role_dir).unwrap();
    let entries = json!([
        { "text": "first", "inputTokens": 1, "outputTokens": 1 },
        { "text": "second" }
    ]);
    std::fs::write(role_dir.join("arbiter.json"), entries.to_string()).unwrap();

    let transport = ReplayTransport::replay(dir.path(), "short");
    let mut texts = Vec::new();
    for _ in 0..3 {
        texts.push(transport.complete(&request(AgentRole::Arbiter)).await.unwrap().text);
    }
    assert_eq!(texts, ["first", "second", "second"]);
}

#[tokio::test]
async fn test_missing_fixture_is_replay_error() {
    let dir = common::temp_dir();
    let transport = ReplayTransport::replay(dir.path(), "nothing-here");
    let err = transport.complete(&request(AgentRole::Coder)).await.unwrap_err();
    assert_eq!(err.kind(), ProviderErrorKind::Replay);
    assert_eq!(request(AgentRole::Coder).contract, ContractName::PatchProposal);
}
