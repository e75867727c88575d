//! Independent runs in parallel: isolated budgets, shared score cards.

mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use courtside::adapters::transports::FixtureTransport;
use courtside::adapters::verifiers::ScriptedVerifier;
use courtside::domain::models::{AgentRole, BudgetCaps, CopyStopReason, RepairStopReason};
use courtside::services::{CopyOptions, CopyPipeline, RepairOptions, RepairPipeline, ScoreCardStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_copy_runs_keep_separate_budgets() {
    let transport = Arc::new(FixtureTransport::new());
    let pipeline = Arc::new(CopyPipeline::new(common::invoker(transport.clone())));

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let options = CopyOptions {
                caps: BudgetCaps {
                    max_tokens_total: if i % 2 == 0 { 12_000 } else { 1 },
                    ..BudgetCaps::default()
                },
                ..CopyOptions::default()
            };
            let trace = common::trace(&format!("parallel-{i}"));
            (i, pipeline.run(&common::brief(), options, &trace, &CancellationToken::new()).await)
        }));
    }

    for handle in handles {
        let (i, record) = handle.await.unwrap();
        assert_eq!(record.telemetry.trace_id, format!("test-job:parallel-{i}"));
        if i % 2 == 0 {
            assert_eq!(record.telemetry.stop_reason, CopyStopReason::Ok);
            assert_eq!(record.telemetry.total_calls, 5);
        } else {
            assert_eq!(record.telemetry.stop_reason, CopyStopReason::TokenCap);
            assert_eq!(record.telemetry.total_calls, 1);
        }
    }
    assert_eq!(transport.call_count(AgentRole::Generator).await, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_repairs_share_one_scorecard_store() {
    let repo = common::repo_with(&["server/routes.ts"]);
    let options = RepairOptions::default().with_repo_root(repo.path());
    let pipeline = Arc::new(RepairPipeline::new(
        common::invoker(Arc::new(FixtureTransport::new())),
        Arc::new(ScriptedVerifier::passing()),
    ));
    let store = ScoreCardStore::new();

    let mut handles = Vec::new();
    for i in 0..6 {
        let pipeline = Arc::clone(&pipeline);
        let store = store.clone();
        let options = options.clone();
        handles.push(tokio::spawn(async move {
            let run = pipeline
                .run_from_raw(
                    &common::failure_report(),
                    &options,
                    &common::trace(&format!("rep-{i}")),
                    &CancellationToken::new(),
                )
                .await;
            assert_eq!(run.record.execution.stop_reason, RepairStopReason::Ok);
            store.record_repair(&run.record).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let cards = store.all().await;
    assert_eq!(cards.len(), 3);
    for card in cards {
        assert_eq!(card.metrics.total_repairs, 6, "{}", card.agent_id);
        assert_eq!(card.metrics.successful_repairs, 6);
    }
}
