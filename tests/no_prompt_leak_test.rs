//! Prompts, briefs and raw model output never reach the log stream.

mod common;

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use courtside::adapters::transports::{FixtureReply, FixtureTransport};
use courtside::adapters::verifiers::ProposalOnlyVerifier;
use courtside::domain::models::{AgentRole, CopyBrief, CopyStopReason};
use courtside::services::{CopyOptions, CopyPipeline, RepairOptions, RepairPipeline};

const BRIEF_MARKER: &str = "BRIEF-MARKER-91f2";
const OUTPUT_MARKER: &str = "OUTPUT-MARKER-5d0a";
const REPORT_MARKER: &str = "REPORT-MARKER-77be";

#[tokio::test]
async fn test_copy_run_logs_no_brief_or_output_text() {
    let (sink, _guard) = common::capture_logs();
    let transport = Arc::new(
        FixtureTransport::new().with_reply(AgentRole::Generator, FixtureReply::Raw(format!("Sure! {OUTPUT_MARKER}"))),
    );
    let pipeline = CopyPipeline::new(common::invoker(transport));
    let brief = CopyBrief {
        brief: format!("Roofing contractor {BRIEF_MARKER}"),
        ..CopyBrief::default()
    };

    let record = pipeline
        .run(&brief, CopyOptions::default(), &common::trace("leak-copy"), &CancellationToken::new())
        .await;
    assert_eq!(record.telemetry.stop_reason, CopyStopReason::JsonParseFailed);

    let logs = sink.contents();
    assert!(logs.contains("agent output is not JSON"), "expected a contract warning in {logs}");
    assert!(!logs.contains(BRIEF_MARKER));
    assert!(!logs.contains(OUTPUT_MARKER));
}

#[tokio::test]
async fn test_repair_run_logs_no_report_text() {
    let (sink, _guard) = common::capture_logs();
    let repo = common::repo_with(&["server/routes.ts"]);
    let mut report = common::failure_report();
    report["errorMessage"] = json!(format!("TS2304 {REPORT_MARKER}"));
    report["logs"] = json!([format!("stack {REPORT_MARKER}")]);

    let pipeline = RepairPipeline::new(
        common::invoker(Arc::new(FixtureTransport::new())),
        Arc::new(ProposalOnlyVerifier),
    );
    let run = pipeline
        .run_from_raw(
            &report,
            &RepairOptions::default().with_repo_root(repo.path()),
            &common::trace("leak-repair"),
            &CancellationToken::new(),
        )
        .await;
    assert!(run.record.audit.coder_proposal.contains("changes"));

    let logs = sink.contents();
    assert!(logs.contains("leak-repair"));
    assert!(!logs.contains(REPORT_MARKER));
}
