//! Implementation of the `courtside repair` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::verifiers::ProposalOnlyVerifier;
use crate::cli::commands::read_json;
use crate::cli::output::{output, CommandOutput};
use crate::cli::AppContext;
use crate::domain::models::{RepairRecord, RetryMeta, TraceContext};
use crate::infrastructure::RepairSidecars;
use crate::services::{RepairOptions, RepairPipeline, ScoreCardStore};

/// Diagnose a failure report and propose a patch
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Failure report JSON file
    #[arg(long)]
    pub from: PathBuf,

    /// Repository root that report paths are resolved against
    #[arg(long, default_value = ".")]
    pub repo_root: PathBuf,

    /// Disable the one-shot escalation retry
    #[arg(long)]
    pub no_escalation: bool,

    /// Repair id (generated when omitted)
    #[arg(long)]
    pub repair_id: Option<String>,
}

/// Result of `courtside repair`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairCommandOutput {
    /// Where the repair record was written.
    pub artifact_dir: PathBuf,
    /// Escalation bookkeeping.
    pub retry_meta: RetryMeta,
    /// The repair record.
    pub record: RepairRecord,
}

impl CommandOutput for RepairCommandOutput {
    fn to_human(&self) -> String {
        let exec = &self.record.execution;
        let mut lines = vec![
            format!("Repair run {}", self.record.meta.repair_id),
            format!("  stop reason: {}", exec.stop_reason.as_str()),
            format!("  applied:     {}", exec.applied),
            format!("  iterations:  {}", self.record.meta.iterations),
            format!("  cost:        ${:.4}", exec.cost_usd),
            format!(
                "  diagnosis:   {} (confidence {:.2})",
                self.record.diagnosis.likely_cause, self.record.diagnosis.confidence
            ),
        ];
        if let Some(loop_stop) = exec.loop_stop_reason {
            lines.push(format!("  loop ended:  {}", loop_stop.as_str()));
        }
        if !self.record.patch_plan.changes.is_empty() {
            lines.push("  changes:".to_string());
            for change in &self.record.patch_plan.changes {
                lines.push(format!("    - {} ({:?})", change.file, change.operation));
            }
        }
        if self.retry_meta.did_retry {
            lines.push(format!(
                "  escalated:   {} file(s), {} byte(s) added",
                self.retry_meta.files_added.len(),
                self.retry_meta.bytes_added
            ));
        }
        for log in &exec.logs {
            lines.push(format!("  log: {log}"));
        }
        lines.push(format!("  artifact:    {}", self.artifact_dir.join("repairRecord.json").display()));
        lines.join("\n")
    }
}

/// Run the repair pipeline, update score cards and write the artifacts.
pub async fn execute(args: RepairArgs, ctx: &AppContext) -> Result<()> {
    let raw = read_json(&args.from).await?;

    let mut repair_config = ctx.config.repair.clone();
    if args.no_escalation {
        repair_config.escalation.enabled = false;
    }
    let options = RepairOptions::from_config(&repair_config).with_repo_root(&args.repo_root);

    let repair_id = args.repair_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let trace = TraceContext::new("cli", repair_id, "repair");
    let pipeline = RepairPipeline::new(ctx.invoker()?, Arc::new(ProposalOnlyVerifier));
    let run = pipeline.run_from_raw(&raw, &options, &trace, &ctx.cancel).await;

    let store = ctx.store();
    let artifact_dir = store
        .write_repair(
            &run.record,
            RepairSidecars {
                retry_meta: &run.retry_meta,
                original_report: run.original_report.as_ref(),
                escalated_report: run.escalated_report.as_ref(),
            },
        )
        .await
        .context("Failed to write repair record")?;

    let scorecards = ScoreCardStore::from_cards(store.load_scorecards().await.context("Failed to load score cards")?);
    let touched = scorecards.record_repair(&run.record).await;
    if !touched.is_empty() {
        store
            .write_run_scorecards(&run.record.meta.repair_id, &touched)
            .await
            .context("Failed to write run score cards")?;
        store
            .save_scorecards(&scorecards.all().await)
            .await
            .context("Failed to save score cards")?;
    }

    output(
        &RepairCommandOutput {
            artifact_dir,
            retry_meta: run.retry_meta,
            record: run.record,
        },
        ctx.json,
    );
    Ok(())
}
