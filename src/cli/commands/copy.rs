//! Implementation of the `courtside copy` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::cli::AppContext;
use crate::domain::models::{CopyBrief, DecisionRecord, TraceContext};
use crate::services::{CopyOptions, CopyPipeline};

/// Generate, critique and collapse copy variants for a brief
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Brief file: a JSON brief object, or plain text used as the brief
    #[arg(long, short)]
    pub brief: PathBuf,

    /// Override the configured round limit
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Override the configured candidate count
    #[arg(long)]
    pub candidates: Option<u32>,

    /// Run id (generated when omitted)
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Result of `courtside copy`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyCommandOutput {
    /// Run id used for the artifact directory.
    pub run_id: String,
    /// Where `decision.json` was written.
    pub artifact_dir: PathBuf,
    /// The decision record.
    pub record: DecisionRecord,
}

impl CommandOutput for CopyCommandOutput {
    fn to_human(&self) -> String {
        let t = &self.record.telemetry;
        let mut lines = vec![
            format!("Copy run {}", self.run_id),
            format!("  stop reason: {}", t.stop_reason.as_str()),
            format!("  rounds:      {}", t.rounds_executed),
            format!("  calls:       {}", t.total_calls),
            format!("  cost:        ${:.4}", t.estimated_cost_usd),
        ];
        match self.record.final_choice.chosen_index {
            Some(i) => lines.push(format!(
                "  chosen:      variant {i} (confidence {:.2})",
                self.record.final_choice.confidence
            )),
            None => lines.push(format!("  needs human: {}", self.record.final_choice.reasoning)),
        }
        for error in &self.record.errors {
            lines.push(format!("  error: {error}"));
        }
        lines.push(format!("  artifact:    {}", self.artifact_dir.join("decision.json").display()));
        lines.join("\n")
    }
}

async fn load_brief(path: &PathBuf) -> Result<CopyBrief> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read brief {}", path.display()))?;
    if text.trim_start().starts_with('{') {
        return serde_json::from_str(&text).with_context(|| format!("Invalid brief in {}", path.display()));
    }
    Ok(CopyBrief {
        brief: text.trim().to_string(),
        ..CopyBrief::default()
    })
}

/// Run the copy pipeline and write its decision record.
pub async fn execute(args: CopyArgs, ctx: &AppContext) -> Result<()> {
    let brief = load_brief(&args.brief).await?;

    let mut copy_config = ctx.config.copy.clone();
    if let Some(rounds) = args.rounds {
        copy_config.max_rounds = rounds;
    }
    if let Some(candidates) = args.candidates {
        copy_config.candidate_count = candidates;
    }
    let options = CopyOptions::from_config(&copy_config);

    let run_id = args.run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let trace = TraceContext::new("cli", run_id.clone(), "copy");
    let pipeline = CopyPipeline::new(ctx.invoker()?);
    let record = pipeline.run(&brief, options, &trace, &ctx.cancel).await;

    let artifact_dir = ctx
        .store()
        .write_decision(&run_id, &record)
        .await
        .context("Failed to write decision record")?;

    output(
        &CopyCommandOutput {
            run_id,
            artifact_dir,
            record,
        },
        ctx.json,
    );
    Ok(())
}
