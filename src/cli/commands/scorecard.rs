//! Implementation of the `courtside scorecard` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::AppContext;
use crate::domain::models::AgentScoreCard;

/// Show agent score cards
#[derive(Args, Debug)]
pub struct ScorecardArgs {
    /// Show a single agent (e.g. coder_gpt-4o-mini)
    #[arg(long)]
    pub agent: Option<String>,
}

/// Result of `courtside scorecard`.
#[derive(Debug, Serialize)]
pub struct ScorecardOutput {
    /// Matching cards.
    pub cards: Vec<AgentScoreCard>,
}

impl CommandOutput for ScorecardOutput {
    fn to_human(&self) -> String {
        if self.cards.is_empty() {
            return "No score cards recorded yet.".to_string();
        }
        let mut lines = vec![format!(
            "{:<36} {:>7} {:>8} {:>8} {:>7}  {}",
            "AGENT", "REPAIRS", "SUCCESS", "QUALITY", "TRUST", "TREND"
        )];
        for card in &self.cards {
            lines.push(format!(
                "{:<36} {:>7} {:>7.0}% {:>8.2} {:>7.3}  {:?}",
                truncate(&card.agent_id, 36),
                card.metrics.total_repairs,
                card.metrics.success_rate * 100.0,
                card.metrics.avg_quality,
                card.trust.current,
                card.trust.trend,
            ));
        }
        lines.join("\n")
    }
}

/// Print saved score cards, optionally for one agent.
pub async fn execute(args: ScorecardArgs, ctx: &AppContext) -> Result<()> {
    let mut cards = ctx
        .store()
        .load_scorecards()
        .await
        .context("Failed to load score cards")?;
    if let Some(agent) = &args.agent {
        cards.retain(|c| &c.agent_id == agent);
    }
    output(&ScorecardOutput { cards }, ctx.json);
    Ok(())
}
