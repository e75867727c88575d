//! Implementation of the `courtside preflight` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::commands::read_json;
use crate::cli::output::{output, CommandOutput};
use crate::cli::AppContext;
use crate::services::{preflight, PreflightOutcome};

/// Check a failure report without calling any agent
#[derive(Args, Debug)]
pub struct PreflightArgs {
    /// Failure report JSON file
    #[arg(long)]
    pub from: PathBuf,

    /// Repository root that report paths are resolved against
    #[arg(long, default_value = ".")]
    pub repo_root: PathBuf,
}

/// Result of `courtside preflight`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightCommandOutput {
    /// Whether the report passed.
    pub ok: bool,
    /// Rejection category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Rejection details.
    pub errors: Vec<String>,
    /// Normalized test commands of an accepted report.
    pub test_commands: Vec<String>,
}

impl CommandOutput for PreflightCommandOutput {
    fn to_human(&self) -> String {
        if self.ok {
            let mut lines = vec!["Preflight passed".to_string()];
            for cmd in &self.test_commands {
                lines.push(format!("  test: {cmd}"));
            }
            return lines.join("\n");
        }
        let mut lines = vec![format!(
            "Preflight rejected: {}",
            self.stop_reason.as_deref().unwrap_or("unknown")
        )];
        lines.extend(self.errors.iter().map(|e| format!("  - {e}")));
        lines.join("\n")
    }
}

/// Preflight a report file and print the outcome.
pub async fn execute(args: PreflightArgs, ctx: &AppContext) -> Result<()> {
    let raw = read_json(&args.from).await?;
    let result = match preflight(&raw, &args.repo_root) {
        PreflightOutcome::Passed(report) => PreflightCommandOutput {
            ok: true,
            stop_reason: None,
            errors: Vec::new(),
            test_commands: report.test_commands,
        },
        PreflightOutcome::Rejected { stop_reason, errors } => PreflightCommandOutput {
            ok: false,
            stop_reason: Some(stop_reason.as_str().to_string()),
            errors,
            test_commands: Vec::new(),
        },
    };
    output(&result, ctx.json);
    Ok(())
}
