//! CLI type definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::copy::CopyArgs;
use crate::cli::commands::preflight::PreflightArgs;
use crate::cli::commands::repair::RepairArgs;
use crate::cli::commands::scorecard::ScorecardArgs;
use crate::domain::models::TransportKind;

/// Courtside - budget-bounded multi-agent copy and repair runs
#[derive(Parser, Debug)]
#[command(name = "courtside")]
#[command(about = "Courtside - budget-bounded multi-agent copy and repair runs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .courtside/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured transport (live, fixture, replay)
    #[arg(short, long, global = true, value_parser = parse_transport)]
    pub transport: Option<TransportKind>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate, critique and collapse copy variants for a brief
    Copy(CopyArgs),

    /// Diagnose a failure report and propose a patch
    Repair(RepairArgs),

    /// Check a failure report without calling any agent
    Preflight(PreflightArgs),

    /// Show agent score cards
    Scorecard(ScorecardArgs),
}

fn parse_transport(s: &str) -> Result<TransportKind, String> {
    TransportKind::from_str(s).ok_or_else(|| format!("unknown transport '{s}' (expected live, fixture or replay)"))
}
