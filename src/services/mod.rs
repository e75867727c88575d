//! Pipelines and the services they are built from.

pub mod agent_invoker;
pub mod artifact_builders;
pub mod budget_tracker;
pub mod copy_pipeline;
pub mod escalation;
pub mod patch_format;
pub mod preflight;
pub mod prompts;
pub mod repair_pipeline;
pub mod scorecard_store;
pub mod test_commands;
pub mod validation;

pub use agent_invoker::{AgentInvoker, AgentPrompt};
pub use budget_tracker::BudgetTracker;
pub use copy_pipeline::{CopyOptions, CopyPipeline};
pub use preflight::{preflight, PreflightOutcome};
pub use repair_pipeline::{RepairOptions, RepairPipeline, RepairRun};
pub use scorecard_store::ScoreCardStore;
