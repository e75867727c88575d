//! Courtside - budget-bounded multi-agent orchestration
//!
//! Two pipelines built on the same primitives:
//!
//! - **Copy**: generate candidate variants, critique each, collapse to one
//!   decision, revising for a bounded number of rounds.
//! - **Repair**: diagnose a failure report, then loop code → review →
//!   arbitrate, gate the approved patch, and hand it to a verifier, with at
//!   most one escalation retry on stale patch context.
//!
//! Every agent output is validated against a closed-world contract, every
//! run is bounded by cost and token caps, and every run ends in exactly one
//! terminal artifact.
//!
//! # Architecture
//!
//! - **Domain** (`domain`): value types, ports and errors
//! - **Adapters** (`adapters`): agent transports and patch verifiers
//! - **Services** (`services`): validation, invoker, budget, pipelines, preflight
//! - **Infrastructure** (`infrastructure`): configuration, logging, artifact store
//! - **CLI** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courtside::adapters::transports::FixtureTransport;
//! use courtside::domain::models::{CopyBrief, CostModel, RoleTable, TraceContext};
//! use courtside::services::{AgentInvoker, CopyOptions, CopyPipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! let invoker = AgentInvoker::new(Arc::new(FixtureTransport::new()), RoleTable::default(), CostModel::default());
//! let record = CopyPipeline::new(Arc::new(invoker))
//!     .run(&brief, CopyOptions::default(), &TraceContext::new("job", "run", "copy"), &CancellationToken::new())
//!     .await;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{ProviderError, ProviderErrorKind};
pub use domain::models::{Config, CopyBrief, DecisionRecord, FailureReport, RepairRecord, TraceContext};
pub use domain::ports::{AgentTransport, PatchVerifier, VerificationOutcome};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CopyOptions, CopyPipeline, RepairOptions, RepairPipeline, ScoreCardStore};
