//! Infrastructure layer
//!
//! - Configuration loading (figment)
//! - Logging, redaction and fingerprinting (tracing)
//! - Artifact persistence

pub mod artifact_store;
pub mod config;
pub mod logging;

pub use artifact_store::{ArtifactError, ArtifactStore, RepairSidecars};
