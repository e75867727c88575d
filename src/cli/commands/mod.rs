//! CLI command implementations.

pub mod copy;
pub mod preflight;
pub mod repair;
pub mod scorecard;

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Read and parse a JSON input file.
pub(crate) async fn read_json(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}
