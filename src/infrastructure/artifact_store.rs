//! Filesystem artifact store.
//!
//! Layout under the configured root:
//!
//! ```text
//! copy/<run_id>/decision.json
//! repair/<repair_id>/repairRecord.json
//! repair/<repair_id>/failureReport.original.json   (escalated runs)
//! repair/<repair_id>/failureReport.escalated.json  (escalated runs)
//! repair/<repair_id>/retryMeta.json                (escalated runs)
//! repair/<repair_id>/scorecards.json
//! scorecards.json                                   (all agents)
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::domain::models::{AgentScoreCard, DecisionRecord, FailureReport, RepairRecord, RetryMeta};

/// Failures reading or writing run artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem failure.
    #[error("Failed to write {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded.
    #[error("Failed to serialize {name}: {source}")]
    Serialize {
        /// Artifact file name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored file could not be decoded.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File that failed to decode.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Escalation sidecars written next to a repair record.
#[derive(Debug, Clone, Copy)]
pub struct RepairSidecars<'a> {
    /// Always written when escalation triggered.
    pub retry_meta: &'a RetryMeta,
    /// Report before escalation.
    pub original_report: Option<&'a FailureReport>,
    /// Report after escalation.
    pub escalated_report: Option<&'a FailureReport>,
}

/// Writes run artifacts under a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/copy/<run_id>`.
    pub fn copy_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("copy").join(run_id)
    }

    /// `<root>/repair/<repair_id>`.
    pub fn repair_dir(&self, repair_id: &str) -> PathBuf {
        self.root.join("repair").join(repair_id)
    }

    /// Write `decision.json` and return the run directory.
    pub async fn write_decision(&self, run_id: &str, record: &DecisionRecord) -> Result<PathBuf, ArtifactError> {
        let dir = self.copy_dir(run_id);
        write_json(&dir, "decision.json", record).await?;
        info!(path = %dir.display(), "decision record written");
        Ok(dir)
    }

    /// Write `repairRecord.json` plus any escalation sidecars.
    pub async fn write_repair(
        &self,
        record: &RepairRecord,
        sidecars: RepairSidecars<'_>,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.repair_dir(&record.meta.repair_id);
        write_json(&dir, "repairRecord.json", record).await?;

        if sidecars.retry_meta.escalation_triggered {
            write_json(&dir, "retryMeta.json", sidecars.retry_meta).await?;
        }
        if let Some(original) = sidecars.original_report {
            write_json(&dir, "failureReport.original.json", original).await?;
        }
        if let Some(escalated) = sidecars.escalated_report {
            write_json(&dir, "failureReport.escalated.json", escalated).await?;
        }
        info!(path = %dir.display(), escalated = sidecars.retry_meta.did_retry, "repair record written");
        Ok(dir)
    }

    /// Write the cards a run touched into its directory.
    pub async fn write_run_scorecards(&self, repair_id: &str, cards: &[AgentScoreCard]) -> Result<(), ArtifactError> {
        write_json(&self.repair_dir(repair_id), "scorecards.json", cards).await
    }

    /// Cumulative cards; empty when none were saved yet.
    pub async fn load_scorecards(&self) -> Result<Vec<AgentScoreCard>, ArtifactError> {
        let path = self.root.join("scorecards.json");
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no score cards saved yet");
                return Ok(Vec::new());
            }
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse { path, source })
    }

    /// Replace the cumulative cards.
    pub async fn save_scorecards(&self, cards: &[AgentScoreCard]) -> Result<(), ArtifactError> {
        write_json(&self.root, "scorecards.json", cards).await
    }
}

async fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &'static str, value: &T) -> Result<(), ArtifactError> {
    fs::create_dir_all(dir).await.map_err(|source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut body = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Serialize { name, source })?;
    body.push('\n');
    let path = dir.join(name);
    fs::write(&path, body)
        .await
        .map_err(|source| ArtifactError::Io { path, source })
}
