//! Replay transport.
//!
//! Fixture files live at `<base_dir>/<replay_id>/<role>.json`, each a JSON
//! array of [`ReplayEntry`] served in order. Once a role's array is exhausted
//! the last entry keeps being served.
//!
//! In record mode an upstream transport serves the call and the response is
//! appended to the role's file. An existing file from an earlier session is
//! never replaced unless `allow_overwrite` is set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::estimate_tokens;
use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::AgentRole;
use crate::domain::ports::{AgentRequest, AgentTransport, TransportResponse};

/// One recorded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEntry {
    /// Reply text.
    pub text: String,
    /// Serving model, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Prompt tokens, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Completion tokens, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

enum Mode {
    Replay {
        cursors: Mutex<HashMap<AgentRole, usize>>,
    },
    Record {
        upstream: Arc<dyn AgentTransport>,
        allow_overwrite: bool,
        /// Roles whose file this session has already started.
        started: Mutex<HashSet<AgentRole>>,
    },
}

/// Serves or records agent replies as one JSON file per role.
pub struct ReplayTransport {
    dir: PathBuf,
    mode: Mode,
}

fn replay_error(message: impl Into<String>) -> ProviderError {
    ProviderError::new(ProviderErrorKind::Replay, message)
}

async fn read_entries(path: &Path) -> Result<Vec<ReplayEntry>, ProviderError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| replay_error(format!("replay fixture missing: {}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| replay_error(format!("replay fixture is not an entry array: {}", path.display())))
}

impl ReplayTransport {
    /// Serve recorded responses from `<base_dir>/<replay_id>/`.
    pub fn replay(base_dir: impl AsRef<Path>, replay_id: &str) -> Self {
        Self {
            dir: base_dir.as_ref().join(replay_id),
            mode: Mode::Replay {
                cursors: Mutex::new(HashMap::new()),
            },
        }
    }

    /// Forward to `upstream` and capture each response under
    /// `<base_dir>/<replay_id>/`.
    pub fn record(
        upstream: Arc<dyn AgentTransport>,
        base_dir: impl AsRef<Path>,
        replay_id: &str,
        allow_overwrite: bool,
    ) -> Self {
        Self {
            dir: base_dir.as_ref().join(replay_id),
            mode: Mode::Record {
                upstream,
                allow_overwrite,
                started: Mutex::new(HashSet::new()),
            },
        }
    }

    fn role_file(&self, role: AgentRole) -> PathBuf {
        self.dir.join(format!("{}.json", role.as_str()))
    }

    async fn serve(
        &self,
        request: &AgentRequest,
        cursors: &Mutex<HashMap<AgentRole, usize>>,
    ) -> Result<TransportResponse, ProviderError> {
        let entries = read_entries(&self.role_file(request.role)).await?;
        let Some(last) = entries.len().checked_sub(1) else {
            return Err(replay_error(format!("replay fixture for {} is empty", request.role)));
        };

        let index = {
            let mut cursors = cursors.lock().await;
            let cursor = cursors.entry(request.role).or_insert(0);
            let index = (*cursor).min(last);
            *cursor += 1;
            index
        };
        debug!(role = %request.role, index, "serving replay entry");

        let entry = &entries[index];
        Ok(TransportResponse {
            text: entry.text.clone(),
            model_id: entry.model_id.clone().unwrap_or_else(|| request.model_id.clone()),
            input_tokens: entry.input_tokens.unwrap_or_else(|| {
                estimate_tokens(&request.system_prompt) + estimate_tokens(&request.user_prompt)
            }),
            output_tokens: entry.output_tokens.unwrap_or_else(|| estimate_tokens(&entry.text)),
        })
    }

    async fn capture(
        &self,
        request: &AgentRequest,
        upstream: &Arc<dyn AgentTransport>,
        allow_overwrite: bool,
        started: &Mutex<HashSet<AgentRole>>,
    ) -> Result<TransportResponse, ProviderError> {
        let path = self.role_file(request.role);
        let mut started = started.lock().await;
        let first_in_session = !started.contains(&request.role);
        if first_in_session && !allow_overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(replay_error(format!(
                "refusing to overwrite existing replay fixture: {}",
                path.display()
            )));
        }

        let response = upstream.complete(request).await?;

        let mut entries = if first_in_session {
            Vec::new()
        } else {
            read_entries(&path).await?
        };
        entries.push(ReplayEntry {
            text: response.text.clone(),
            model_id: Some(response.model_id.clone()),
            input_tokens: Some(response.input_tokens),
            output_tokens: Some(response.output_tokens),
        });

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|_| replay_error(format!("cannot create replay directory: {}", self.dir.display())))?;
        let body = serde_json::to_vec_pretty(&entries)
            .map_err(|_| replay_error("cannot serialize replay entries"))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|_| replay_error(format!("cannot write replay fixture: {}", path.display())))?;
        started.insert(request.role);

        info!(role = %request.role, entries = entries.len(), "recorded replay entry");
        Ok(response)
    }
}

#[async_trait]
impl AgentTransport for ReplayTransport {
    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Replay { .. } => "replay",
            Mode::Record { .. } => "replay_record",
        }
    }

    async fn complete(&self, request: &AgentRequest) -> Result<TransportResponse, ProviderError> {
        match &self.mode {
            Mode::Replay { cursors } => self.serve(request, cursors).await,
            Mode::Record {
                upstream,
                allow_overwrite,
                started,
            } => self.capture(request, upstream, *allow_overwrite, started).await,
        }
    }
}
