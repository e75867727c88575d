//! Transport selection from an explicit [`TransportConfig`].

use std::sync::Arc;

use super::{FixtureTransport, LiveTransport, ReplayTransport};
use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::{ReplayMode, TransportConfig, TransportKind};
use crate::domain::ports::AgentTransport;

/// Build the transport a run should use.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn AgentTransport>, ProviderError> {
    match config.kind {
        TransportKind::Fixture => Ok(Arc::new(FixtureTransport::new())),
        TransportKind::Live => Ok(Arc::new(LiveTransport::from_config(
            &config.live,
            config.allow_network,
        ))),
        TransportKind::Replay => {
            let replay = &config.replay;
            let Some(replay_id) = replay.replay_id.as_deref() else {
                return Err(ProviderError::new(
                    ProviderErrorKind::NotConfigured,
                    "replay transport requires a replay id",
                ));
            };
            match replay.mode {
                ReplayMode::Replay => Ok(Arc::new(ReplayTransport::replay(&replay.base_dir, replay_id))),
                ReplayMode::Record => {
                    let upstream: Arc<dyn AgentTransport> =
                        Arc::new(LiveTransport::from_config(&config.live, config.allow_network));
                    Ok(Arc::new(ReplayTransport::record(
                        upstream,
                        &replay.base_dir,
                        replay_id,
                        replay.allow_overwrite,
                    )))
                }
            }
        }
    }
}
