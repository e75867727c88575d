//! Process-wide store of agent score cards.
//!
//! Cards are created on an agent's first repair and folded forward on every
//! later one. Each update runs read-modify-write under a single write lock.

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::{AgentRole, AgentScoreCard, RepairObservation, RepairRecord};

/// Shared, in-memory score cards keyed by agent id.
#[derive(Debug, Clone, Default)]
pub struct ScoreCardStore {
    cards: Arc<RwLock<HashMap<String, AgentScoreCard>>>,
}

impl ScoreCardStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from previously persisted cards.
    pub fn from_cards(cards: impl IntoIterator<Item = AgentScoreCard>) -> Self {
        let map = cards.into_iter().map(|c| (c.agent_id.clone(), c)).collect();
        Self {
            cards: Arc::new(RwLock::new(map)),
        }
    }

    /// Update or create the card for `role` on `model_id`, returning the
    /// updated card.
    pub async fn update(&self, role: AgentRole, model_id: &str, obs: &RepairObservation) -> AgentScoreCard {
        let agent_id = AgentScoreCard::agent_id_for(role, model_id);
        let mut cards = self.cards.write().await;
        let card = cards
            .entry(agent_id)
            .or_insert_with(|| AgentScoreCard::new(role, model_id));
        card.record(obs, Utc::now());
        debug!(agent_id = %card.agent_id, trust = card.trust.current, "score card updated");
        card.clone()
    }

    /// Fold a finished repair into the coder, reviewer and arbiter cards.
    /// Roles that never ran are skipped.
    pub async fn record_repair(&self, record: &RepairRecord) -> Vec<AgentScoreCard> {
        let models = &record.diagnosis.models;
        let scores = &record.scorecard;
        let file_types = file_types(record);
        let mut updated = Vec::new();

        for (role, model, quality) in [
            (AgentRole::Coder, &models.coder, scores.coder_score),
            (AgentRole::Reviewer, &models.reviewer, scores.reviewer_score),
            (AgentRole::Arbiter, &models.arbiter, scores.arbiter_score),
        ] {
            if model == "none" {
                continue;
            }
            let obs = RepairObservation {
                repair_id: record.meta.repair_id.clone(),
                success: record.execution.applied,
                quality,
                latency_ms: record.execution.latency_ms,
                cost_usd: record.execution.cost_usd,
                failure_type: record.meta.failure_type.clone(),
                file_types: file_types.clone(),
            };
            updated.push(self.update(role, model, &obs).await);
        }
        updated
    }

    /// Card for `agent_id`, if one exists.
    pub async fn get(&self, agent_id: &str) -> Option<AgentScoreCard> {
        self.cards.read().await.get(agent_id).cloned()
    }

    /// All cards, ordered by agent id.
    pub async fn all(&self) -> Vec<AgentScoreCard> {
        let mut cards: Vec<AgentScoreCard> = self.cards.read().await.values().cloned().collect();
        cards.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        cards
    }
}

fn file_types(record: &RepairRecord) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for change in &record.patch_plan.changes {
        if let Some(ext) = Path::new(&change.file).extension().and_then(|e| e.to_str()) {
            let ext = format!(".{ext}");
            if !types.contains(&ext) {
                types.push(ext);
            }
        }
    }
    types
}
