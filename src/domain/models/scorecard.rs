//! Per-agent trust score cards derived from repair outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::agent::AgentRole;

/// Upper bound on trust; a human override must always remain possible.
pub const MAX_TRUST: f64 = 0.95;
/// History entries kept per card.
pub const HISTORY_LIMIT: usize = 20;
/// Weight applied to the raw trust score.
pub const DEFAULT_DECAY: f64 = 0.8;
/// Repairs needed before trust stops being scaled down for lack of data.
const FULL_CONFIDENCE_REPAIRS: f64 = 10.0;

/// Direction of recent success compared with the window before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTrend {
    /// Recent success rate is higher.
    Improving,
    /// No meaningful change.
    Stable,
    /// Recent success rate is lower.
    Declining,
}

/// One repair outcome as seen by a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairObservation {
    /// Repair run id.
    pub repair_id: String,
    /// Whether the repair ended `ok`.
    pub success: bool,
    /// Role-specific quality score.
    pub quality: f64,
    /// Run latency.
    pub latency_ms: u64,
    /// Run spend.
    pub cost_usd: f64,
    /// Failure category of the report.
    pub failure_type: String,
    /// Extensions of the files the patch touched, e.g. `.ts`.
    #[serde(default)]
    pub file_types: Vec<String>,
}

/// A single entry in a card's rolling history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Repair run id.
    pub repair_id: String,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
    /// Whether the repair succeeded.
    pub success: bool,
    /// Quality score.
    pub quality: f64,
    /// Run latency.
    pub latency_ms: u64,
    /// Run spend.
    pub cost_usd: f64,
}

/// Running totals and averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMetrics {
    /// Repairs observed.
    pub total_repairs: u32,
    /// Repairs that ended `ok`.
    pub successful_repairs: u32,
    /// Repairs that did not.
    pub failed_repairs: u32,
    /// `successful / total`.
    pub success_rate: f64,
    /// Mean quality.
    pub avg_quality: f64,
    /// Mean latency.
    pub avg_latency_ms: f64,
    /// Mean spend.
    pub avg_cost_usd: f64,
}

/// Trust derived from the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustScore {
    /// Current trust in `[0, 0.95]`.
    pub current: f64,
    /// Recent direction.
    pub trend: TrustTrend,
    /// Last recomputation time.
    pub last_updated: DateTime<Utc>,
    /// Multiplier applied to the raw score.
    pub decay_factor: f64,
}

/// Where an agent has succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specializations {
    /// Successful repairs per failure type.
    pub failure_types: BTreeMap<String, u32>,
    /// Successful repairs per touched file extension.
    pub file_types: BTreeMap<String, u32>,
}

/// Trust record for one role and model pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentScoreCard {
    /// `<role>_<model>`.
    pub agent_id: String,
    /// Role the agent served.
    pub role: AgentRole,
    /// Model behind the agent.
    pub model_id: String,
    /// Aggregate metrics.
    pub metrics: ScoreMetrics,
    /// Rolling history, newest last.
    pub recent_history: Vec<HistoryEntry>,
    /// Trust score.
    pub trust: TrustScore,
    /// Success counts by failure and file type.
    pub specializations: Specializations,
}

impl AgentScoreCard {
    /// Card key for a role and model.
    pub fn agent_id_for(role: AgentRole, model_id: &str) -> String {
        format!("{}_{}", role.as_str(), model_id)
    }

    /// An empty card with zero trust.
    pub fn new(role: AgentRole, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            agent_id: Self::agent_id_for(role, &model_id),
            role,
            model_id,
            metrics: ScoreMetrics::default(),
            recent_history: Vec::new(),
            trust: TrustScore {
                current: 0.0,
                trend: TrustTrend::Stable,
                last_updated: Utc::now(),
                decay_factor: DEFAULT_DECAY,
            },
            specializations: Specializations::default(),
        }
    }

    /// Fold one observation into the card. Never replaces the card.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, obs: &RepairObservation, now: DateTime<Utc>) {
        let prev_total = f64::from(self.metrics.total_repairs);
        let m = &mut self.metrics;
        m.total_repairs += 1;
        if obs.success {
            m.successful_repairs += 1;
        } else {
            m.failed_repairs += 1;
        }
        let total = f64::from(m.total_repairs);
        m.success_rate = f64::from(m.successful_repairs) / total;
        m.avg_quality = m.avg_quality.mul_add(prev_total, obs.quality) / total;
        m.avg_latency_ms = m.avg_latency_ms.mul_add(prev_total, obs.latency_ms as f64) / total;
        m.avg_cost_usd = m.avg_cost_usd.mul_add(prev_total, obs.cost_usd) / total;

        self.recent_history.push(HistoryEntry {
            repair_id: obs.repair_id.clone(),
            timestamp: now,
            success: obs.success,
            quality: obs.quality,
            latency_ms: obs.latency_ms,
            cost_usd: obs.cost_usd,
        });
        if self.recent_history.len() > HISTORY_LIMIT {
            let excess = self.recent_history.len() - HISTORY_LIMIT;
            self.recent_history.drain(..excess);
        }

        let credit = u32::from(obs.success);
        *self
            .specializations
            .failure_types
            .entry(obs.failure_type.clone())
            .or_insert(0) += credit;
        for ext in &obs.file_types {
            *self.specializations.file_types.entry(ext.clone()).or_insert(0) += credit;
        }

        self.trust.current = trust_score(&self.metrics, self.trust.decay_factor);
        self.trust.trend = trend(&self.recent_history);
        self.trust.last_updated = now;
    }
}

/// `min(0.95, (success*0.7 + quality*0.3) * min(1, total/10) * decay)`.
pub fn trust_score(metrics: &ScoreMetrics, decay: f64) -> f64 {
    let mut score = metrics.success_rate.mul_add(0.7, metrics.avg_quality * 0.3);
    let volume = f64::from(metrics.total_repairs) / FULL_CONFIDENCE_REPAIRS;
    score *= volume.min(1.0);
    score *= decay;
    score.clamp(0.0, MAX_TRUST)
}

/// Compare the success rate of the last five entries with the five before.
#[allow(clippy::cast_precision_loss)]
pub fn trend(history: &[HistoryEntry]) -> TrustTrend {
    if history.len() < 3 {
        return TrustTrend::Stable;
    }
    let rate = |entries: &[HistoryEntry]| {
        entries.iter().filter(|e| e.success).count() as f64 / entries.len() as f64
    };
    let split = history.len().saturating_sub(5);
    let recent = rate(&history[split..]);
    let older_start = split.saturating_sub(5);
    let older = if split > older_start {
        rate(&history[older_start..split])
    } else {
        recent
    };

    if recent > older + 0.1 {
        TrustTrend::Improving
    } else if recent < older - 0.1 {
        TrustTrend::Declining
    } else {
        TrustTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(i: usize, success: bool) -> RepairObservation {
        RepairObservation {
            repair_id: format!("repair-{i}"),
            success,
            quality: if success { 0.9 } else { 0.5 },
            latency_ms: 100,
            cost_usd: 0.01,
            failure_type: "typecheck".into(),
            file_types: vec![".ts".into()],
        }
    }

    #[test]
    fn test_trust_is_scaled_by_volume() {
        let mut card = AgentScoreCard::new(AgentRole::Coder, "m");
        card.record(&obs(0, true), Utc::now());
        // (1.0*0.7 + 0.9*0.3) * 0.1 * 0.8
        assert!((card.trust.current - 0.0776).abs() < 1e-9);
    }

    #[test]
    fn test_trust_never_exceeds_cap() {
        let metrics = ScoreMetrics {
            total_repairs: 100,
            successful_repairs: 100,
            success_rate: 1.0,
            avg_quality: 1.0,
            ..Default::default()
        };
        assert!((trust_score(&metrics, 1.0) - MAX_TRUST).abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_is_capped() {
        let mut card = AgentScoreCard::new(AgentRole::Reviewer, "m");
        for i in 0..30 {
            card.record(&obs(i, i % 2 == 0), Utc::now());
        }
        assert_eq!(card.recent_history.len(), HISTORY_LIMIT);
        assert_eq!(card.recent_history[0].repair_id, "repair-10");
        assert_eq!(card.metrics.total_repairs, 30);
        assert_eq!(card.specializations.failure_types["typecheck"], 15);
    }

    #[test]
    fn test_trend_detection() {
        let mut card = AgentScoreCard::new(AgentRole::Arbiter, "m");
        for i in 0..5 {
            card.record(&obs(i, false), Utc::now());
        }
        for i in 5..10 {
            card.record(&obs(i, true), Utc::now());
        }
        assert_eq!(card.trust.trend, TrustTrend::Improving);

        for i in 10..15 {
            card.record(&obs(i, false), Utc::now());
        }
        assert_eq!(card.trust.trend, TrustTrend::Declining);
    }

    #[test]
    fn test_short_history_is_stable() {
        let mut card = AgentScoreCard::new(AgentRole::Coder, "m");
        card.record(&obs(0, true), Utc::now());
        card.record(&obs(1, false), Utc::now());
        assert_eq!(card.trust.trend, TrustTrend::Stable);
    }
}
