//! Copy pipeline value types: brief, variants, critiques and the decision
//! record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::budget::ModelUse;

/// Section keys a variant may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKey {
    /// Main page headline.
    #[serde(rename = "hero.headline")]
    HeroHeadline,
    /// Line under the headline.
    #[serde(rename = "hero.subheadline")]
    HeroSubheadline,
    /// Call-to-action label.
    #[serde(rename = "hero.cta")]
    HeroCta,
    /// Trust badges.
    #[serde(rename = "trust.items")]
    TrustItems,
    /// Service list.
    #[serde(rename = "services.items")]
    ServicesItems,
    /// Customer reviews.
    #[serde(rename = "socialProof.reviews")]
    SocialProofReviews,
    /// Measured outcomes.
    #[serde(rename = "socialProof.outcomes")]
    SocialProofOutcomes,
    /// Licenses and certifications.
    #[serde(rename = "socialProof.credentials")]
    SocialProofCredentials,
}

impl TargetKey {
    /// Every key, in display order.
    pub const ALL: [Self; 8] = [
        Self::HeroHeadline,
        Self::HeroSubheadline,
        Self::HeroCta,
        Self::TrustItems,
        Self::ServicesItems,
        Self::SocialProofReviews,
        Self::SocialProofOutcomes,
        Self::SocialProofCredentials,
    ];

    /// Dotted wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HeroHeadline => "hero.headline",
            Self::HeroSubheadline => "hero.subheadline",
            Self::HeroCta => "hero.cta",
            Self::TrustItems => "trust.items",
            Self::ServicesItems => "services.items",
            Self::SocialProofReviews => "socialProof.reviews",
            Self::SocialProofOutcomes => "socialProof.outcomes",
            Self::SocialProofCredentials => "socialProof.credentials",
        }
    }

    /// Parse a dotted wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound business context for a copy run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBrief {
    /// Free-form content brief.
    pub brief: String,

    /// Sections the run should target. Empty means "generator's choice".
    #[serde(default)]
    pub target_keys: Vec<TargetKey>,

    /// Hard rules every variant must respect.
    #[serde(default)]
    pub constraints: Vec<String>,

    /// Opaque business facts (name, trade, city, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<Value>,
}

/// One proposed piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Section the content is for.
    pub target_key: TargetKey,
    /// Content: a string or an array of items, depending on the key.
    pub value: Value,
    /// Why the generator proposed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Generator's own confidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Known risks of using this content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<Vec<String>>,
}

/// Critic's assessment of one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Critique {
    /// Index of the critiqued variant.
    #[serde(default)]
    pub variant_index: usize,
    /// Quality score in `[0, 1]`.
    pub score: f64,
    /// Problems found.
    pub issues: Vec<String>,
    /// Suggested fixes.
    pub improvements: Vec<String>,
    /// Whether a human must decide.
    pub needs_human: bool,
    /// Why a human must decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_human_reason: Option<String>,
}

/// Collapser output as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseOutput {
    /// Raw chosen index; may be out of range or negative.
    pub chosen_index: Option<i64>,
    /// Confidence in the choice.
    pub confidence: f64,
    /// Reasoning behind the choice.
    pub reasoning: String,
    /// Whether the collapser defers to a human.
    pub needs_human: bool,
    /// Ask for another generation round.
    #[serde(default)]
    pub revise_requested: bool,
    /// Guidance for the next round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_notes: Option<String>,
}

/// Terminal decision of a copy run. `chosen_index` is `None` iff
/// `needs_human`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Index into the variants list.
    pub chosen_index: Option<usize>,
    /// Copy of the chosen variant.
    pub chosen_variant: Option<Variant>,
    /// Confidence in the choice.
    pub confidence: f64,
    /// Reasoning behind the choice.
    pub reasoning: String,
    /// Whether a human must decide.
    pub needs_human: bool,
}

impl Decision {
    /// A decision that picks a variant.
    pub fn chosen(index: usize, variant: Variant, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            chosen_index: Some(index),
            chosen_variant: Some(variant),
            confidence,
            reasoning: reasoning.into(),
            needs_human: false,
        }
    }

    /// A decision deferred to a human.
    pub fn needs_human(reasoning: impl Into<String>) -> Self {
        Self {
            chosen_index: None,
            chosen_variant: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            needs_human: true,
        }
    }
}

/// Why a copy run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStopReason {
    /// A variant was chosen.
    Ok,
    /// Deferred to a human.
    NeedsHuman,
    /// An agent reply was not a JSON object.
    JsonParseFailed,
    /// An agent reply failed its contract.
    #[serde(rename = "ajv_failed")]
    SchemaFailed,
    /// A variant broke a content cap.
    CapViolation,
    /// The generator produced nothing usable.
    NoVariants,
    /// Cost cap reached.
    CostCap,
    /// Token cap reached.
    TokenCap,
    /// The collapser chose a nonexistent variant.
    InvalidChoice,
    /// The provider call failed.
    ProviderError,
    /// The run was cancelled.
    Cancelled,
}

impl CopyStopReason {
    /// Wire name of the reason.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NeedsHuman => "needs_human",
            Self::JsonParseFailed => "json_parse_failed",
            Self::SchemaFailed => "ajv_failed",
            Self::CapViolation => "cap_violation",
            Self::NoVariants => "no_variants",
            Self::CostCap => "cost_cap",
            Self::TokenCap => "token_cap",
            Self::InvalidChoice => "invalid_choice",
            Self::ProviderError => "provider_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// `final` block of the decision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalChoice {
    /// Index into the variants list.
    pub chosen_index: Option<usize>,
    /// Copy of the chosen variant.
    pub chosen_variant: Option<Variant>,
    /// Confidence in the choice.
    pub confidence: f64,
    /// Reasoning behind the choice.
    pub reasoning: String,
}

/// Spend and call accounting for a copy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyTelemetry {
    /// Trace id shared with logs.
    pub trace_id: String,
    /// Generation rounds run.
    pub rounds_executed: u32,
    /// Agent calls made.
    pub total_calls: u32,
    /// Prompt tokens across all calls.
    pub total_input_tokens: u64,
    /// Completion tokens across all calls.
    pub total_output_tokens: u64,
    /// Estimated spend in USD.
    pub estimated_cost_usd: f64,
    /// Per-model usage.
    pub models_used: Vec<ModelUse>,
    /// Summed call latency.
    pub latency_ms_total: u64,
    /// Why the run ended.
    pub stop_reason: CopyStopReason,
}

/// Terminal artifact of a copy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    /// Whether a human must decide.
    pub needs_human: bool,
    /// The decision.
    #[serde(rename = "final")]
    pub final_choice: FinalChoice,
    /// Variants from the last round.
    pub variants: Vec<Variant>,
    /// Critiques of those variants.
    pub critiques: Vec<Critique>,
    /// Spend and call accounting.
    pub telemetry: CopyTelemetry,
    /// Validation or cap errors that ended the run, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
