//! Names of the output contracts agents must satisfy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed, closed-world output contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractName {
    /// Generator output.
    CopyProposal,
    /// Critic output.
    Critique,
    /// Collapser output.
    DecisionCollapse,
    /// Diagnostician output.
    Diagnosis,
    /// Coder output.
    PatchProposal,
    /// Reviewer output.
    ReviewCritique,
    /// Arbiter output.
    ArbiterDecision,
}

impl ContractName {
    /// Every contract.
    pub const ALL: [Self; 7] = [
        Self::CopyProposal,
        Self::Critique,
        Self::DecisionCollapse,
        Self::Diagnosis,
        Self::PatchProposal,
        Self::ReviewCritique,
        Self::ArbiterDecision,
    ];

    /// Wire name, also used in prompts.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CopyProposal => "copy_proposal",
            Self::Critique => "critique",
            Self::DecisionCollapse => "decision_collapse",
            Self::Diagnosis => "diagnosis",
            Self::PatchProposal => "patch_proposal",
            Self::ReviewCritique => "review_critique",
            Self::ArbiterDecision => "arbiter_decision",
        }
    }

    /// Parse a wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
