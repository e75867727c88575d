//! Agent roles, their configuration, and per-call results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::contract::ContractName;

/// Every role an agent can play in either pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Copy pipeline: proposes candidate variants.
    Generator,
    /// Copy pipeline: scores one variant.
    Critic,
    /// Copy pipeline: picks the final variant.
    Collapser,
    /// Repair pipeline: explains the failure.
    Diagnostician,
    /// Repair pipeline: proposes a patch.
    Coder,
    /// Repair pipeline: critiques the patch.
    Reviewer,
    /// Repair pipeline: decides apply, reject or revise.
    Arbiter,
}

impl AgentRole {
    /// Every role, copy roles first.
    pub const ALL: [Self; 7] = [
        Self::Generator,
        Self::Critic,
        Self::Collapser,
        Self::Diagnostician,
        Self::Coder,
        Self::Reviewer,
        Self::Arbiter,
    ];

    /// Wire name of the role.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::Critic => "critic",
            Self::Collapser => "collapser",
            Self::Diagnostician => "diagnostician",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Arbiter => "arbiter",
        }
    }

    /// The contract this role's output is validated against.
    pub const fn contract(&self) -> ContractName {
        match self {
            Self::Generator => ContractName::CopyProposal,
            Self::Critic => ContractName::Critique,
            Self::Collapser => ContractName::DecisionCollapse,
            Self::Diagnostician => ContractName::Diagnosis,
            Self::Coder => ContractName::PatchProposal,
            Self::Reviewer => ContractName::ReviewCritique,
            Self::Arbiter => ContractName::ArbiterDecision,
        }
    }

    /// The capability a role configuration must grant before the role runs.
    pub const fn required_capability(&self) -> Capability {
        match self {
            Self::Generator => Capability::Generation,
            Self::Critic => Capability::Critique,
            Self::Collapser => Capability::Selection,
            Self::Diagnostician => Capability::Diagnosis,
            Self::Coder => Capability::Coding,
            Self::Reviewer => Capability::Review,
            Self::Arbiter => Capability::Decision,
        }
    }

    /// Parse a wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a configured agent is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Propose copy variants.
    Generation,
    /// Score copy variants.
    Critique,
    /// Pick a final variant.
    Selection,
    /// Explain a failure.
    Diagnosis,
    /// Write patches.
    Coding,
    /// Review patches.
    Review,
    /// Rule on reviewed patches.
    Decision,
}

/// Fixed configuration carried by each role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoleConfig {
    /// Provider model identifier, e.g. `openai/gpt-4o`.
    pub model_id: String,

    /// Per-call timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Granted capabilities.
    pub capabilities: BTreeSet<Capability>,

    /// Sampling temperature override for this phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

impl RoleConfig {
    /// Default configuration for a role: its own capability, a 30s timeout.
    pub fn for_role(role: AgentRole) -> Self {
        let model_id = match role {
            AgentRole::Reviewer => "anthropic/claude-sonnet-4",
            _ => "openai/gpt-4o",
        };
        Self {
            model_id: model_id.to_string(),
            timeout_ms: default_timeout_ms(),
            capabilities: BTreeSet::from([role.required_capability()]),
            temperature: None,
        }
    }

    /// Replace the model.
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Replace the timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set a temperature override.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Whether the role's required capability is granted.
    pub fn permits(&self, role: AgentRole) -> bool {
        self.capabilities.contains(&role.required_capability())
    }
}

/// Role configuration for every role, one field per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoleTable {
    /// Copy generator.
    #[serde(default = "generator_default")]
    pub generator: RoleConfig,
    /// Copy critic.
    #[serde(default = "critic_default")]
    pub critic: RoleConfig,
    /// Copy collapser.
    #[serde(default = "collapser_default")]
    pub collapser: RoleConfig,
    /// Repair diagnostician.
    #[serde(default = "diagnostician_default")]
    pub diagnostician: RoleConfig,
    /// Repair coder.
    #[serde(default = "coder_default")]
    pub coder: RoleConfig,
    /// Repair reviewer.
    #[serde(default = "reviewer_default")]
    pub reviewer: RoleConfig,
    /// Repair arbiter.
    #[serde(default = "arbiter_default")]
    pub arbiter: RoleConfig,
}

fn generator_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Generator)
}
fn critic_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Critic)
}
fn collapser_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Collapser)
}
fn diagnostician_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Diagnostician)
}
fn coder_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Coder)
}
fn reviewer_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Reviewer)
}
fn arbiter_default() -> RoleConfig {
    RoleConfig::for_role(AgentRole::Arbiter)
}

impl Default for RoleTable {
    fn default() -> Self {
        Self {
            generator: generator_default(),
            critic: critic_default(),
            collapser: collapser_default(),
            diagnostician: diagnostician_default(),
            coder: coder_default(),
            reviewer: reviewer_default(),
            arbiter: arbiter_default(),
        }
    }
}

impl RoleTable {
    /// Configuration for a role.
    pub const fn get(&self, role: AgentRole) -> &RoleConfig {
        match role {
            AgentRole::Generator => &self.generator,
            AgentRole::Critic => &self.critic,
            AgentRole::Collapser => &self.collapser,
            AgentRole::Diagnostician => &self.diagnostician,
            AgentRole::Coder => &self.coder,
            AgentRole::Reviewer => &self.reviewer,
            AgentRole::Arbiter => &self.arbiter,
        }
    }

    /// Mutable configuration for a role.
    pub fn get_mut(&mut self, role: AgentRole) -> &mut RoleConfig {
        match role {
            AgentRole::Generator => &mut self.generator,
            AgentRole::Critic => &mut self.critic,
            AgentRole::Collapser => &mut self.collapser,
            AgentRole::Diagnostician => &mut self.diagnostician,
            AgentRole::Coder => &mut self.coder,
            AgentRole::Reviewer => &mut self.reviewer,
            AgentRole::Arbiter => &mut self.arbiter,
        }
    }

    /// Apply one timeout to every role.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        for role in AgentRole::ALL {
            self.get_mut(role).timeout_ms = timeout_ms;
        }
        self
    }
}

/// Correlator attached to every agent call. Appears in logs, never in
/// user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    /// Caller-supplied job id.
    pub job_id: String,
    /// Run id, unique per pipeline run.
    pub run_id: String,
    /// Current pipeline step, e.g. `critique-1`.
    pub step: String,
}

impl TraceContext {
    /// Build a trace for a job, run and step.
    pub fn new(job_id: impl Into<String>, run_id: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: run_id.into(),
            step: step.into(),
        }
    }

    /// Same trace, different step.
    #[must_use]
    pub fn with_step(&self, step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            ..self.clone()
        }
    }

    /// Run-level identifier recorded in telemetry.
    pub fn trace_id(&self) -> String {
        format!("{}:{}", self.job_id, self.run_id)
    }
}

/// Outcome of one agent invocation. Folded into budget state and redacted
/// logs; never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCallResult {
    /// Role that was invoked.
    pub role: AgentRole,
    /// Model that served the call.
    pub model_id: String,
    /// Unparsed reply text.
    pub raw_text: String,
    /// Reply parsed as JSON, if it parsed.
    pub parsed_json: Option<serde_json::Value>,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Call latency.
    pub latency_ms: u64,
    /// Cost per the run's cost model.
    pub estimated_cost_usd: f64,
}
