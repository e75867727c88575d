//! Engine configuration, as deserialized by the loader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::agent::RoleTable;
use super::budget::{BudgetCaps, CostModel};

/// Main configuration structure for Courtside
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which transport serves agent calls
    #[serde(default)]
    pub transport: TransportConfig,

    /// Token pricing used for every cost estimate
    #[serde(default)]
    pub pricing: CostModel,

    /// Per-role model, timeout and capabilities
    #[serde(default)]
    pub roles: RoleTable,

    /// Copy pipeline limits
    #[serde(default)]
    pub copy: CopyConfig,

    /// Repair pipeline limits
    #[serde(default)]
    pub repair: RepairConfig,

    /// Where artifacts are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file output (daily, hourly, never)
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Where agent replies come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// OpenAI-compatible HTTP endpoint.
    Live,
    /// Canned in-process replies.
    #[default]
    Fixture,
    /// Recorded replies on disk.
    Replay,
}

impl TransportKind {
    /// Config name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fixture => "fixture",
            Self::Replay => "replay",
        }
    }

    /// Parse a config name, case-insensitively.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "live" => Some(Self::Live),
            "fixture" => Some(Self::Fixture),
            "replay" => Some(Self::Replay),
            _ => None,
        }
    }
}

/// Transport selection, passed explicitly into whoever builds a transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// Selected transport.
    #[serde(default)]
    pub kind: TransportKind,

    /// Gate for any outbound network call. Off unless configured.
    #[serde(default)]
    pub allow_network: bool,

    /// Live endpoint settings.
    #[serde(default)]
    pub live: LiveTransportConfig,

    /// Replay settings.
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LiveTransportConfig {
    /// Endpoint root, without `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Explicit key; takes precedence over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.aimlapi.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "COURTSIDE_API_KEY".to_string()
}

impl Default for LiveTransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_key: None,
        }
    }
}

/// What the replay transport does with its fixture file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// Serve previously recorded responses.
    #[default]
    Replay,
    /// Call the live transport and capture its responses.
    Record,
}

/// Recorded-reply transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReplayConfig {
    /// Directory holding fixture files.
    #[serde(default = "default_replay_dir")]
    pub base_dir: PathBuf,

    /// Fixture file stem; required in replay mode.
    #[serde(default)]
    pub replay_id: Option<String>,

    /// Replay or record.
    #[serde(default)]
    pub mode: ReplayMode,

    /// Allow record mode to replace an existing fixture file
    #[serde(default)]
    pub allow_overwrite: bool,
}

fn default_replay_dir() -> PathBuf {
    PathBuf::from("fixtures/replay")
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            base_dir: default_replay_dir(),
            replay_id: None,
            mode: ReplayMode::default(),
            allow_overwrite: false,
        }
    }
}

/// Copy pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CopyConfig {
    /// Generation rounds before deferring to a human.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Variants requested per round.
    #[serde(default = "default_candidate_count")]
    pub candidate_count: u32,

    /// Spend ceiling in USD.
    #[serde(default = "default_cost_cap_usd")]
    pub cost_cap_usd: f64,

    /// Token ceiling across all calls.
    #[serde(default = "default_max_tokens_total")]
    pub max_tokens_total: u64,

    /// Token ceiling for a single call.
    #[serde(default = "default_max_tokens_per_call")]
    pub max_tokens_per_call: u64,
}

const fn default_max_rounds() -> u32 {
    2
}

const fn default_candidate_count() -> u32 {
    3
}

const fn default_cost_cap_usd() -> f64 {
    2.0
}

const fn default_max_tokens_total() -> u64 {
    12_000
}

const fn default_max_tokens_per_call() -> u64 {
    2_000
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            candidate_count: default_candidate_count(),
            cost_cap_usd: default_cost_cap_usd(),
            max_tokens_total: default_max_tokens_total(),
            max_tokens_per_call: default_max_tokens_per_call(),
        }
    }
}

impl CopyConfig {
    /// Budget caps for a copy run.
    pub const fn caps(&self) -> BudgetCaps {
        BudgetCaps {
            cost_cap_usd: self.cost_cap_usd,
            max_tokens_total: self.max_tokens_total,
            max_tokens_per_call: self.max_tokens_per_call,
        }
    }
}

/// Repair pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepairConfig {
    /// Coder revisions allowed.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Spend ceiling in USD.
    #[serde(default = "default_cost_cap_usd")]
    pub cost_cap_usd: f64,

    /// Token ceiling across all calls.
    #[serde(default = "default_repair_max_tokens_total")]
    pub max_tokens_total: u64,

    /// Token ceiling for a single call.
    #[serde(default = "default_max_tokens_per_call")]
    pub max_tokens_per_call: u64,

    /// Escalation retry bounds.
    #[serde(default)]
    pub escalation: EscalationConfig,
}

const fn default_max_iterations() -> u32 {
    2
}

const fn default_repair_max_tokens_total() -> u64 {
    40_000
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            cost_cap_usd: default_cost_cap_usd(),
            max_tokens_total: default_repair_max_tokens_total(),
            max_tokens_per_call: default_max_tokens_per_call(),
            escalation: EscalationConfig::default(),
        }
    }
}

impl RepairConfig {
    /// Budget caps for a repair run.
    pub const fn caps(&self) -> BudgetCaps {
        BudgetCaps {
            cost_cap_usd: self.cost_cap_usd,
            max_tokens_total: self.max_tokens_total,
            max_tokens_per_call: self.max_tokens_per_call,
        }
    }
}

/// Bounds on the one-shot escalation retry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalationConfig {
    /// Whether a failed run may retry with more context.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Files added to the report at most.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Snapshot bytes added at most.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_max_files() -> usize {
    8
}

const fn default_max_total_bytes() -> usize {
    64 * 1024
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_files: default_max_files(),
            max_total_bytes: default_max_total_bytes(),
        }
    }
}
