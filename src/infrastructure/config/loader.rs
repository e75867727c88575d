//! Layered configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{AgentRole, Config, ReplayMode, TransportKind};

/// Upper bound on `copy.max_rounds`.
pub const MAX_ROUNDS_LIMIT: u32 = 6;
/// Upper bound on `repair.max_iterations`.
pub const MAX_ITERATIONS_LIMIT: u32 = 5;
/// Upper bound on `copy.candidate_count`.
pub const MAX_CANDIDATES: u32 = 8;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unknown log level.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown log format.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown rotation policy.
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// An integer setting outside `1..=max`.
    #[error("Invalid {field}: {value}. Must be between 1 and {max}")]
    OutOfRange {
        /// Dotted setting name.
        field: &'static str,
        /// Configured value.
        value: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// A numeric setting that must be positive.
    #[error("Invalid {field}: {value}. Must be positive")]
    NonPositive {
        /// Dotted setting name.
        field: &'static str,
        /// Configured value.
        value: f64,
    },

    /// A role timeout of zero.
    #[error("Invalid timeout for role {0}: must be at least 1ms")]
    InvalidTimeout(&'static str),

    /// A role lacks its required capability.
    #[error("Role {0} is not granted the capability it needs")]
    MissingCapability(&'static str),

    /// Replay selected without a fixture id.
    #[error("Replay transport requires transport.replay.replay_id")]
    MissingReplayId,

    /// Figment extraction failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .courtside/config.yaml (project config)
    /// 3. .courtside/local.yaml (project local overrides, optional)
    /// 4. Environment variables (COURTSIDE_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".courtside/config.yaml"))
            .merge(Yaml::file(".courtside/local.yaml"))
            .merge(Env::prefixed("COURTSIDE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("COURTSIDE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        check_range("copy.max_rounds", config.copy.max_rounds, MAX_ROUNDS_LIMIT)?;
        check_range("copy.candidate_count", config.copy.candidate_count, MAX_CANDIDATES)?;
        check_range(
            "repair.max_iterations",
            config.repair.max_iterations,
            MAX_ITERATIONS_LIMIT,
        )?;

        check_positive("copy.cost_cap_usd", config.copy.cost_cap_usd)?;
        check_positive("repair.cost_cap_usd", config.repair.cost_cap_usd)?;
        check_tokens("copy.max_tokens_total", config.copy.max_tokens_total)?;
        check_tokens("copy.max_tokens_per_call", config.copy.max_tokens_per_call)?;
        check_tokens("repair.max_tokens_total", config.repair.max_tokens_total)?;
        check_tokens("repair.max_tokens_per_call", config.repair.max_tokens_per_call)?;
        check_positive("pricing.unit_in_usd", config.pricing.unit_in_usd)?;
        check_positive("pricing.unit_out_usd", config.pricing.unit_out_usd)?;

        for role in AgentRole::ALL {
            let role_config = config.roles.get(role);
            if role_config.timeout_ms == 0 {
                return Err(ConfigError::InvalidTimeout(role.as_str()));
            }
            if !role_config.permits(role) {
                return Err(ConfigError::MissingCapability(role.as_str()));
            }
            if role_config.model_id.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "Role {} has an empty model_id",
                    role.as_str()
                )));
            }
        }

        let uses_replay = config.transport.kind == TransportKind::Replay;
        if uses_replay && config.transport.replay.replay_id.is_none() {
            return Err(ConfigError::MissingReplayId);
        }
        if uses_replay && config.transport.replay.mode == ReplayMode::Record && !config.transport.allow_network {
            return Err(ConfigError::ValidationFailed(
                "Replay record mode calls the live provider and needs transport.allow_network".to_string(),
            ));
        }

        Ok(())
    }
}

const fn check_range(field: &'static str, value: u32, max: u32) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::OutOfRange { field, value, max });
    }
    Ok(())
}

fn check_tokens(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositive { field, value: 0.0 });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::NonPositive { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Capability;
    use std::collections::BTreeSet;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.copy.max_rounds, 2);
        assert_eq!(config.copy.candidate_count, 3);
        assert_eq!(config.repair.max_iterations, 2);
        assert_eq!(config.transport.kind, TransportKind::Fixture);
        assert!(!config.transport.allow_network);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
logging:
  level: debug
  format: pretty
copy:
  max_rounds: 3
  candidate_count: 5
  cost_cap_usd: 0.5
repair:
  max_iterations: 1
  escalation:
    max_files: 4
roles:
  coder:
    model_id: local/coder
    timeout_ms: 1000
    capabilities: [coding]
transport:
  kind: replay
  replay:
    replay_id: smoke
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.copy.max_rounds, 3);
        assert_eq!(config.copy.candidate_count, 5);
        assert_eq!(config.repair.max_iterations, 1);
        assert_eq!(config.repair.escalation.max_files, 4);
        assert_eq!(config.roles.coder.model_id, "local/coder");
        assert_eq!(config.roles.arbiter, Config::default().roles.arbiter);
        assert_eq!(config.transport.kind, TransportKind::Replay);
        ConfigLoader::validate(&config).expect("parsed config should be valid");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.logging.level = "loud".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut config = Config::default();
        config.copy.max_rounds = 7;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::OutOfRange { field: "copy.max_rounds", .. })
        ));

        let mut config = Config::default();
        config.copy.candidate_count = 9;
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = Config::default();
        config.repair.cost_cap_usd = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NonPositive { .. })
        ));

        let mut config = Config::default();
        config.transport.kind = TransportKind::Replay;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingReplayId)
        ));
    }

    #[test]
    fn test_validation_rejects_role_without_capability() {
        let mut config = Config::default();
        config.roles.arbiter.capabilities = BTreeSet::from([Capability::Coding]);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingCapability("arbiter"))
        ));
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("COURTSIDE_COPY__MAX_ROUNDS", Some("4")),
                ("COURTSIDE_TRANSPORT__KIND", Some("live")),
            ],
            || {
                let dir = tempfile::tempdir().expect("tempdir");
                let path = dir.path().join("config.yaml");
                std::fs::write(&path, "logging:\n  level: warn\n").expect("write config");

                let config = ConfigLoader::load_from_file(&path).expect("config should load");
                assert_eq!(config.copy.max_rounds, 4);
                assert_eq!(config.transport.kind, TransportKind::Live);
                assert_eq!(config.logging.level, "warn");
            },
        );
    }
}
