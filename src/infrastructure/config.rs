//! Configuration loading: hierarchical merge of defaults, a YAML file and
//! `ORCHESTRATOR_`-prefixed environment variables.
//!
//! Mirrors `infrastructure/config/loader.rs`'s `ConfigLoader` — same
//! figment provider order, same post-extraction validation pass.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dispatch-loop and merge-serializer tunables, plus the state TTL and
/// scaffold markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_parallel_tasks: usize,
    pub max_consecutive_failures: u32,
    pub max_retries: u32,
    pub additional_retries: u32,
    pub max_merge_retry_attempts: u32,
    pub max_conflict_resolution_attempts: u32,
    pub max_test_fix_attempts: u32,
    pub state_ttl_secs: u64,
    pub scaffold_markers: Vec<String>,
    pub log_level: String,
    pub log_format: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 3,
            max_consecutive_failures: 5,
            max_retries: 3,
            additional_retries: 0,
            max_merge_retry_attempts: 3,
            max_conflict_resolution_attempts: 3,
            max_test_fix_attempts: 2,
            state_ttl_secs: 86_400 * 7,
            scaffold_markers: [
                "package.json",
                "pyproject.toml",
                "requirements.txt",
                "go.mod",
                "Cargo.toml",
                "pom.xml",
                "build.gradle",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid max_parallel_tasks: {0}. Must be at least 1")]
    InvalidMaxParallelTasks(usize),

    #[error("invalid max_consecutive_failures: {0}. Cannot be 0")]
    InvalidMaxConsecutiveFailures(u32),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest): programmatic defaults, `config.yaml`
    /// in the working directory, `ORCHESTRATOR_`-prefixed environment
    /// variables.
    pub fn load() -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file("config.yaml"))
            .merge(Env::prefixed("ORCHESTRATOR_").split("__"))
            .extract()
            .context("failed to extract orchestrator configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        if config.max_parallel_tasks == 0 {
            return Err(ConfigError::InvalidMaxParallelTasks(config.max_parallel_tasks));
        }
        if config.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidMaxConsecutiveFailures(config.max_consecutive_failures));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log_level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.log_format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.log_format.clone()));
        }
        Ok(())
    }
}
