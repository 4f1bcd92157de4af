//! Configuration loading and management.
//!
//! Configuration is loaded with the following precedence:
//! 1. Environment variables (`STAGEGATE_*`)
//! 2. Config file (`~/.stagegate/config.toml`)
//! 3. Defaults

use crate::error::{Error, Result};
use crate::hooks::HookSpec;
use crate::storage::file::get_stagegate_home;
use crate::workflow::{Stage, TransitionTable};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Workflow stages and transitions.
    pub workflow: WorkflowConfig,

    /// Built-in hooks, in declaration order.
    pub hooks: Vec<HookSpec>,
}

/// Which storage provider to use.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process table; lost on exit.
    Memory,

    /// JSON files under `path` (default).
    #[default]
    File,

    /// Redis server (needs the `redis-backend` feature).
    Redis,
}

impl std::str::FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            other => Err(Error::Config(format!("unknown storage backend '{other}'"))),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selection.
    pub backend: StorageBackend,

    /// Root directory for the file backend.
    pub path: PathBuf,

    /// Sliding session lifetime in seconds. `0` disables expiry.
    pub session_ttl_seconds: u64,

    /// How often the memory backend sweeps expired records.
    pub sweep_interval_seconds: u64,

    /// Redis connection settings.
    pub redis: RedisConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: get_stagegate_home(),
            session_ttl_seconds: 86_400,
            sweep_interval_seconds: 60,
            redis: RedisConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Session TTL, or `None` when expiry is disabled.
    #[must_use]
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_seconds > 0).then(|| Duration::from_secs(self.session_ttl_seconds))
    }

    /// Memory backend sweep cadence.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL.
    pub url: String,

    /// Prefix prepended to every key.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "stagegate:".to_string(),
        }
    }
}

/// Workflow configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Stage new sessions start in.
    pub initial_stage: String,

    /// `stage -> [successors]`. Stages without an entry are terminal.
    pub transitions: BTreeMap<String, Vec<String>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            initial_stage: "initial".to_string(),
            transitions: BTreeMap::new(),
        }
    }
}

impl WorkflowConfig {
    /// Build the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a stage name is empty.
    pub fn table(&self) -> Result<TransitionTable> {
        TransitionTable::new(
            self.initial_stage.as_str(),
            self.transitions
                .iter()
                .map(|(from, to)| (Stage::new(from), to.iter().map(Stage::new).collect::<Vec<_>>())),
        )
    }
}

/// Load configuration from file and environment.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or if an environment override is malformed.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    // Try to load config file
    let config_path = get_config_path();
    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        config = toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
    }

    // Override with environment variables
    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Get the path to the config file.
fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("STAGEGATE_CONFIG") {
        return PathBuf::from(path);
    }

    get_stagegate_home().join("config.toml")
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(backend) = env::var("STAGEGATE_STORAGE_BACKEND") {
        config.storage.backend = backend.parse()?;
    }

    // Storage path
    if let Ok(path) = env::var("STAGEGATE_STORAGE_PATH") {
        config.storage.path = PathBuf::from(path);
    } else if let Ok(home) = env::var("STAGEGATE_HOME") {
        config.storage.path = PathBuf::from(home);
    }

    if let Ok(val) = env::var("STAGEGATE_SESSION_TTL") {
        config.storage.session_ttl_seconds = val
            .parse()
            .map_err(|_| Error::Config(format!("invalid STAGEGATE_SESSION_TTL: {val}")))?;
    }

    if let Ok(url) = env::var("STAGEGATE_REDIS_URL") {
        config.storage.redis.url = url;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookKind;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.session_ttl(), Some(Duration::from_secs(86_400)));
        assert_eq!(config.storage.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.workflow.initial_stage, "initial");
        assert!(config.hooks.is_empty());
    }

    #[test]
    fn default_workflow_has_single_terminal_stage() {
        let table = WorkflowConfig::default().table().unwrap();
        assert_eq!(table.initial(), &Stage::new("initial"));
        assert_eq!(table.stages().count(), 1);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
            [storage]
            backend = "memory"
            session_ttl_seconds = 0

            [storage.redis]
            url = "redis://cache:6379"

            [workflow]
            initial_stage = "draft"

            [workflow.transitions]
            draft = ["review"]
            review = ["approved", "draft"]

            [[hooks]]
            name = "gate"
            kind = "stage_gate"
            operations = ["publish"]
            stages = ["approved"]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.session_ttl(), None);
        assert_eq!(config.storage.redis.url, "redis://cache:6379");
        assert_eq!(config.storage.redis.key_prefix, "stagegate:"); // Default

        let table = config.workflow.table().unwrap();
        assert!(table.allows(&Stage::new("review"), &Stage::new("draft")));
        assert!(!table.allows(&Stage::new("draft"), &Stage::new("approved")));
        assert!(table.contains(&Stage::new("approved")));

        assert_eq!(config.hooks.len(), 1);
        assert!(matches!(config.hooks[0].kind, HookKind::StageGate { .. }));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml = r"
            [storage]
            sweep_interval_seconds = 5
        ";

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.storage.session_ttl_seconds, 86_400); // Default
        assert_eq!(config.workflow.initial_stage, "initial"); // Default
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let toml = r#"
            [storage]
            backend = "postgres"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
        assert!("postgres".parse::<StorageBackend>().is_err());
        assert_eq!("Redis".parse::<StorageBackend>().unwrap(), StorageBackend::Redis);
    }

    #[test]
    fn empty_stage_name_is_rejected() {
        let config = WorkflowConfig {
            initial_stage: String::new(),
            transitions: BTreeMap::new(),
        };
        assert!(matches!(config.table(), Err(Error::Config(_))));
    }
}
