use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Longest ack deadline a subscription may use (10 minutes).
pub const MAX_ACK_DEADLINE_SECS: u32 = 600;

const DEFAULT_ACK_DEADLINE_SECS: u32 = 10;
const DEFAULT_PULL_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_MAX_MESSAGES_PER_PULL: usize = 1000;
const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_TOPIC_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_RETENTION_CHECK_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings as written in the YAML config file; every field is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfiguration {
    /// Ack deadline given to new subscriptions
    pub default_ack_deadline_secs: Option<u32>,
    /// Server side bound of a blocking pull
    pub pull_timeout_secs: Option<u64>,
    /// Upper bound applied to a pull's maxMessages
    pub max_messages_per_pull: Option<usize>,
    /// Replay window of new subscriptions; the floor for per-subscription overrides
    pub default_retention_secs: Option<u64>,
    /// Message max age of new topics
    pub default_topic_ttl_secs: Option<u64>,
    /// Period of the retention enforcer
    pub retention_check_interval_secs: Option<u64>,
}

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_ack_deadline_secs: u32,
    pub pull_timeout: Duration,
    pub max_messages_per_pull: usize,
    pub default_retention: Duration,
    pub default_topic_ttl: Duration,
    pub retention_check_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_ack_deadline_secs: DEFAULT_ACK_DEADLINE_SECS,
            pull_timeout: Duration::from_secs(DEFAULT_PULL_TIMEOUT_SECS),
            max_messages_per_pull: DEFAULT_MAX_MESSAGES_PER_PULL,
            default_retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            default_topic_ttl: Duration::from_secs(DEFAULT_TOPIC_TTL_SECS),
            retention_check_interval: Duration::from_secs(DEFAULT_RETENTION_CHECK_INTERVAL_SECS),
        }
    }
}

impl TryFrom<LoadConfiguration> for EngineConfig {
    type Error = ConfigError;

    fn try_from(load: LoadConfiguration) -> Result<Self, Self::Error> {
        let default_ack_deadline_secs = load
            .default_ack_deadline_secs
            .unwrap_or(DEFAULT_ACK_DEADLINE_SECS);
        if default_ack_deadline_secs > MAX_ACK_DEADLINE_SECS {
            return Err(ConfigError::Invalid(format!(
                "default_ack_deadline_secs must be between 0 and {}, got {}",
                MAX_ACK_DEADLINE_SECS, default_ack_deadline_secs
            )));
        }

        let max_messages_per_pull = load
            .max_messages_per_pull
            .unwrap_or(DEFAULT_MAX_MESSAGES_PER_PULL);
        if max_messages_per_pull == 0 {
            return Err(ConfigError::Invalid(
                "max_messages_per_pull must be positive".to_string(),
            ));
        }

        let retention_check_interval_secs = load
            .retention_check_interval_secs
            .unwrap_or(DEFAULT_RETENTION_CHECK_INTERVAL_SECS);
        if retention_check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "retention_check_interval_secs must be positive".to_string(),
            ));
        }

        Ok(EngineConfig {
            default_ack_deadline_secs,
            pull_timeout: Duration::from_secs(
                load.pull_timeout_secs.unwrap_or(DEFAULT_PULL_TIMEOUT_SECS),
            ),
            max_messages_per_pull,
            default_retention: Duration::from_secs(
                load.default_retention_secs.unwrap_or(DEFAULT_RETENTION_SECS),
            ),
            default_topic_ttl: Duration::from_secs(
                load.default_topic_ttl_secs.unwrap_or(DEFAULT_TOPIC_TTL_SECS),
            ),
            retention_check_interval: Duration::from_secs(retention_check_interval_secs),
        })
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let load_config: LoadConfiguration = serde_yaml::from_str(content)?;
        load_config.try_into()
    }

    /// Loads the configuration from the specified YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }
}
