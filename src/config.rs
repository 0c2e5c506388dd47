use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::alerts::{AlertThreshold, DEFAULT_MAX_HISTORY};
use crate::api::ApiConfig;
use crate::graph::GraphLayout;
use crate::interpreter::InterpreterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid alert threshold for {topic}: {reason}")]
    InvalidThreshold { topic: String, reason: String },
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Bounded in-memory store (no persistence)
    #[serde(alias = "none")]
    Memory {
        #[serde(default = "default_messages_per_project")]
        max_messages_per_project: usize,
    },

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (messages older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory {
            max_messages_per_project: default_messages_per_project(),
        }
    }
}

fn default_messages_per_project() -> usize {
    5000
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./sensor_hub.db")
}

fn default_retention_days() -> u32 {
    30
}

/// Broker connection for the MQTT transport
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Subscription pattern; empty means everything
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "sensor-hub".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Minimum milliseconds between two graph updates
    pub throttle_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { throttle_ms: 500 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub max_history_size: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Readings below this confidence are discarded
    pub min_confidence: f64,
    /// Capacity of the inbound message queue
    pub queue_capacity: usize,
    /// Capacity of the outbound notification and persistence queues
    pub notification_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            queue_capacity: 1024,
            notification_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mqtt: Option<MqttConfig>,

    pub api: Option<ApiConfig>,

    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    /// Project declaration loaded at startup
    pub project: Option<PathBuf>,
}

/// Threshold as written in a project file
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub id: Option<String>,
    pub topic_name: String,
    /// Defaults to the last topic segment
    pub sensor_type: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<ThresholdConfig> for AlertThreshold {
    type Error = ConfigError;

    fn try_from(config: ThresholdConfig) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| ConfigError::InvalidThreshold {
            topic: config.topic_name.clone(),
            reason: reason.to_string(),
        };

        match (config.min_value, config.max_value) {
            (None, None) => return Err(invalid("neither min_value nor max_value given")),
            (Some(min), Some(max)) if min > max => {
                return Err(invalid("min_value is greater than max_value"));
            }
            _ => {}
        }

        let sensor_type = config.sensor_type.clone().unwrap_or_else(|| {
            config
                .topic_name
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });

        let id = config.id.clone().unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}_{}", config.topic_name.replace('/', "_"), &suffix[..8])
        });

        Ok(AlertThreshold {
            id,
            topic_name: config.topic_name,
            sensor_type,
            min_value: config.min_value,
            max_value: config.max_value,
            enabled: config.enabled,
        })
    }
}

/// Project file contents
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDeclaration {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub graph_layout: GraphLayout,
    #[serde(default)]
    pub alert_thresholds: Vec<ThresholdConfig>,
}

impl ProjectDeclaration {
    pub fn validate(self) -> Result<Project, ConfigError> {
        let thresholds = self
            .alert_thresholds
            .into_iter()
            .map(AlertThreshold::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Project {
            id: self.id,
            name: self.name,
            graph_layout: self.graph_layout,
            thresholds,
        })
    }
}

/// A validated project
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub graph_layout: GraphLayout,
    pub thresholds: Vec<AlertThreshold>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&file_content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    read_json::<Config>(path.as_ref()).inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_project_file(path: impl AsRef<Path>) -> Result<Project, ConfigError> {
    let project = read_json::<ProjectDeclaration>(path.as_ref())?.validate()?;
    debug!(
        "loaded project {} ({} thresholds, {} layout nodes)",
        project.id,
        project.thresholds.len(),
        project.graph_layout.nodes.len()
    );
    Ok(project)
}
