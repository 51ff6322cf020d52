//! Settings configuration loaded from TOML files.
//!
//! Non-sensitive configuration stored in the XDG config directory
//! (~/.config/fieldlink/config.toml).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# fieldlink configuration file
# Located at: ~/.config/fieldlink/config.toml
#
# Secrets are loaded from environment variables:
#   - DIFY_API_KEY

[gateway]
host = "0.0.0.0"
port = 8439

[mqtt]
enabled = true
broker = "broker.emqx.io"
port = 1883
client_id = "fieldlink-gateway"
keep_alive_seconds = 60
sensor_topic = "plc/sensordata"
control_topic = "plc/control_cmd"

[simulator]
enabled = false
interval_seconds = 5

[history]
log_file = "control_log.json"
max_entries = 1000
retention_days = 7
duplicate_window_seconds = 120
timezone_offset_hours = 8

[workflow]
enabled = true
base_url = "http://localhost:5001"
user = "abc-123"
timeout_seconds = 30
max_retries = 2
retry_backoff_ms = 2000

[knowledge]
embedding_url = "http://127.0.0.1:11434"
embedding_model = "bge-m3"
db_path = "./knowledge_db/knowledge.sqlite3"
similarity_threshold = 0.8
duplicate_candidates = 3
default_top_k = 3

[logging]
level = "info"
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// HTTP listener configuration
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Message bus connection and topics
    #[serde(default)]
    pub mqtt: MqttSettings,

    /// Synthetic sensor publisher
    #[serde(default)]
    pub simulator: SimulatorSettings,

    /// Control log persistence
    #[serde(default)]
    pub history: HistorySettings,

    /// Dify workflow client
    #[serde(default)]
    pub workflow: WorkflowSettings,

    /// Knowledge store (user-facing, unresolved)
    #[serde(default)]
    pub knowledge: KnowledgeToolsSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Gateway server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewaySettings {
    /// Host to bind to
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

/// MQTT bridge settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttSettings {
    /// Connect to the broker at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_mqtt_broker")]
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,

    #[serde(default = "default_mqtt_keep_alive")]
    pub keep_alive_seconds: u64,

    /// Topic carrying PLC sensor readings
    #[serde(default = "default_sensor_topic")]
    pub sensor_topic: String,

    /// Topic carrying control commands for the PLC
    #[serde(default = "default_control_topic")]
    pub control_topic: String,
}

/// Sensor simulator settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_simulator_interval")]
    pub interval_seconds: u64,
}

/// Control log settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistorySettings {
    /// JSON file holding combined sensor/control entries
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Maximum entries kept on disk and returned by history queries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entries older than this are pruned on every write
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Window during which a bus echo of a recorded command is ignored
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_seconds: u64,

    /// Offset used for entry timestamps
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset_hours: i32,
}

/// Dify workflow settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSettings {
    /// Trigger a workflow run for every sensor message (needs DIFY_API_KEY)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_workflow_base_url")]
    pub base_url: String,

    /// End-user identifier sent with each run
    #[serde(default = "default_workflow_user")]
    pub user: String,

    #[serde(default = "default_workflow_timeout")]
    pub timeout_seconds: u64,

    /// Retries for rate limits and timeouts
    #[serde(default = "default_workflow_retries")]
    pub max_retries: u32,

    #[serde(default = "default_workflow_backoff")]
    pub retry_backoff_ms: u64,
}

/// Knowledge store configuration as written by the user
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KnowledgeToolsSettings {
    /// Embedding provider base URL
    pub embedding_url: Option<String>,

    /// Embedding model name
    pub embedding_model: Option<String>,

    /// SQLite database file
    pub db_path: Option<String>,

    /// Similarity at or above which an upload is treated as a near duplicate
    pub similarity_threshold: Option<f32>,

    /// Neighbours inspected for duplicate detection
    pub duplicate_candidates: Option<usize>,

    /// Results returned by search when the caller gives no top_k
    pub default_top_k: Option<usize>,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    8439
}

fn default_mqtt_broker() -> String {
    "broker.emqx.io".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "fieldlink-gateway".to_string()
}

fn default_mqtt_keep_alive() -> u64 {
    60
}

fn default_sensor_topic() -> String {
    "plc/sensordata".to_string()
}

fn default_control_topic() -> String {
    "plc/control_cmd".to_string()
}

fn default_simulator_interval() -> u64 {
    5
}

fn default_log_file() -> PathBuf {
    PathBuf::from("control_log.json")
}

fn default_max_entries() -> usize {
    1000
}

fn default_retention_days() -> i64 {
    7
}

fn default_duplicate_window() -> u64 {
    120
}

fn default_timezone_offset() -> i32 {
    8
}

fn default_workflow_base_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_workflow_user() -> String {
    "abc-123".to_string()
}

fn default_workflow_timeout() -> u64 {
    30
}

fn default_workflow_retries() -> u32 {
    2
}

fn default_workflow_backoff() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            broker: default_mqtt_broker(),
            port: default_mqtt_port(),
            client_id: default_mqtt_client_id(),
            keep_alive_seconds: default_mqtt_keep_alive(),
            sensor_topic: default_sensor_topic(),
            control_topic: default_control_topic(),
        }
    }
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_simulator_interval(),
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            max_entries: default_max_entries(),
            retention_days: default_retention_days(),
            duplicate_window_seconds: default_duplicate_window(),
            timezone_offset_hours: default_timezone_offset(),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_workflow_base_url(),
            user: default_workflow_user(),
            timeout_seconds: default_workflow_timeout(),
            max_retries: default_workflow_retries(),
            retry_backoff_ms: default_workflow_backoff(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// `$FIELDLINK_CONFIG_DIR/config.toml` when set, otherwise the XDG
    /// config directory.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("FIELDLINK_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("fieldlink");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TOML)?;

        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}
