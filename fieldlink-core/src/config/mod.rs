//! Configuration management for fieldlink.
//!
//! Secrets come from environment variables, everything else from a TOML
//! file.
//!
//! # Configuration Sources
//!
//! ## Secrets (Environment Variables)
//! - `DIFY_API_KEY` - Dify workflow API key (workflow runs are disabled without it)
//!
//! ## Settings (TOML File)
//! Located at `~/.config/fieldlink/config.toml` (or `$FIELDLINK_CONFIG_DIR/config.toml`):
//! ```toml
//! [gateway]
//! host = "0.0.0.0"
//! port = 8439
//!
//! [mqtt]
//! broker = "broker.emqx.io"
//! port = 1883
//! sensor_topic = "plc/sensordata"
//! control_topic = "plc/control_cmd"
//!
//! [knowledge]
//! embedding_url = "http://127.0.0.1:11434"
//! embedding_model = "bge-m3"
//! ```

pub mod knowledge;
mod secrets;
mod settings;

pub use knowledge::KnowledgeSettings;
pub use secrets::Secrets;
pub use settings::{
    GatewaySettings, HistorySettings, KnowledgeToolsSettings, LoggingSettings, MqttSettings,
    Settings, SettingsError, SimulatorSettings, WorkflowSettings,
};

/// Upper bound for `history.retention_days` (about ten years).
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// This loads:
    /// 1. Secrets from environment variables
    /// 2. Settings from TOML file (creating defaults if needed)
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env();
        let settings = Settings::load()?;
        let config = Self { secrets, settings };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the gateway misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.knowledge_settings().similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                field: "knowledge.similarity_threshold",
                reason: format!("{threshold} is outside 0.0..=1.0"),
            });
        }
        if self.settings.history.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "history.max_entries",
                reason: "must be at least 1".to_string(),
            });
        }
        let retention_days = self.settings.history.retention_days;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(ConfigError::Invalid {
                field: "history.retention_days",
                reason: format!("{retention_days} is outside 1..={MAX_RETENTION_DAYS}"),
            });
        }
        if self.settings.mqtt.sensor_topic == self.settings.mqtt.control_topic {
            return Err(ConfigError::Invalid {
                field: "mqtt.control_topic",
                reason: "must differ from mqtt.sensor_topic".to_string(),
            });
        }
        Ok(())
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        self.settings.bind_addr()
    }

    /// Resolved knowledge settings with defaults filled in.
    pub fn knowledge_settings(&self) -> KnowledgeSettings {
        KnowledgeSettings::from(&self.settings.knowledge)
    }

    /// Get the Dify API key (if configured).
    pub fn dify_api_key(&self) -> Option<&str> {
        self.secrets.dify_api_key.as_deref()
    }

    /// Whether sensor messages should trigger workflow runs.
    pub fn workflow_enabled(&self) -> bool {
        self.settings.workflow.enabled && self.secrets.dify_api_key.is_some()
    }
}

/// Load .env file if it exists (for development convenience).
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
