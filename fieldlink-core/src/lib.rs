pub mod config;

pub use config::{
    Config,
    ConfigError,
    GatewaySettings,
    HistorySettings,
    KnowledgeSettings,
    LoggingSettings,
    MqttSettings,
    Secrets,
    Settings,
    SettingsError,
    SimulatorSettings,
    WorkflowSettings,
    load_dotenv,
};
