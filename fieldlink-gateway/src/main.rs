use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldlink_gateway::mqtt::{ControlPublisher, DisabledPublisher, MqttBridge};
use fieldlink_gateway::state::{AppState, Topics};
use fieldlink_gateway::workflow::WorkflowClient;
use fieldlink_gateway::{ControlLog, server, simulator};
use fieldlink_knowledge::KnowledgeEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fieldlink_core::load_dotenv();
    let config = fieldlink_core::Config::load()?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Configuration loaded (listening on {})", config.bind_addr());

    let knowledge = Arc::new(KnowledgeEngine::open(config.knowledge_settings()).await?);
    let control_log = Arc::new(ControlLog::load(&config.settings.history).await);

    let workflow = match config.dify_api_key() {
        Some(api_key) if config.workflow_enabled() => {
            info!("Dify workflow client created for {}", config.settings.workflow.base_url);
            Some(WorkflowClient::new(&config.settings.workflow, api_key)?)
        }
        _ => {
            info!("Workflow runs disabled (no DIFY_API_KEY configured or [workflow] enabled = false)");
            None
        }
    };

    let mqtt_settings = &config.settings.mqtt;
    let topics = Topics {
        sensor: mqtt_settings.sensor_topic.clone(),
        control: mqtt_settings.control_topic.clone(),
    };

    let (publisher, eventloop) = if mqtt_settings.enabled {
        let (bridge, eventloop) = MqttBridge::new(mqtt_settings);
        let publisher: Arc<dyn ControlPublisher> = Arc::new(bridge);
        (publisher, Some(eventloop))
    } else {
        warn!("MQTT disabled, /control publishes will fail");
        let publisher: Arc<dyn ControlPublisher> = Arc::new(DisabledPublisher);
        (publisher, None)
    };

    let state = Arc::new(AppState::new(
        knowledge,
        control_log,
        Arc::clone(&publisher),
        workflow,
        topics,
    ));

    if let Some(eventloop) = eventloop {
        eventloop.spawn(Arc::clone(&state));
    }

    if config.settings.simulator.enabled {
        simulator::spawn(
            &config.settings.simulator,
            publisher,
            state.topics.sensor.clone(),
        );
    }

    server::run(state, &config.bind_addr()).await
}
