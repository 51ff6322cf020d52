//! MQTT bridge between the PLC topics and the gateway.
//!
//! The publish half implements [`ControlPublisher`]; the event loop half
//! subscribes to the sensor and control topics and feeds the control log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fieldlink_core::MqttSettings;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::control_log::RecordSource;
use crate::state::AppState;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    Connected,
    Disconnected,
    Disabled,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("message bus is disabled")]
    Disabled,
    #[error("message bus is not accepting publishes (broker unreachable?)")]
    QueueFull,
    #[error("publish failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Sends control commands and sensor readings to the bus.
#[async_trait]
pub trait ControlPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    fn status(&self) -> BusStatus;
}

/// Publisher used when MQTT is turned off in the settings.
#[derive(Debug, Default)]
pub struct DisabledPublisher;

#[async_trait]
impl ControlPublisher for DisabledPublisher {
    async fn publish(&self, topic: &str, _payload: Vec<u8>) -> Result<(), PublishError> {
        warn!(topic, "publish requested while MQTT is disabled");
        Err(PublishError::Disabled)
    }

    fn status(&self) -> BusStatus {
        BusStatus::Disabled
    }
}

#[derive(Clone)]
pub struct MqttBridge {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

/// Event loop half of an [`MqttBridge`], run with [`MqttEventLoop::spawn`].
pub struct MqttEventLoop {
    eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttBridge {
    /// Build the client; nothing connects until the event loop is spawned.
    pub fn new(settings: &MqttSettings) -> (Self, MqttEventLoop) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.broker, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_seconds.max(5)));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        info!(
            broker = %settings.broker,
            port = settings.port,
            client_id = %settings.client_id,
            "MQTT client configured"
        );

        (
            Self {
                client: client.clone(),
                connected: Arc::clone(&connected),
            },
            MqttEventLoop {
                eventloop,
                client,
                connected,
            },
        )
    }
}

#[async_trait]
impl ControlPublisher for MqttBridge {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        // Never wait on the request queue: it stays full while the broker is down.
        match self.client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
            Ok(()) => {
                debug!(topic, "published to MQTT");
                Ok(())
            }
            Err(rumqttc::ClientError::TryRequest(_)) => {
                warn!(topic, "MQTT request queue full, dropping publish");
                Err(PublishError::QueueFull)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn status(&self) -> BusStatus {
        if self.connected.load(Ordering::Relaxed) {
            BusStatus::Connected
        } else {
            BusStatus::Disconnected
        }
    }
}

impl MqttEventLoop {
    /// Poll the broker forever, reconnecting after errors.
    pub fn spawn(mut self, state: Arc<AppState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        self.connected.store(true, Ordering::Relaxed);
                        info!("Connected to MQTT broker");
                        self.subscribe(&state);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_message(&state, &publish.topic, &publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.connected.store(false, Ordering::Relaxed);
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        })
    }

    fn subscribe(&self, state: &AppState) {
        for topic in [&state.topics.sensor, &state.topics.control] {
            // The request is queued; the loop above flushes it on its next poll.
            if let Err(e) = self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                error!(topic = %topic, "MQTT subscribe failed: {}", e);
            }
        }
    }
}

/// Decode a bus payload; non-JSON payloads are wrapped as `{"raw": text}`.
pub fn decode_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(payload) }))
}

/// React to one message from the bus.
pub async fn handle_message(state: &Arc<AppState>, topic: &str, payload: &[u8]) {
    let payload = decode_payload(payload);

    if topic == state.topics.sensor {
        debug!(%payload, "sensor data received");
        state.control_log.set_latest_sensor(payload.clone());

        if state.workflow.is_some() {
            let state = Arc::clone(state);
            tokio::spawn(async move {
                if let Err(e) = state.run_workflow(payload).await {
                    warn!("Workflow run for sensor data failed: {}", e);
                }
            });
        }
    } else if topic == state.topics.control {
        debug!(%payload, "control command received");
        let sensor = state.control_log.latest_sensor().unwrap_or_else(|| json!({}));

        if state.control_log.is_recent_duplicate(&sensor, &payload) {
            debug!("control command already recorded, skipping echo");
            return;
        }

        if let Err(e) = state
            .control_log
            .record(sensor, payload, RecordSource::Mqtt)
            .await
        {
            error!("Failed to record control command: {}", e);
        }
    } else {
        debug!(topic, "ignoring message on unexpected topic");
    }
}
