//! Synthetic sensor readings for running without a PLC.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldlink_core::SimulatorSettings;
use rand::Rng;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::mqtt::ControlPublisher;

/// One random reading in plausible greenhouse ranges.
pub fn sample_reading() -> Value {
    let mut rng = rand::thread_rng();
    let round1 = |v: f64| (v * 10.0).round() / 10.0;

    json!({
        "temperature": round1(rng.gen_range(15.0..35.0)),
        "humidity": round1(rng.gen_range(40.0..90.0)),
        "soil_moisture": round1(rng.gen_range(20.0..60.0)),
        "light": rng.gen_range(0..=100_000),
        "timestamp": Utc::now().timestamp(),
    })
}

/// Publish a reading to `topic` every `interval_seconds`.
pub fn spawn(
    settings: &SimulatorSettings,
    publisher: Arc<dyn ControlPublisher>,
    topic: String,
) -> JoinHandle<()> {
    let period = Duration::from_secs(settings.interval_seconds.max(1));
    info!(topic = %topic, ?period, "sensor simulator started");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let reading = sample_reading();
            debug!(%reading, "simulated sensor reading");
            if let Err(e) = publisher.publish(&topic, reading.to_string().into_bytes()).await {
                warn!("Simulator publish failed: {}", e);
            }
        }
    })
}
