//! Workflow, history and control endpoints.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::control_log::RecordSource;
use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    inputs: Option<Value>,
}

/// Run the workflow for the posted inputs, or the latest sensor payload.
pub async fn run(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let posted = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let request: RunRequest = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e)))?;
        request.inputs.filter(|inputs| !inputs.is_null())
    };

    let inputs = posted
        .or_else(|| state.control_log.latest_sensor())
        .ok_or_else(|| GatewayError::MissingField("inputs (no sensor data received yet)".into()))?;

    let run = state.run_workflow(inputs).await?;
    Ok(Json(json!({
        "status": "success",
        "control": run.control,
        "recorded": run.recorded,
    })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let data = state.control_log.sensor_history(query.limit).await;
    Json(json!({ "count": data.len(), "data": data }))
}

pub async fn control_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let data = state.control_log.entries(query.limit).await;
    Json(json!({ "count": data.len(), "data": data }))
}

/// Publish a control command and record it against the latest sensor data.
pub async fn publish_control(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let command: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e)))?;
    if command.is_null() {
        return Err(GatewayError::MissingField("control command".into()));
    }

    let topic = state.topics.control.clone();
    state
        .publisher
        .publish(&topic, command.to_string().into_bytes())
        .await?;

    let sensor = state.control_log.latest_sensor().unwrap_or_else(|| json!({}));
    state
        .control_log
        .record(sensor, command, RecordSource::Http)
        .await?;
    info!(topic = %topic, "control command published");

    Ok(Json(json!({ "status": "success", "topic": topic })))
}
