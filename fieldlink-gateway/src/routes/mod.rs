pub mod form;
pub mod knowledge;
pub mod plc;

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::mqtt::BusStatus;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Stored knowledge records, `None` when the store is unreadable
    pub records: Option<i64>,
    pub mqtt: BusStatus,
    pub workflow: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let records = match state.knowledge.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!("Health check could not count records: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        records,
        mqtt: state.publisher.status(),
        workflow: state.workflow.is_some(),
    })
}

pub async fn mcp(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body = String::from_utf8_lossy(&body);
    match state.mcp().handle_json(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
