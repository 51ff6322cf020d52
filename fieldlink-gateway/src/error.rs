use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fieldlink_knowledge::KnowledgeError;
use serde::Serialize;
use tracing::{error, warn};

use crate::control_log::ControlLogError;
use crate::mqtt::PublishError;
use crate::workflow::WorkflowError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing parameter: {0}")]
    MissingField(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("workflow is not configured (set DIFY_API_KEY)")]
    WorkflowDisabled,
    #[error(transparent)]
    Bus(#[from] PublishError),
    #[error(transparent)]
    ControlLog(#[from] ControlLogError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Knowledge(KnowledgeError::MissingField(_)) => StatusCode::BAD_REQUEST,
            Self::Knowledge(KnowledgeError::UnknownRecord(_)) => StatusCode::NOT_FOUND,
            Self::Knowledge(err) if err.is_upstream() => StatusCode::BAD_GATEWAY,
            Self::Knowledge(_) | Self::ControlLog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Workflow(_) | Self::Bus(_) => StatusCode::BAD_GATEWAY,
            Self::WorkflowDisabled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        let body = ErrorResponse {
            status: if status == StatusCode::NOT_FOUND {
                "not_found"
            } else {
                "failed"
            },
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
