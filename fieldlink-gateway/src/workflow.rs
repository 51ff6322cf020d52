//! Dify workflow client.
//!
//! A run posts the sensor payload as workflow inputs and pulls the control
//! command out of the workflow outputs.

use std::time::Duration;

use fieldlink_core::WorkflowSettings;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_ERROR_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow API key is not usable as a header")]
    InvalidApiKey,
    #[error("workflow rate limited after {0} attempts")]
    RateLimited(u32),
    #[error("workflow request timed out after {0} attempts")]
    Timeout(u32),
    #[error("workflow returned HTTP {0}")]
    Status(StatusCode),
    #[error("workflow service unreachable")]
    Connect,
    #[error("workflow request failed: {0}")]
    Request(String),
}

enum Attempt {
    Done(Option<Value>),
    Retry(WorkflowError),
}

#[derive(Debug, Clone)]
pub struct WorkflowClient {
    http_client: reqwest::Client,
    run_url: String,
    user: String,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl WorkflowClient {
    pub fn new(settings: &WorkflowSettings, api_key: &str) -> Result<Self, WorkflowError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| WorkflowError::InvalidApiKey)?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| WorkflowError::Request(truncate_error(&e.to_string())))?;

        Ok(Self {
            http_client,
            run_url: run_url(&settings.base_url),
            user: settings.user.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    /// Run the workflow for `inputs` and return its control command, if any.
    pub async fn run(&self, inputs: &Value) -> Result<Option<Value>, WorkflowError> {
        let body = json!({
            "inputs": inputs,
            "user": self.user,
            "response_mode": "blocking",
        });

        let mut attempt = 0;
        loop {
            match self.attempt(&body).await? {
                Attempt::Done(control) => return Ok(control),
                Attempt::Retry(err) if attempt < self.max_retries => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    warn!(attempt = attempt + 1, ?delay, "{}, retrying", err);
                    sleep(delay).await;
                    attempt += 1;
                }
                Attempt::Retry(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, body: &Value) -> Result<Attempt, WorkflowError> {
        let attempts = || self.max_retries + 1;

        let response = match self
            .http_client
            .post(&self.run_url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(Attempt::Retry(WorkflowError::Timeout(attempts()))),
            Err(e) if e.is_connect() => return Err(WorkflowError::Connect),
            Err(e) => return Err(WorkflowError::Request(truncate_error(&e.to_string()))),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::Retry(WorkflowError::RateLimited(attempts())));
        }
        if !status.is_success() {
            return Err(WorkflowError::Status(status));
        }

        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) if e.is_timeout() => return Ok(Attempt::Retry(WorkflowError::Timeout(attempts()))),
            Err(e) => return Err(WorkflowError::Request(truncate_error(&e.to_string()))),
        };

        let control = extract_control(&payload);
        if control.is_none() {
            debug!("workflow returned no control output");
        }
        Ok(Attempt::Done(control))
    }
}

fn run_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/workflows/run", base)
    } else {
        format!("{}/v1/workflows/run", base)
    }
}

/// Pull the control command out of a workflow response.
///
/// Blocking runs nest outputs under `data.outputs`; older deployments return
/// `outputs` or the command itself at the top level. String outputs holding
/// JSON are decoded.
pub fn extract_control(payload: &Value) -> Option<Value> {
    let outputs = payload
        .pointer("/data/outputs")
        .filter(|v| v.is_object())
        .or_else(|| payload.get("outputs").filter(|v| v.is_object()))
        .unwrap_or(payload);

    let control = ["output", "control"]
        .iter()
        .filter_map(|key| outputs.get(*key))
        .find(|value| is_truthy(value))?;

    Some(match control {
        Value::String(text) => {
            serde_json::from_str(text.trim()).unwrap_or_else(|_| control.clone())
        }
        other => other.clone(),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn truncate_error(message: &str) -> String {
    if message.chars().count() > MAX_ERROR_LEN {
        let head: String = message.chars().take(MAX_ERROR_LEN).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}
