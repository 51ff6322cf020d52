//! Shared helpers for gateway integration tests.
//!
//! Fake Ollama and Dify servers run on in-process axum listeners; the bus is
//! replaced by a publisher that records what it was asked to send.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing::post};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;

use fieldlink_core::{HistorySettings, WorkflowSettings};
use fieldlink_gateway::mqtt::{BusStatus, ControlPublisher, PublishError};
use fieldlink_gateway::state::{AppState, Topics};
use fieldlink_gateway::workflow::WorkflowClient;
use fieldlink_gateway::ControlLog;
use fieldlink_knowledge::{KnowledgeEngine, KnowledgeSettings};

pub const SENSOR_TOPIC: &str = "plc/sensordata";
pub const CONTROL_TOPIC: &str = "plc/control_cmd";
pub const DIFY_KEY: &str = "app-test-key";

/// Parse a JSON response body.
pub async fn json_body<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn text_body(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl ControlPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let value = serde_json::from_slice(&payload).unwrap();
        self.sent.lock().unwrap().push((topic.to_string(), value));
        Ok(())
    }

    fn status(&self) -> BusStatus {
        BusStatus::Connected
    }
}

/// Deterministic embedding: one-hot by crop.
fn fake_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; 4];
    let topic = if text.contains("番茄") {
        0
    } else if text.contains("黄瓜") {
        1
    } else if text.contains("水稻") {
        2
    } else {
        3
    };
    vector[topic] = 1.0;
    vector
}

async fn embed_handler(Json(body): Json<Value>) -> Json<Value> {
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(fake_vector).collect())
        .unwrap_or_default();
    Json(json!({ "model": body["model"], "embeddings": embeddings }))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake server");
    });
    format!("http://{addr}")
}

pub async fn spawn_fake_ollama() -> String {
    serve(Router::new().route("/api/embed", post(embed_handler))).await
}

/// Fake Dify state: number of leading requests answered with 429, and a
/// delay applied before every answer.
#[derive(Clone, Default)]
pub struct FakeDify {
    pub rate_limited: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
    pub delay_ms: Arc<AtomicU64>,
}

async fn workflow_handler(
    State(dify): State<FakeDify>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    dify.calls.fetch_add(1, Ordering::SeqCst);

    let delay = dify.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {DIFY_KEY}"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"code": "unauthorized"})));
    }

    let remaining = dify.rate_limited.load(Ordering::SeqCst);
    if remaining > 0 {
        dify.rate_limited.store(remaining - 1, Ordering::SeqCst);
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"code": "too_many_requests"})));
    }

    let temperature = body["inputs"]["temperature"].as_f64().unwrap_or_default();
    let outputs = if temperature > 30.0 {
        json!({ "output": "{\"fan\": \"on\"}" })
    } else {
        json!({})
    };
    (
        StatusCode::OK,
        Json(json!({
            "workflow_run_id": "run-1",
            "data": { "status": "succeeded", "outputs": outputs }
        })),
    )
}

pub async fn spawn_fake_dify(dify: FakeDify) -> String {
    serve(
        Router::new()
            .route("/v1/workflows/run", post(workflow_handler))
            .with_state(dify),
    )
    .await
}

pub struct TestGateway {
    pub state: Arc<AppState>,
    pub publisher: Arc<RecordingPublisher>,
    pub dify: FakeDify,
    pub workflow_settings: WorkflowSettings,
    pub temp: TempDir,
}

impl TestGateway {
    pub fn router(&self) -> Router {
        fieldlink_gateway::server::create_router(Arc::clone(&self.state))
    }
}

/// Build gateway state over a temp directory; `with_workflow` wires a fake Dify.
pub async fn setup(with_workflow: bool) -> TestGateway {
    build(with_workflow.then_some(|_: &mut WorkflowSettings| {})).await
}

/// Like `setup(true)`, with the workflow settings adjusted by `configure`.
pub async fn setup_with_workflow(configure: impl FnOnce(&mut WorkflowSettings)) -> TestGateway {
    build(Some(configure)).await
}

async fn build<F: FnOnce(&mut WorkflowSettings)>(workflow: Option<F>) -> TestGateway {
    let temp = TempDir::new().expect("tempdir");

    let knowledge = KnowledgeEngine::open(KnowledgeSettings {
        embedding_url: spawn_fake_ollama().await,
        embedding_model: "fake-embed".to_string(),
        db_path: temp.path().join("knowledge.sqlite3"),
        ..Default::default()
    })
    .await
    .expect("open knowledge engine");

    let history = HistorySettings {
        log_file: temp.path().join("control_log.json"),
        ..Default::default()
    };
    let control_log = ControlLog::load(&history).await;

    let dify = FakeDify::default();
    let mut workflow_settings = WorkflowSettings {
        retry_backoff_ms: 10,
        ..Default::default()
    };
    let workflow = match workflow {
        Some(configure) => {
            workflow_settings.base_url = spawn_fake_dify(dify.clone()).await;
            configure(&mut workflow_settings);
            Some(WorkflowClient::new(&workflow_settings, DIFY_KEY).expect("workflow client"))
        }
        None => None,
    };

    let publisher = Arc::new(RecordingPublisher::default());
    let state = Arc::new(AppState::new(
        Arc::new(knowledge),
        Arc::new(control_log),
        publisher.clone(),
        workflow,
        Topics {
            sensor: SENSOR_TOPIC.to_string(),
            control: CONTROL_TOPIC.to_string(),
        },
    ));

    TestGateway {
        state,
        publisher,
        dify,
        workflow_settings,
        temp,
    }
}
