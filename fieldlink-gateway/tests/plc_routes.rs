//! Router tests for workflow, control, history, health and MCP endpoints.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{CONTROL_TOPIC, SENSOR_TOPIC, json_body, setup, setup_with_workflow, text_body};
use fieldlink_core::MqttSettings;
use fieldlink_gateway::RecordSource;
use fieldlink_gateway::mqtt::{BusStatus, ControlPublisher, MqttBridge, handle_message};
use fieldlink_gateway::state::{AppState, Topics};

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_reports_components() {
    let gateway = setup(false).await;
    let response = gateway
        .router()
        .oneshot(empty_request("GET", "/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["records"], 0);
    assert_eq!(body["mqtt"], "connected");
    assert_eq!(body["workflow"], false);
}

#[tokio::test]
async fn control_post_publishes_and_records() {
    let gateway = setup(false).await;
    gateway
        .state
        .control_log
        .set_latest_sensor(json!({"temperature": 31.2}));

    let response = gateway
        .router()
        .oneshot(json_request("POST", "/control", json!({"fan": "on"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["topic"], CONTROL_TOPIC);

    let sent = gateway.publisher.sent.lock().unwrap().clone();
    assert_eq!(sent, vec![(CONTROL_TOPIC.to_string(), json!({"fan": "on"}))]);

    let response = gateway
        .router()
        .oneshot(empty_request("GET", "/control"))
        .await
        .unwrap();
    let log: Value = json_body(response.into_body()).await;
    assert_eq!(log["count"], 1);
    assert_eq!(log["data"][0]["source"], "http");
    assert_eq!(log["data"][0]["sensor_data"]["temperature"], 31.2);

    // The broker echoes the command back; it must not be recorded again.
    handle_message(&gateway.state, CONTROL_TOPIC, br#"{"fan": "on"}"#).await;
    assert_eq!(gateway.state.control_log.len().await, 1);
}

#[tokio::test]
async fn control_post_rejects_invalid_json() {
    let gateway = setup(false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/control")
        .header("content-type", "application/json")
        .body(Body::from("fan on"))
        .unwrap();
    let response = gateway.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(gateway.publisher.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn control_post_fails_when_broker_unreachable() {
    let gateway = setup(false).await;
    let settings = MqttSettings {
        broker: "127.0.0.1".to_string(),
        port: 1,
        ..Default::default()
    };
    let (bridge, eventloop) = MqttBridge::new(&settings);
    let bridge = Arc::new(bridge);
    let state = Arc::new(AppState::new(
        Arc::clone(&gateway.state.knowledge),
        Arc::clone(&gateway.state.control_log),
        bridge.clone(),
        None,
        Topics {
            sensor: SENSOR_TOPIC.to_string(),
            control: CONTROL_TOPIC.to_string(),
        },
    ));
    let handle = eventloop.spawn(Arc::clone(&state));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bridge.status(), BusStatus::Disconnected);

    let router = fieldlink_gateway::server::create_router(Arc::clone(&state));
    let statuses = tokio::time::timeout(Duration::from_secs(10), async {
        let mut statuses = Vec::new();
        for i in 0..200 {
            let response = router
                .clone()
                .oneshot(json_request("POST", "/control", json!({"seq": i})))
                .await
                .unwrap();
            let status = response.status();
            statuses.push(status);
            if status != StatusCode::OK {
                break;
            }
        }
        statuses
    })
    .await
    .expect("control requests must not hang");
    handle.abort();

    assert_eq!(statuses.last(), Some(&StatusCode::BAD_GATEWAY));
    // Failed publishes are not recorded.
    assert_eq!(state.control_log.len().await, statuses.len() - 1);
}

#[tokio::test]
async fn bus_messages_feed_history() {
    let gateway = setup(false).await;

    handle_message(&gateway.state, SENSOR_TOPIC, br#"{"temperature": 22}"#).await;
    handle_message(&gateway.state, CONTROL_TOPIC, b"pump off").await;

    let entries = gateway.state.control_log.entries(None).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, RecordSource::Mqtt);
    assert_eq!(entries[0].control_command, json!({"raw": "pump off"}));

    let response = gateway
        .router()
        .oneshot(empty_request("GET", "/history?limit=5"))
        .await
        .unwrap();
    let history: Value = json_body(response.into_body()).await;
    assert_eq!(history["count"], 1);
    assert_eq!(history["data"][0]["temperature"], 22);
}

#[tokio::test]
async fn run_without_workflow_is_unavailable() {
    let gateway = setup(false).await;
    let response = gateway
        .router()
        .oneshot(json_request("POST", "/run", json!({"inputs": {"temperature": 35}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn run_records_workflow_control() {
    let gateway = setup(true).await;

    let response = gateway
        .router()
        .oneshot(json_request("POST", "/run", json!({"inputs": {"temperature": 35}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["control"], json!({"fan": "on"}));
    assert_eq!(body["recorded"], true);

    let entries = gateway.state.control_log.entries(None).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, RecordSource::Workflow);

    // Echo of the workflow's command from the bus is suppressed.
    gateway
        .state
        .control_log
        .set_latest_sensor(json!({"temperature": 35}));
    handle_message(&gateway.state, CONTROL_TOPIC, br#"{"fan": "on"}"#).await;
    assert_eq!(gateway.state.control_log.len().await, 1);
}

#[tokio::test]
async fn run_without_control_output_records_nothing() {
    let gateway = setup(true).await;
    gateway
        .state
        .control_log
        .set_latest_sensor(json!({"temperature": 18}));

    let response = gateway
        .router()
        .oneshot(empty_request("POST", "/run"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response.into_body()).await;
    assert!(body["control"].is_null());
    assert_eq!(body["recorded"], false);
    assert!(gateway.state.control_log.is_empty().await);
}

#[tokio::test]
async fn run_needs_inputs_or_sensor_data() {
    let gateway = setup(true).await;
    let response = gateway
        .router()
        .oneshot(empty_request("POST", "/run"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gateway.dify.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_retries_rate_limits() {
    let gateway = setup(true).await;
    gateway.dify.rate_limited.store(2, Ordering::SeqCst);

    let response = gateway
        .router()
        .oneshot(json_request("POST", "/run", json!({"inputs": {"temperature": 40}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gateway.dify.calls.load(Ordering::SeqCst), 3);

    gateway.dify.rate_limited.store(5, Ordering::SeqCst);
    let response = gateway
        .router()
        .oneshot(json_request("POST", "/run", json!({"inputs": {"temperature": 40}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn run_retries_timeouts_then_fails() {
    let gateway = setup_with_workflow(|settings| settings.timeout_seconds = 1).await;
    gateway.dify.delay_ms.store(1500, Ordering::SeqCst);

    let response = gateway
        .router()
        .oneshot(json_request("POST", "/run", json!({"inputs": {"temperature": 40}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let max_retries = gateway.workflow_settings.max_retries as usize;
    assert_eq!(gateway.dify.calls.load(Ordering::SeqCst), max_retries + 1);
    assert!(gateway.state.control_log.is_empty().await);
}

#[tokio::test]
async fn sensor_message_triggers_workflow() {
    let gateway = setup(true).await;

    handle_message(&gateway.state, SENSOR_TOPIC, br#"{"temperature": 35}"#).await;

    let mut entries = Vec::new();
    for _ in 0..50 {
        entries = gateway.state.control_log.entries(None).await;
        if !entries.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, RecordSource::Workflow);
    assert_eq!(entries[0].sensor_data, json!({"temperature": 35}));
    assert_eq!(entries[0].control_command, json!({"fan": "on"}));
    assert_eq!(gateway.dify.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mcp_lists_and_calls_tools() {
    let gateway = setup(false).await;
    gateway
        .state
        .control_log
        .record(json!({"t": 1}), json!({"fan": "off"}), RecordSource::Mqtt)
        .await
        .unwrap();

    let response = gateway
        .router()
        .oneshot(json_request(
            "POST",
            "/mcp",
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        ))
        .await
        .unwrap();
    let body: Value = json_body(response.into_body()).await;
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["get_control_log", "get_history", "search_knowledge"]);

    let response = gateway
        .router()
        .oneshot(json_request(
            "POST",
            "/mcp",
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {"name": "get_control_log", "arguments": {"limit": 10}}
            }),
        ))
        .await
        .unwrap();
    let body: Value = json_body(response.into_body()).await;
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["data"][0]["control_command"]["fan"], "off");

    let response = gateway
        .router()
        .oneshot(json_request(
            "POST",
            "/mcp",
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "search_knowledge", "arguments": {}}
            }),
        ))
        .await
        .unwrap();
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn mcp_rejects_bad_requests() {
    let gateway = setup(false).await;

    let response = gateway
        .router()
        .oneshot(json_request(
            "POST",
            "/mcp",
            json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
        ))
        .await
        .unwrap();
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["error"]["code"], -32601);

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = gateway.router().oneshot(request).await.unwrap();
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["error"]["code"], -32700);
}

#[tokio::test]
async fn mcp_answers_ping_and_accepts_notifications() {
    let gateway = setup(false).await;

    let response = gateway
        .router()
        .oneshot(json_request(
            "POST",
            "/mcp",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(text_body(response.into_body()).await.is_empty());

    let response = gateway
        .router()
        .oneshot(json_request(
            "POST",
            "/mcp",
            json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["id"], 9);
    assert_eq!(body["result"], json!({}));
    assert!(body.get("error").is_none());
}
