//! Shared helpers for knowledge integration tests.
//!
//! A fake Ollama `/api/embed` endpoint is served from an in-process axum
//! listener so the engine can be exercised without a model.

use axum::{Json, Router, routing::post};
use serde_json::{Value, json};
use tempfile::TempDir;

use fieldlink_knowledge::{KnowledgeEngine, KnowledgeSettings};

/// Deterministic embedding: one-hot by crop, plus a bump for "改良" variants.
pub fn fake_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; 6];
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
    if text.contains("改良") {
        vector[4] = 0.5;
    }
    vector
}

async fn embed_handler(Json(body): Json<Value>) -> Json<Value> {
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let embeddings: Vec<Vec<f32>> = inputs.iter().map(|text| fake_vector(text)).collect();
    Json(json!({ "model": body["model"], "embeddings": embeddings }))
}

/// Start the fake embedding server and return its base URL.
pub async fn spawn_fake_ollama() -> String {
    let app = Router::new().route("/api/embed", post(embed_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake ollama");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake ollama server");
    });
    format!("http://{addr}")
}

/// Open an engine backed by a temp database and the fake embedder.
pub async fn setup() -> (KnowledgeEngine, TempDir) {
    let temp = TempDir::new().expect("tempdir");
    let settings = KnowledgeSettings {
        embedding_url: spawn_fake_ollama().await,
        embedding_model: "fake-embed".to_string(),
        db_path: temp.path().join("knowledge_db").join("knowledge.sqlite3"),
        ..Default::default()
    };
    let engine = KnowledgeEngine::open(settings).await.expect("open engine");
    (engine, temp)
}
