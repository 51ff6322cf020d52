use serde::Deserialize;

use crate::KnowledgeSettings;
use crate::errors::{KnowledgeError, KnowledgeResult};

/// Client for the Ollama embedding API.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &KnowledgeSettings) -> Self {
        Self {
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;

        let embeddings = if let Some(embeddings) = payload.embeddings {
            embeddings
        } else if let Some(embedding) = payload.embedding {
            vec![embedding]
        } else {
            return Err(KnowledgeError::Embedding(
                "embedding response missing vectors".to_string(),
            ));
        };

        if embeddings.len() != inputs.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }
        if embeddings.iter().any(|vector| vector.is_empty()) {
            return Err(KnowledgeError::Embedding(
                "embedding response contained an empty vector".to_string(),
            ));
        }

        Ok(embeddings)
    }

    /// Embed a single text.
    pub async fn embed(&self, input: &str) -> KnowledgeResult<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[input.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| KnowledgeError::Embedding("no embedding returned".to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}
