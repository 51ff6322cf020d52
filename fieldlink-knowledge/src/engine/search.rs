use crate::engine::KnowledgeEngine;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{SearchHit, similarity_from_distance};
use crate::storage;

const MAX_TOP_K: usize = 100;

pub(crate) fn clamp_top_k(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_TOP_K)
}

pub(crate) async fn search(
    engine: &KnowledgeEngine,
    query: &str,
    top_k: Option<usize>,
) -> KnowledgeResult<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(KnowledgeError::MissingField("query"));
    }

    let limit = clamp_top_k(top_k, engine.settings().default_top_k);
    let embedding = engine.embedder().embed(query).await?;
    let neighbors = storage::nearest(engine.pool(), &embedding, limit).await?;

    tracing::debug!(query, limit, hits = neighbors.len(), "knowledge search");

    Ok(neighbors
        .into_iter()
        .map(|neighbor| SearchHit {
            similarity: similarity_from_distance(neighbor.distance),
            score: neighbor.distance,
            id: neighbor.id,
            text: neighbor.text,
            metadata: neighbor.metadata,
        })
        .collect())
}
