use std::collections::HashSet;

use tracing::{info, warn};

use crate::chunker::{content_hash, heading, split_blocks};
use crate::engine::KnowledgeEngine;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::metadata::{detect_crop_and_stage, extract_metadata};
use crate::models::{
    SimilarRecord, SkipReason, SkippedBlock, UploadReport, UploadRequest,
    similarity_from_distance,
};
use crate::storage::{self, NewRecord};

const EMBED_BATCH: usize = 32;

struct Candidate {
    text: String,
    hash: String,
    crop: String,
    stage: String,
}

pub(crate) async fn upload(
    engine: &KnowledgeEngine,
    request: UploadRequest,
) -> KnowledgeResult<UploadReport> {
    let blocks = split_blocks(&request.content);
    if blocks.is_empty() {
        return Err(KnowledgeError::MissingField("text or file"));
    }

    let threshold = f64::from(
        request
            .threshold
            .unwrap_or(engine.settings().similarity_threshold)
            .clamp(0.0, 1.0),
    );
    info!(blocks = blocks.len(), threshold, force = request.force, "knowledge upload");

    let mut report = UploadReport::default();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for block in blocks {
        let first_line = heading(&block).to_string();
        let Some((crop, stage)) = detect_crop_and_stage(&first_line) else {
            warn!(heading = %first_line, "cannot recognise crop or stage, block skipped");
            report.skipped.push(skipped(SkipReason::Unrecognized, first_line, Vec::new()));
            continue;
        };

        let hash = content_hash(&block);
        let stored = storage::find_by_hash(engine.pool(), &hash).await?;
        if stored.is_some() || !seen.insert(hash.clone()) {
            info!(crop = %crop, stage = %stage, "identical knowledge already stored, block skipped");
            let similar = stored
                .map(|id| {
                    vec![SimilarRecord {
                        id,
                        similarity: 1.0,
                        text: block.clone(),
                    }]
                })
                .unwrap_or_default();
            report
                .skipped
                .push(skipped(SkipReason::ExactDuplicate, first_line, similar));
            continue;
        }

        candidates.push(Candidate {
            text: block,
            hash,
            crop,
            stage,
        });
    }

    for batch in candidates.chunks(EMBED_BATCH) {
        let inputs: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = engine.embedder().embed_batch(&inputs).await?;

        for (candidate, embedding) in batch.iter().zip(embeddings) {
            let neighbors = storage::nearest(
                engine.pool(),
                &embedding,
                engine.settings().duplicate_candidates,
            )
            .await?;
            let similar: Vec<SimilarRecord> = neighbors
                .into_iter()
                .map(|neighbor| SimilarRecord {
                    similarity: similarity_from_distance(neighbor.distance),
                    id: neighbor.id,
                    text: neighbor.text,
                })
                .filter(|record| record.similarity >= threshold)
                .collect();

            let first_line = heading(&candidate.text).to_string();
            if similar.iter().any(|record| record.similarity >= 1.0) {
                info!(crop = %candidate.crop, stage = %candidate.stage, "identical embedding already stored, block skipped");
                report
                    .skipped
                    .push(skipped(SkipReason::ExactDuplicate, first_line, similar));
                continue;
            }
            if !similar.is_empty() && !request.force {
                info!(
                    crop = %candidate.crop,
                    stage = %candidate.stage,
                    matches = similar.len(),
                    "similar knowledge found, block skipped"
                );
                report
                    .skipped
                    .push(skipped(SkipReason::Similar, first_line, similar));
                continue;
            }

            let id = uuid::Uuid::new_v4().to_string();
            let mut metadata = extract_metadata(&candidate.text);
            metadata.record_id = Some(id.clone());

            storage::insert_record(
                engine.pool(),
                &NewRecord {
                    id: &id,
                    text: &candidate.text,
                    metadata: &metadata,
                    content_hash: &candidate.hash,
                    embedding: &embedding,
                    embedding_model: engine.embedder().model(),
                },
            )
            .await?;

            info!(record_id = %id, crop = %candidate.crop, stage = %candidate.stage, "knowledge added");
            report.added += 1;
            report.ids.push(id);
        }
    }

    Ok(report)
}

fn skipped(reason: SkipReason, heading: String, similar: Vec<SimilarRecord>) -> SkippedBlock {
    SkippedBlock {
        reason,
        heading,
        similar,
    }
}
