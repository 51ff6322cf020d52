//! Local knowledge store: Ollama embeddings over SQLite + sqlite-vec.

pub mod chunker;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod metadata;
pub mod models;
pub mod storage;

pub use embeddings::EmbeddingClient;
pub use engine::KnowledgeEngine;
pub use errors::{KnowledgeError, KnowledgeResult};
pub use fieldlink_core::config::KnowledgeSettings;
pub use models::{
    KnowledgeRecord, RecordMetadata, SearchHit, SimilarRecord, SkipReason, SkippedBlock,
    UploadReport, UploadRequest,
};
