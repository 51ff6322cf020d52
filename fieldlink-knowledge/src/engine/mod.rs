use sqlx::SqlitePool;

use crate::KnowledgeSettings;
use crate::embeddings::EmbeddingClient;
use crate::errors::KnowledgeResult;
use crate::models::{KnowledgeRecord, SearchHit, UploadReport, UploadRequest};
use crate::storage::KnowledgeStore;

pub(crate) mod ingest;
pub(crate) mod records;
pub(crate) mod search;

#[derive(Debug, Clone)]
pub struct KnowledgeEngine {
    settings: KnowledgeSettings,
    embedder: EmbeddingClient,
    store: KnowledgeStore,
}

impl KnowledgeEngine {
    /// Open the store at `settings.db_path` and build the embedding client.
    pub async fn open(settings: KnowledgeSettings) -> KnowledgeResult<Self> {
        let store = KnowledgeStore::open(&settings.db_path).await?;
        let embedder = EmbeddingClient::new(&settings);
        tracing::info!(
            db = %settings.db_path.display(),
            model = %settings.embedding_model,
            "knowledge store opened"
        );
        Ok(Self {
            settings,
            embedder,
            store,
        })
    }

    /// Access the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    pub fn settings(&self) -> &KnowledgeSettings {
        &self.settings
    }

    pub(crate) fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// Split, deduplicate, embed and store uploaded knowledge.
    pub async fn upload(&self, request: UploadRequest) -> KnowledgeResult<UploadReport> {
        ingest::upload(self, request).await
    }

    /// Nearest records to `query`, closest first.
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> KnowledgeResult<Vec<SearchHit>> {
        search::search(self, query, top_k).await
    }

    pub async fn list(&self) -> KnowledgeResult<Vec<KnowledgeRecord>> {
        records::list(self.pool()).await
    }

    pub async fn get(&self, id: &str) -> KnowledgeResult<Option<KnowledgeRecord>> {
        records::get(self.pool(), id).await
    }

    pub async fn delete(&self, id: &str) -> KnowledgeResult<()> {
        records::delete(self.pool(), id).await
    }

    /// Remove every record, returning how many were removed.
    pub async fn clear(&self) -> KnowledgeResult<u64> {
        records::clear(self.pool()).await
    }

    pub async fn export(&self) -> KnowledgeResult<Vec<KnowledgeRecord>> {
        records::list(self.pool()).await
    }

    pub async fn count(&self) -> KnowledgeResult<i64> {
        crate::storage::count_records(self.pool()).await
    }
}
