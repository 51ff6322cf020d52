use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::KnowledgeRecord;
use crate::storage::{self, RecordRow};

fn to_record(row: RecordRow) -> KnowledgeRecord {
    KnowledgeRecord {
        id: row.id,
        text: row.text,
        metadata: row.metadata,
        created_at: row.created_at,
    }
}

pub(crate) async fn list(pool: &SqlitePool) -> KnowledgeResult<Vec<KnowledgeRecord>> {
    Ok(storage::list_records(pool)
        .await?
        .into_iter()
        .map(to_record)
        .collect())
}

pub(crate) async fn get(pool: &SqlitePool, id: &str) -> KnowledgeResult<Option<KnowledgeRecord>> {
    Ok(storage::get_record(pool, id).await?.map(to_record))
}

pub(crate) async fn delete(pool: &SqlitePool, id: &str) -> KnowledgeResult<()> {
    let id = id.trim();
    if id.is_empty() {
        return Err(KnowledgeError::MissingField("doc_id"));
    }
    if !storage::delete_record(pool, id).await? {
        return Err(KnowledgeError::UnknownRecord(id.to_string()));
    }
    info!(record_id = %id, "knowledge record deleted");
    Ok(())
}

pub(crate) async fn clear(pool: &SqlitePool) -> KnowledgeResult<u64> {
    let removed = storage::clear_records(pool).await?;
    info!(removed, "knowledge store cleared");
    Ok(removed)
}
