use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use libsqlite3_sys::{SQLITE_OK, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::RecordMetadata;

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    pool: SqlitePool,
}

impl KnowledgeStore {
    pub async fn open(db_path: &Path) -> KnowledgeResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/knowledge").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn init_sqlite_vec_once() -> KnowledgeResult<()> {
    // The entry point signature is inferred from `sqlite3_auto_extension`.
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(_, _, _) -> _,
        >(sqlite3_vec_init as *const ())))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(KnowledgeError::SqliteVec(format!(
            "sqlite-vec init failed with code {rc}"
        )))
    }
}

/// A stored knowledge record without its embedding.
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
    pub content_hash: String,
    pub embedding_model: String,
    pub created_at: String,
}

/// A record returned by a nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine distance to the query vector, lower is closer.
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub metadata: &'a RecordMetadata,
    pub content_hash: &'a str,
    pub embedding: &'a [f32],
    pub embedding_model: &'a str,
}

type RecordTuple = (String, String, String, String, String, String);

fn row_from_tuple(row: RecordTuple) -> KnowledgeResult<RecordRow> {
    let (id, text, metadata_json, content_hash, embedding_model, created_at) = row;
    Ok(RecordRow {
        id,
        text,
        metadata: serde_json::from_str(&metadata_json)?,
        content_hash,
        embedding_model,
        created_at,
    })
}

pub async fn insert_record(pool: &SqlitePool, record: &NewRecord<'_>) -> KnowledgeResult<()> {
    let metadata_json = serde_json::to_string(record.metadata)?;
    let embedding_json = serde_json::to_string(record.embedding)?;

    sqlx::query(
        r#"INSERT INTO records (id, text, metadata_json, content_hash, embedding, embedding_model, embedding_dim, created_at)
           VALUES (?, ?, ?, ?, vec_f32(?), ?, ?, ?)"#,
    )
    .bind(record.id)
    .bind(record.text)
    .bind(metadata_json)
    .bind(record.content_hash)
    .bind(embedding_json)
    .bind(record.embedding_model)
    .bind(record.embedding.len() as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_record(pool: &SqlitePool, id: &str) -> KnowledgeResult<Option<RecordRow>> {
    let row: Option<RecordTuple> = sqlx::query_as(
        "SELECT id, text, metadata_json, content_hash, embedding_model, created_at FROM records WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(row_from_tuple).transpose()
}

pub async fn list_records(pool: &SqlitePool) -> KnowledgeResult<Vec<RecordRow>> {
    let rows: Vec<RecordTuple> = sqlx::query_as(
        "SELECT id, text, metadata_json, content_hash, embedding_model, created_at FROM records ORDER BY created_at ASC, rowid ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_from_tuple).collect()
}

pub async fn find_by_hash(pool: &SqlitePool, content_hash: &str) -> KnowledgeResult<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT id FROM records WHERE content_hash = ? LIMIT 1")
            .bind(content_hash)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id,)| id))
}

pub async fn count_records(pool: &SqlitePool) -> KnowledgeResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete one record. Returns whether a row was removed.
pub async fn delete_record(pool: &SqlitePool, id: &str) -> KnowledgeResult<bool> {
    let result = sqlx::query("DELETE FROM records WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every record. Returns the number of rows removed.
pub async fn clear_records(pool: &SqlitePool) -> KnowledgeResult<u64> {
    let result = sqlx::query("DELETE FROM records").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Brute-force cosine search over records embedded with the same dimension.
pub async fn nearest(
    pool: &SqlitePool,
    embedding: &[f32],
    limit: usize,
) -> KnowledgeResult<Vec<Neighbor>> {
    if limit == 0 || embedding.is_empty() {
        return Ok(Vec::new());
    }

    let payload = serde_json::to_string(embedding)?;
    let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
        r#"SELECT id, text, metadata_json, vec_distance_cosine(embedding, vec_f32(?)) AS distance
           FROM records
           WHERE embedding_dim = ?
           ORDER BY distance ASC
           LIMIT ?"#,
    )
    .bind(payload)
    .bind(embedding.len() as i64)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, text, metadata_json, distance)| {
            Ok(Neighbor {
                id,
                text,
                metadata: serde_json::from_str(&metadata_json)?,
                distance,
            })
        })
        .collect()
}
