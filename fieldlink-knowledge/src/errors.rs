#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("sqlite-vec initialization error: {0}")]
    SqliteVec(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown record: {0}")]
    UnknownRecord(String),
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl KnowledgeError {
    /// Whether the failure came from the embedding service rather than the store.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Embedding(_))
    }
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
