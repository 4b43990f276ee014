use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row not found")]
    NotFound,
}
