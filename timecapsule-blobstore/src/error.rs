use thiserror::Error;

pub type BlobStoreResult<T> = Result<T, BlobStoreError>;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
}
