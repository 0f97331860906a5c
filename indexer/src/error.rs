use faultline_entity_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store rejected or failed a write; fatal to the run
    #[error("Entity store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Ignore error: {0}")]
    Ignore(String),

    #[error("Indexing task failed: {0}")]
    Task(String),
}

impl From<ignore::Error> for IndexerError {
    fn from(err: ignore::Error) -> Self {
        IndexerError::Ignore(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IndexerError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexerError::Task(err.to_string())
    }
}

impl IndexerError {
    /// Whether the run can reasonably be retried as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexerError::Store(err) if err.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
