use faultline_entity_store::StoreError;
use faultline_indexer::IndexerError;
use faultline_retrieval::RetrievalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalizeError {
    /// No store-backed source could reach the store
    #[error("Entity store error: {0}")]
    Store(#[from] StoreError),

    #[error("Indexing failed: {0}")]
    Index(#[from] IndexerError),

    #[error("Retrieval error: {0}")]
    Retrieval(RetrievalError),

    #[error("Invalid localizer configuration: {0}")]
    InvalidConfig(String),
}

impl From<RetrievalError> for LocalizeError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Store(err) => LocalizeError::Store(err),
            other => LocalizeError::Retrieval(other),
        }
    }
}

impl LocalizeError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            LocalizeError::Store(err) => err.is_retryable(),
            LocalizeError::Index(err) => err.is_retryable(),
            LocalizeError::Retrieval(err) => err.is_retryable(),
            LocalizeError::InvalidConfig(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalizeError>;
