use faultline_entity_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Every attempted source failed because of the store
    #[error("Entity store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid retrieval configuration: {0}")]
    InvalidConfig(String),
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetrievalError::Store(err) if err.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
