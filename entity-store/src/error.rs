use thiserror::Error;

/// Errors that can occur during entity store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached. Callers may retry.
    #[error("Entity store unavailable: {0}")]
    Unavailable(String),

    /// An entity in a batch failed validation; nothing from the batch was written
    #[error("Invalid entity '{id}': {reason}")]
    InvalidEntity { id: String, reason: String },

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Persisted snapshot has a format this build does not understand
    #[error("Unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the failed operation can reasonably be retried as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
