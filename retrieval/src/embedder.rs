use crate::error::Result;
use async_trait::async_trait;

/// Turns free text into a query vector.
///
/// Implemented by the embedding collaborator; the vectors must come from the
/// same model and dimensionality as the entity embeddings in the store.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
