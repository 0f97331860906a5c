use crate::entity::CodeEntity;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An entity id with a backend-specific relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Consistent view of every entity in a store at one generation
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub generation: u64,
    /// Entities ordered by id
    pub entities: Vec<CodeEntity>,
}

/// Durable keyed collection of code entities.
///
/// Ranked results are ordered by score descending, then id ascending, so
/// identical store state always produces identical output.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert or overwrite entities by id. Returns the number written.
    async fn upsert(&self, entities: Vec<CodeEntity>) -> Result<usize>;

    async fn get(&self, id: &str) -> Result<Option<CodeEntity>>;

    /// Remove entities by id. Returns how many existed.
    async fn remove(&self, ids: &[String]) -> Result<usize>;

    /// BM25 search over name, full_name, signature and body
    async fn search_lexical(&self, query: &str, top_k: usize) -> Result<Vec<ScoredId>>;

    /// Cosine similarity search over embeddings
    async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredId>>;

    /// Entities whose span contains `line` in a file matching `file_path`,
    /// narrowest span first
    async fn find_by_location(&self, file_path: &str, line: usize) -> Result<Vec<CodeEntity>>;

    /// Entities whose `name` or `full_name` equals `name`, ordered by id
    async fn find_by_name(&self, name: &str) -> Result<Vec<CodeEntity>>;

    /// Entities stored under exactly `file_path`, ordered by id
    async fn find_by_file(&self, file_path: &str) -> Result<Vec<CodeEntity>>;

    /// Wait for in-flight writes and return every entity
    async fn snapshot(&self) -> Result<StoreSnapshot>;

    /// Number of stored entities
    async fn count(&self) -> Result<usize>;

    /// Monotonic version, bumped by every committed write
    fn generation(&self) -> u64;
}

/// Sort ranked hits by score descending, then id ascending
pub(crate) fn sort_scored(hits: &mut [ScoredId]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sort_scored_breaks_ties_by_id() {
        let mut hits = vec![
            ScoredId::new("c", 0.5),
            ScoredId::new("a", 0.9),
            ScoredId::new("b", 0.5),
        ];
        sort_scored(&mut hits);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
