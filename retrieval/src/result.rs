use serde::{Deserialize, Serialize};
use std::fmt;

/// Which retrieval backend produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    /// BM25 over entity text
    Lexical,
    /// Cosine similarity over embeddings
    Vector,
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalSource::Lexical => write!(f, "lexical"),
            RetrievalSource::Vector => write!(f, "vector"),
        }
    }
}

/// Input to a hybrid retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// Free text for lexical search (and for the embedder when no vector is given)
    pub text: String,

    /// Precomputed query embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            vector: None,
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// One entity found by retrieval, with per-source normalized scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedHit {
    pub id: String,

    /// Normalized BM25 score in `[0, 1]`, 0 when lexical search missed it
    pub lexical: f32,

    /// Normalized cosine score in `[0, 1]`, 0 when vector search missed it
    pub vector: f32,

    /// Position in the lexical list (0 = best)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,

    /// Position in the vector list (0 = best)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
}

impl RetrievedHit {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            lexical: 0.0,
            vector: 0.0,
            lexical_rank: None,
            vector_rank: None,
        }
    }

    /// Unweighted sum used for ordering merged hits
    pub fn combined(&self) -> f32 {
        self.lexical + self.vector
    }

    pub fn found_by(&self, source: RetrievalSource) -> bool {
        match source {
            RetrievalSource::Lexical => self.lexical_rank.is_some(),
            RetrievalSource::Vector => self.vector_rank.is_some(),
        }
    }
}

/// A source that was attempted but produced nothing usable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedSource {
    pub source: RetrievalSource,
    pub reason: String,
}

/// Retrieval timings and counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// Total retrieval time in milliseconds
    pub total_time_ms: u64,

    /// Lexical search time in milliseconds
    pub lexical_time_ms: u64,

    /// Vector search time in milliseconds, including query embedding
    pub vector_time_ms: u64,

    /// Number of lexical results
    pub lexical_count: usize,

    /// Number of vector results
    pub vector_count: usize,
}

/// Merged retrieval output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    /// Ordered by `lexical + vector` descending, then id ascending
    pub hits: Vec<RetrievedHit>,

    /// Sources that answered, even if with nothing
    pub searched: Vec<RetrievalSource>,

    /// Sources that failed and were left out of `hits`
    pub degraded: Vec<DegradedSource>,

    pub stats: RetrievalStats,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
