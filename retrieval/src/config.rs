use serde::{Deserialize, Serialize};

/// Configuration for hybrid retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from BM25 search
    #[serde(default = "default_top_k")]
    pub top_k_lexical: usize,

    /// Candidates requested from vector search
    #[serde(default = "default_top_k")]
    pub top_k_vector: usize,

    #[serde(default = "default_true")]
    pub enable_lexical: bool,

    #[serde(default = "default_true")]
    pub enable_vector: bool,

    /// Query text shorter than this (in characters, trimmed) skips lexical search
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,
}

fn default_top_k() -> usize {
    50
}

fn default_min_query_length() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_lexical: default_top_k(),
            top_k_vector: default_top_k(),
            enable_lexical: true,
            enable_vector: true,
            min_query_length: default_min_query_length(),
        }
    }
}

impl RetrievalConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.enable_lexical && !self.enable_vector {
            return Err("at least one of lexical or vector search must be enabled".to_string());
        }

        if self.enable_lexical && self.top_k_lexical == 0 {
            return Err("top_k_lexical must be > 0 when lexical search is enabled".to_string());
        }

        if self.enable_vector && self.top_k_vector == 0 {
            return Err("top_k_vector must be > 0 when vector search is enabled".to_string());
        }

        Ok(())
    }

    /// Lexical only, small candidate pool
    pub fn fast() -> Self {
        Self {
            top_k_lexical: 20,
            enable_vector: false,
            ..Default::default()
        }
    }

    /// Both sources, large candidate pools
    pub fn accurate() -> Self {
        Self {
            top_k_lexical: 100,
            top_k_vector: 100,
            ..Default::default()
        }
    }
}
