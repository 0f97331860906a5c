use crate::candidate::{Candidate, MatchSource};
use serde::{Deserialize, Serialize};

/// A source that failed and was left out of the fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub source: MatchSource,
    pub reason: String,
}

/// Localization timings and counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizeStats {
    /// Total localization time in milliseconds
    pub total_time_ms: u64,

    /// Direct lookups plus graph expansion, in milliseconds
    pub direct_time_ms: u64,

    /// Hybrid retrieval time in milliseconds
    pub retrieval_time_ms: u64,

    /// Fusion time in milliseconds
    pub fusion_time_ms: u64,

    /// Distinct directly matched entities
    pub direct_count: usize,

    /// Entities reached by caller expansion
    pub expanded_count: usize,

    /// Merged retrieval hits
    pub retrieved_count: usize,

    /// Cache hit
    pub cache_hit: bool,
}

/// Ranked candidates plus an account of how they were produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    pub candidates: Vec<Candidate>,

    /// Sources that failed; the candidates come from the rest
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,

    /// Sources abandoned because the time budget ran out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timed_out: Vec<MatchSource>,

    /// Generation of the call graph used for expansion
    pub graph_generation: u64,

    pub stats: LocalizeStats,
}

impl Localization {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Every source finished in time and none failed
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty() && self.timed_out.is_empty()
    }
}
