use faultline_retrieval::RetrievalSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Evidence that put an entity on the candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    /// A stack frame points into the entity
    Direct,
    /// The entity calls, possibly transitively, a direct match
    Graph,
    Lexical,
    Vector,
}

impl From<RetrievalSource> for MatchSource {
    fn from(source: RetrievalSource) -> Self {
        match source {
            RetrievalSource::Lexical => MatchSource::Lexical,
            RetrievalSource::Vector => MatchSource::Vector,
        }
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchSource::Direct => "direct",
            MatchSource::Graph => "graph",
            MatchSource::Lexical => "lexical",
            MatchSource::Vector => "vector",
        };
        f.write_str(name)
    }
}

/// Weighted contribution of each source. The parts sum to the candidate score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub direct: f32,
    pub graph: f32,
    pub lexical: f32,
    pub vector: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.direct + self.graph + self.lexical + self.vector
    }
}

/// A ranked suspect location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_id: String,

    /// Composite score, the sum of `score_breakdown`
    pub score: f32,

    pub score_breakdown: ScoreBreakdown,

    /// Contributing sources in `Direct, Graph, Lexical, Vector` order
    pub matched_reason: Vec<MatchSource>,

    /// 0 for direct matches, caller hops for graph expansion, `None` when
    /// only retrieval found it
    pub graph_depth: Option<usize>,
}

impl Candidate {
    pub fn matched_by(&self, source: MatchSource) -> bool {
        self.matched_reason.contains(&source)
    }
}
