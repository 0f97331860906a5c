use crate::candidate::{Candidate, MatchSource, ScoreBreakdown};
use crate::config::FusionConfig;
use faultline_call_graph::Expansion;
use faultline_retrieval::{RetrievalSource, RetrievedHit};
use log::debug;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Entities one stack frame points at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMatches {
    /// Entities whose span contains the frame's line
    pub located: BTreeSet<String>,

    /// Entities whose qualified name equals the frame's method. Ids also in
    /// `located` count as located.
    pub named: BTreeSet<String>,
}

impl FrameMatches {
    pub fn located(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            located: ids.into_iter().map(Into::into).collect(),
            named: BTreeSet::new(),
        }
    }

    pub fn named(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            located: BTreeSet::new(),
            named: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Every matched id once, located first
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.located
            .iter()
            .chain(self.named.difference(&self.located))
    }

    pub fn is_empty(&self) -> bool {
        self.located.is_empty() && self.named.is_empty()
    }
}

/// Evidence gathered for one request, ready to be fused
#[derive(Debug, Clone, Default)]
pub struct FusionInput {
    /// Direct matches, one entry per stack frame
    pub direct: Vec<FrameMatches>,

    /// Callers reached from the direct matches
    pub expanded: Vec<Expansion>,

    /// Hybrid retrieval hits with normalized scores
    pub retrieved: Vec<RetrievedHit>,
}

#[derive(Debug, Default)]
struct ScoreAccumulator {
    direct_frames: usize,
    direct_score: f32,
    expansion_depth: Option<usize>,
    lexical: Option<f32>,
    vector: Option<f32>,
}

impl ScoreAccumulator {
    fn graph_depth(&self) -> Option<usize> {
        if self.direct_frames > 0 {
            Some(0)
        } else {
            self.expansion_depth
        }
    }
}

/// Merges direct, graph and retrieval evidence into ranked candidates
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Sum per-source scores by entity id, rank, and keep the best `top_k`.
    ///
    /// Ordering is composite score descending, then shallower graph depth
    /// (retrieval-only candidates count as deepest), then entity id.
    pub fn fuse(&self, input: FusionInput, top_k: usize) -> Vec<Candidate> {
        debug!(
            "Fusing {} direct frames, {} expanded, {} retrieved",
            input.direct.len(),
            input.expanded.len(),
            input.retrieved.len()
        );

        let mut accumulators: BTreeMap<String, ScoreAccumulator> = BTreeMap::new();

        for frame in &input.direct {
            for id in &frame.located {
                let acc = accumulators.entry(id.clone()).or_default();
                acc.direct_frames += 1;
                acc.direct_score += self.config.direct_base_score;
            }
            for id in frame.named.difference(&frame.located) {
                let acc = accumulators.entry(id.clone()).or_default();
                acc.direct_frames += 1;
                acc.direct_score += self.config.name_match_score;
            }
        }

        for expansion in input.expanded {
            let acc = accumulators.entry(expansion.id).or_default();
            acc.expansion_depth = Some(
                acc.expansion_depth
                    .map_or(expansion.depth, |depth| depth.min(expansion.depth)),
            );
        }

        for hit in input.retrieved {
            let lexical = hit.found_by(RetrievalSource::Lexical).then_some(hit.lexical);
            let vector = hit.found_by(RetrievalSource::Vector).then_some(hit.vector);
            let acc = accumulators.entry(hit.id).or_default();
            acc.lexical = lexical.or(acc.lexical);
            acc.vector = vector.or(acc.vector);
        }

        let mut candidates: Vec<Candidate> = accumulators
            .into_iter()
            .map(|(entity_id, acc)| self.candidate(entity_id, &acc))
            .collect();

        candidates.sort_by(compare_candidates);
        candidates.truncate(top_k);

        debug!("Fusion produced {} candidates", candidates.len());
        candidates
    }

    fn candidate(&self, entity_id: String, acc: &ScoreAccumulator) -> Candidate {
        let config = &self.config;
        let mut matched_reason = Vec::new();
        let mut breakdown = ScoreBreakdown::default();

        if acc.direct_frames > 0 {
            breakdown.direct = acc.direct_score.min(config.direct_score_cap);
            matched_reason.push(MatchSource::Direct);
        }
        if let Some(depth) = acc.expansion_depth {
            breakdown.graph = config.expansion_base_score / (1 + depth) as f32;
            matched_reason.push(MatchSource::Graph);
        }
        if let Some(lexical) = acc.lexical {
            breakdown.lexical = config.lexical_weight * lexical;
            matched_reason.push(MatchSource::Lexical);
        }
        if let Some(vector) = acc.vector {
            breakdown.vector = config.vector_weight * vector;
            matched_reason.push(MatchSource::Vector);
        }

        Candidate {
            entity_id,
            score: breakdown.total(),
            score_breakdown: breakdown,
            matched_reason,
            graph_depth: acc.graph_depth(),
        }
    }
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.graph_depth, b.graph_depth) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}
