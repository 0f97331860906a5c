use crate::config::RetrievalConfig;
use crate::embedder::QueryEmbedder;
use crate::error::{Result, RetrievalError};
use crate::normalize::min_max_normalize;
use crate::result::{
    DegradedSource, Retrieval, RetrievalQuery, RetrievalSource, RetrievalStats, RetrievedHit,
};
use faultline_entity_store::{EntityStore, ScoredId, StoreError};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// What happened to one retrieval source
enum SourceOutcome {
    /// Disabled, empty pool, query too short, or no vector available
    Skipped,
    Hits(Vec<ScoredId>),
    /// The store call failed
    StoreFailed(StoreError),
    /// Failed before reaching the store
    Failed(String),
}

/// Hybrid retrieval over an [`EntityStore`]: BM25 and vector search run
/// concurrently and are merged on normalized scores.
pub struct HybridRetriever {
    config: RetrievalConfig,
    store: Arc<dyn EntityStore>,
    embedder: Option<Arc<dyn QueryEmbedder>>,
}

impl HybridRetriever {
    pub fn new(config: RetrievalConfig, store: Arc<dyn EntityStore>) -> Result<Self> {
        config.validate().map_err(RetrievalError::InvalidConfig)?;

        Ok(Self {
            config,
            store,
            embedder: None,
        })
    }

    /// Embed query text when the caller supplies no vector
    pub fn with_embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Retrieve with the configured candidate pool sizes
    pub async fn search(&self, query: &RetrievalQuery) -> Result<Retrieval> {
        self.retrieve(query, self.config.top_k_lexical, self.config.top_k_vector)
            .await
    }

    /// Run lexical and vector search concurrently and merge by id.
    ///
    /// A failing source is logged and reported in [`Retrieval::degraded`];
    /// the other source still contributes. Fails with
    /// [`RetrievalError::Store`] only when no source answered and at least
    /// one of them failed at the store.
    pub async fn retrieve(
        &self,
        query: &RetrievalQuery,
        top_k_lexical: usize,
        top_k_vector: usize,
    ) -> Result<Retrieval> {
        let start = Instant::now();
        debug!("Hybrid retrieval for: '{}'", query.text);

        let lexical = async {
            let started = Instant::now();
            let outcome = self.lexical(query, top_k_lexical).await;
            (outcome, started.elapsed().as_millis() as u64)
        };
        let vector = async {
            let started = Instant::now();
            let outcome = self.vector(query, top_k_vector).await;
            (outcome, started.elapsed().as_millis() as u64)
        };
        let ((lexical, lexical_time_ms), (vector, vector_time_ms)) = tokio::join!(lexical, vector);

        let mut stats = RetrievalStats {
            lexical_time_ms,
            vector_time_ms,
            ..Default::default()
        };
        let mut degraded = Vec::new();
        let mut store_errors = Vec::new();
        let mut searched = Vec::new();
        let mut lexical_hits = Vec::new();
        let mut vector_hits = Vec::new();

        for (source, outcome, hits) in [
            (RetrievalSource::Lexical, lexical, &mut lexical_hits),
            (RetrievalSource::Vector, vector, &mut vector_hits),
        ] {
            match outcome {
                SourceOutcome::Skipped => {}
                SourceOutcome::Hits(found) => {
                    searched.push(source);
                    *hits = found;
                }
                SourceOutcome::StoreFailed(err) => {
                    warn!("{source} search failed, continuing without it: {err}");
                    degraded.push(DegradedSource {
                        source,
                        reason: err.to_string(),
                    });
                    store_errors.push(err);
                }
                SourceOutcome::Failed(reason) => {
                    warn!("{source} search failed, continuing without it: {reason}");
                    degraded.push(DegradedSource { source, reason });
                }
            }
        }

        if searched.is_empty()
            && let Some(err) = store_errors.into_iter().next()
        {
            return Err(RetrievalError::Store(err));
        }

        stats.lexical_count = lexical_hits.len();
        stats.vector_count = vector_hits.len();
        let hits = merge(lexical_hits, vector_hits);
        stats.total_time_ms = start.elapsed().as_millis() as u64;

        info!(
            "Retrieval completed in {}ms: {} lexical, {} vector, {} merged",
            stats.total_time_ms,
            stats.lexical_count,
            stats.vector_count,
            hits.len()
        );

        Ok(Retrieval {
            hits,
            searched,
            degraded,
            stats,
        })
    }

    /// Sources `query` would run against with the configured pool sizes
    pub fn sources_for(&self, query: &RetrievalQuery) -> Vec<RetrievalSource> {
        let mut sources = Vec::new();
        if self.runs_lexical(query, self.config.top_k_lexical) {
            sources.push(RetrievalSource::Lexical);
        }
        if self.runs_vector(query, self.config.top_k_vector) {
            sources.push(RetrievalSource::Vector);
        }
        sources
    }

    fn runs_lexical(&self, query: &RetrievalQuery, top_k: usize) -> bool {
        self.config.enable_lexical
            && top_k > 0
            && query.text.trim().chars().count() >= self.config.min_query_length
    }

    fn runs_vector(&self, query: &RetrievalQuery, top_k: usize) -> bool {
        self.config.enable_vector
            && top_k > 0
            && (query.vector.is_some()
                || (self.embedder.is_some() && !query.text.trim().is_empty()))
    }

    async fn lexical(&self, query: &RetrievalQuery, top_k: usize) -> SourceOutcome {
        if !self.runs_lexical(query, top_k) {
            debug!("Lexical search skipped for this query");
            return SourceOutcome::Skipped;
        }

        match self.store.search_lexical(query.text.trim(), top_k).await {
            Ok(hits) => SourceOutcome::Hits(hits),
            Err(err) => SourceOutcome::StoreFailed(err),
        }
    }

    async fn vector(&self, query: &RetrievalQuery, top_k: usize) -> SourceOutcome {
        if !self.runs_vector(query, top_k) {
            debug!("Vector search skipped for this query");
            return SourceOutcome::Skipped;
        }

        let embedded;
        let vector = match (&query.vector, &self.embedder) {
            (Some(vector), _) => vector.as_slice(),
            (None, Some(embedder)) => match embedder.embed(query.text.trim()).await {
                Ok(vector) => {
                    embedded = vector;
                    embedded.as_slice()
                }
                Err(err) => return SourceOutcome::Failed(err.to_string()),
            },
            (None, None) => return SourceOutcome::Skipped,
        };

        match self.store.search_vector(vector, top_k).await {
            Ok(hits) => SourceOutcome::Hits(hits),
            Err(err) => SourceOutcome::StoreFailed(err),
        }
    }
}

/// Normalize each list independently, then merge by id ordered by
/// `lexical + vector` descending and id ascending
fn merge(mut lexical: Vec<ScoredId>, mut vector: Vec<ScoredId>) -> Vec<RetrievedHit> {
    min_max_normalize(&mut lexical);
    min_max_normalize(&mut vector);

    let mut merged: BTreeMap<String, RetrievedHit> = BTreeMap::new();
    for (rank, hit) in lexical.into_iter().enumerate() {
        let entry = merged
            .entry(hit.id.clone())
            .or_insert_with(|| RetrievedHit::new(hit.id));
        if entry.lexical_rank.is_none() {
            entry.lexical = hit.score;
            entry.lexical_rank = Some(rank);
        }
    }
    for (rank, hit) in vector.into_iter().enumerate() {
        let entry = merged
            .entry(hit.id.clone())
            .or_insert_with(|| RetrievedHit::new(hit.id));
        if entry.vector_rank.is_none() {
            entry.vector = hit.score;
            entry.vector_rank = Some(rank);
        }
    }

    let mut hits: Vec<RetrievedHit> = merged.into_values().collect();
    hits.sort_by(|a, b| {
        b.combined()
            .total_cmp(&a.combined())
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}
