use crate::candidate::{Candidate, MatchSource};
use crate::config::LocalizerConfig;
use crate::error::{LocalizeError, Result};
use crate::frame::StackFrame;
use crate::fusion::{FrameMatches, FusionEngine, FusionInput};
use crate::request::LocalizeRequest;
use crate::result::{Degradation, LocalizeStats, Localization};
use faultline_call_graph::{BuildStats, CallGraph, Expansion};
use faultline_entity_store::{EntityStore, StoreError, paths_match};
use faultline_indexer::{EntityParser, IndexReport, Indexer, ProgressCallback};
use faultline_retrieval::{HybridRetriever, QueryEmbedder, RetrievalError, RetrievalQuery};
use futures::future::join_all;
use log::{debug, info, warn};
use lru::LruCache;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Store and graph generations a cached result was computed against
type Epoch = (u64, u64);

struct ResultCache {
    epoch: Epoch,
    entries: LruCache<String, Localization>,
}

impl ResultCache {
    fn sync(&mut self, epoch: Epoch) {
        if self.epoch != epoch {
            if !self.entries.is_empty() {
                debug!(
                    "Dropping {} cached results from generation {:?}",
                    self.entries.len(),
                    self.epoch
                );
            }
            self.entries.clear();
            self.epoch = epoch;
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
}

#[derive(Default)]
struct FrameLookup {
    matches: FrameMatches,
    answered: usize,
    errors: Vec<StoreError>,
}

/// Direct matches per frame and the callers reached from them
#[derive(Default)]
struct Evidence {
    direct: Vec<FrameMatches>,
    expanded: Vec<Expansion>,
    answered: usize,
    errors: Vec<StoreError>,
}

/// Entry point: indexes a source tree and localizes failures against it.
///
/// The call graph is rebuilt from a consistent store snapshot after each
/// [`index`](Self::index) run and swapped in whole, so queries always expand
/// over a graph from a single store generation.
pub struct FaultLocalizer {
    config: LocalizerConfig,
    store: Arc<dyn EntityStore>,
    indexer: Indexer,
    retriever: HybridRetriever,
    fusion: FusionEngine,
    graph: RwLock<Arc<CallGraph>>,
    cache: Option<Mutex<ResultCache>>,
}

impl FaultLocalizer {
    /// Create a localizer over `store` and build the call graph from what it
    /// already holds
    pub async fn new(config: LocalizerConfig, store: Arc<dyn EntityStore>) -> Result<Self> {
        config.validate().map_err(LocalizeError::InvalidConfig)?;

        info!("Initializing fault localizer");

        let indexer = Indexer::new(config.indexer.clone(), store.clone())?;
        let retriever = HybridRetriever::new(config.retrieval.clone(), store.clone())?;
        let fusion = FusionEngine::new(config.fusion.clone());

        let cache = if config.cache.enabled {
            let capacity = NonZeroUsize::new(config.cache.size).ok_or_else(|| {
                LocalizeError::InvalidConfig("cache size must be > 0".to_string())
            })?;
            Some(Mutex::new(ResultCache {
                epoch: (0, 0),
                entries: LruCache::new(capacity),
            }))
        } else {
            None
        };

        let graph = build_graph(store.as_ref()).await?;

        Ok(Self {
            config,
            store,
            indexer,
            retriever,
            fusion,
            graph: RwLock::new(Arc::new(graph)),
            cache,
        })
    }

    /// Embed free text when a request carries no query vector
    pub fn with_embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.retriever = self.retriever.with_embedder(embedder);
        self
    }

    /// Replace the parser used by [`index`](Self::index)
    pub fn with_parser(mut self, parser: Arc<dyn EntityParser>) -> Self {
        self.indexer = self.indexer.with_parser(parser);
        self
    }

    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// The call graph queries currently expand over
    pub async fn graph(&self) -> Arc<CallGraph> {
        self.graph.read().await.clone()
    }

    /// Store generation the current call graph was built from
    pub async fn graph_generation(&self) -> u64 {
        self.graph().await.generation()
    }

    /// Index `source_root`, then rebuild the call graph
    pub async fn index(&self, source_root: &Path) -> Result<IndexReport> {
        self.index_with_progress(source_root, None).await
    }

    pub async fn index_with_progress(
        &self,
        source_root: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<IndexReport> {
        let report = self
            .indexer
            .index_with_progress(source_root, progress_callback)
            .await?;
        self.rebuild_graph().await?;
        Ok(report)
    }

    /// Build a new call graph from a store snapshot and swap it in
    pub async fn rebuild_graph(&self) -> Result<BuildStats> {
        let graph = build_graph(self.store.as_ref()).await?;
        let stats = graph.stats();
        info!(
            "Call graph rebuilt at generation {}: {} entities, {} edges, {} unresolved references",
            graph.generation(),
            stats.entities,
            stats.edges,
            stats.unresolved
        );

        *self.graph.write().await = Arc::new(graph);
        Ok(stats)
    }

    /// Ranked candidates for `request`
    pub async fn localize(&self, request: &LocalizeRequest) -> Result<Vec<Candidate>> {
        Ok(self.localize_detailed(request).await?.candidates)
    }

    /// Like [`localize`](Self::localize), with degradation details and timings
    pub async fn localize_detailed(&self, request: &LocalizeRequest) -> Result<Localization> {
        self.run(request, None).await
    }

    /// Localize, abandoning any source still running after `budget`.
    ///
    /// Abandoned sources are listed in [`Localization::timed_out`] and the
    /// candidates are fused from whatever finished.
    pub async fn localize_within(
        &self,
        request: &LocalizeRequest,
        budget: Duration,
    ) -> Result<Localization> {
        self.run(request, Some(budget)).await
    }

    pub async fn cache_stats(&self) -> Option<CacheStats> {
        let cache = self.cache.as_ref()?.lock().await;
        Some(CacheStats {
            size: cache.entries.len(),
            capacity: cache.entries.cap().get(),
        })
    }

    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().await.entries.clear();
            info!("Localization cache cleared");
        }
    }

    async fn run(
        &self,
        request: &LocalizeRequest,
        budget: Option<Duration>,
    ) -> Result<Localization> {
        let start = Instant::now();
        let graph = self.graph().await;
        let epoch = (self.store.generation(), graph.generation());

        let cache_key = self.cache_key(request);
        if let Some(key) = &cache_key
            && let Some(mut cached) = self.cached(key, epoch).await
        {
            debug!("Cache hit for localization request");
            cached.stats.cache_hit = true;
            cached.stats.total_time_ms = start.elapsed().as_millis() as u64;
            return Ok(cached);
        }

        if epoch.0 != epoch.1 {
            debug!(
                "Store generation {} is ahead of call graph generation {}",
                epoch.0, epoch.1
            );
        }

        let query = RetrievalQuery {
            text: request.query_text(),
            vector: request.query_vector.clone(),
        };
        let (evidence, retrieval) = tokio::join!(
            within(budget, timed(self.gather_evidence(&request.frames, &graph))),
            within(budget, timed(self.retriever.search(&query))),
        );

        let mut localization = Localization {
            graph_generation: graph.generation(),
            ..Default::default()
        };
        let mut stats = LocalizeStats::default();
        let mut input = FusionInput::default();
        let mut store_reached = false;
        let mut store_error = None;

        match evidence {
            Some((evidence, elapsed_ms)) => {
                stats.direct_time_ms = elapsed_ms;
                store_reached |= evidence.answered > 0;
                if let Some(err) = evidence.errors.into_iter().next() {
                    warn!("Direct lookups failed, continuing without them: {err}");
                    localization.degraded.push(Degradation {
                        source: MatchSource::Direct,
                        reason: err.to_string(),
                    });
                    store_error.get_or_insert(err);
                }
                stats.direct_count = evidence
                    .direct
                    .iter()
                    .flat_map(FrameMatches::ids)
                    .collect::<HashSet<_>>()
                    .len();
                stats.expanded_count = evidence.expanded.len();
                input.direct = evidence.direct;
                input.expanded = evidence.expanded;
            }
            None => {
                warn!("Direct lookups exceeded the time budget");
                localization
                    .timed_out
                    .extend([MatchSource::Direct, MatchSource::Graph]);
            }
        }

        match retrieval {
            Some((Ok(retrieval), elapsed_ms)) => {
                stats.retrieval_time_ms = elapsed_ms;
                store_reached |= !retrieval.searched.is_empty();
                localization
                    .degraded
                    .extend(retrieval.degraded.into_iter().map(|degraded| Degradation {
                        source: degraded.source.into(),
                        reason: degraded.reason,
                    }));
                stats.retrieved_count = retrieval.hits.len();
                input.retrieved = retrieval.hits;
            }
            Some((Err(err), elapsed_ms)) => {
                stats.retrieval_time_ms = elapsed_ms;
                warn!("Retrieval failed, continuing without it: {err}");
                for source in self.retriever.sources_for(&query) {
                    localization.degraded.push(Degradation {
                        source: source.into(),
                        reason: err.to_string(),
                    });
                }
                if let RetrievalError::Store(err) = err {
                    store_error.get_or_insert(err);
                }
            }
            None => {
                warn!("Retrieval exceeded the time budget");
                localization.timed_out.extend(
                    self.retriever
                        .sources_for(&query)
                        .into_iter()
                        .map(MatchSource::from),
                );
            }
        }

        // Fatal only when nothing that touched the store got an answer
        if !store_reached && let Some(err) = store_error {
            return Err(LocalizeError::Store(err));
        }

        let top_k = request.top_k.unwrap_or(self.config.fusion.top_k);
        let fusion_start = Instant::now();
        localization.candidates = self.fusion.fuse(input, top_k);
        stats.fusion_time_ms = fusion_start.elapsed().as_millis() as u64;
        stats.total_time_ms = start.elapsed().as_millis() as u64;
        localization.stats = stats;

        info!(
            "Localization completed in {}ms, returned {} candidates",
            localization.stats.total_time_ms,
            localization.candidates.len()
        );

        if localization.is_complete()
            && let Some(key) = cache_key
        {
            self.remember(key, epoch, &localization).await;
        }

        Ok(localization)
    }

    async fn gather_evidence(&self, frames: &[StackFrame], graph: &CallGraph) -> Evidence {
        let mut evidence = Evidence::default();
        if frames.is_empty() {
            return evidence;
        }

        let lookups = join_all(frames.iter().map(|frame| self.frame_matches(frame))).await;
        for lookup in lookups {
            evidence.answered += lookup.answered;
            evidence.errors.extend(lookup.errors);
            evidence.direct.push(lookup.matches);
        }

        let seeds: BTreeSet<&str> = evidence
            .direct
            .iter()
            .flat_map(FrameMatches::ids)
            .map(String::as_str)
            .collect();
        evidence.expanded = graph.expand(
            seeds.iter().copied(),
            self.config.graph.max_depth,
            self.config.graph.max_fanin,
        );
        evidence
    }

    /// Entities one frame points at.
    ///
    /// Located: the narrowest entity containing the frame's line in each
    /// matching file. Named: entities in the frame's file whose `full_name`
    /// equals the frame's method or package-qualified method. Name matches
    /// from other files are kept only when the frame's file yielded nothing.
    async fn frame_matches(&self, frame: &StackFrame) -> FrameLookup {
        let mut lookup = FrameLookup::default();

        match self
            .store
            .find_by_location(&frame.file_path, frame.line_number)
            .await
        {
            Ok(entities) => {
                lookup.answered += 1;
                let mut files = HashSet::new();
                for entity in entities {
                    // Narrowest first, so the first entity per file wins
                    if files.insert(entity.file_path.clone()) {
                        lookup.matches.located.insert(entity.id);
                    }
                }
            }
            Err(err) => lookup.errors.push(err),
        }

        let mut elsewhere = BTreeSet::new();
        let names = std::iter::once(frame.full_method()).chain(frame.qualified_method());
        for name in names {
            match self.store.find_by_name(&name).await {
                Ok(entities) => {
                    lookup.answered += 1;
                    for entity in entities.into_iter().filter(|e| e.full_name == name) {
                        if paths_match(&entity.file_path, &frame.file_path) {
                            lookup.matches.named.insert(entity.id);
                        } else {
                            elsewhere.insert(entity.id);
                        }
                    }
                }
                Err(err) => lookup.errors.push(err),
            }
        }

        if lookup.matches.is_empty() {
            lookup.matches.named = elsewhere;
        }
        lookup
    }

    fn cache_key(&self, request: &LocalizeRequest) -> Option<String> {
        self.cache.as_ref()?;
        match serde_json::to_string(request) {
            Ok(key) => Some(key),
            Err(err) => {
                debug!("Request not cacheable: {err}");
                None
            }
        }
    }

    async fn cached(&self, key: &str, epoch: Epoch) -> Option<Localization> {
        let mut cache = self.cache.as_ref()?.lock().await;
        cache.sync(epoch);
        cache.entries.get(key).cloned()
    }

    async fn remember(&self, key: String, epoch: Epoch, localization: &Localization) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().await;
            cache.sync(epoch);
            cache.entries.put(key, localization.clone());
        }
    }
}

async fn build_graph(store: &dyn EntityStore) -> Result<CallGraph> {
    let snapshot = store.snapshot().await?;
    Ok(CallGraph::build(&snapshot.entities, snapshot.generation))
}

async fn timed<F: Future>(future: F) -> (F::Output, u64) {
    let start = Instant::now();
    let output = future.await;
    (output, start.elapsed().as_millis() as u64)
}

async fn within<F: Future>(budget: Option<Duration>, future: F) -> Option<F::Output> {
    match budget {
        Some(budget) => tokio::time::timeout(budget, future).await.ok(),
        None => Some(future.await),
    }
}
