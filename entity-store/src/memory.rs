use crate::config::StoreConfig;
use crate::entity::{CodeEntity, file_name, normalize_path, paths_match};
use crate::error::{Result, StoreError};
use crate::lexical::{Bm25Scorer, FIELD_COUNT, IndexedDoc, tokenize};
use crate::store::{EntityStore, ScoredId, StoreSnapshot, sort_scored};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard};

const SNAPSHOT_VERSION: u32 = 1;

type KeyIndex = HashMap<String, BTreeSet<String>>;

struct StoredEntity {
    entity: CodeEntity,
    doc: IndexedDoc,
}

impl StoredEntity {
    fn new(entity: CodeEntity) -> Self {
        let doc = IndexedDoc::from_entity(&entity);
        Self { entity, doc }
    }
}

/// One independently locked partition of the store
#[derive(Default)]
struct Shard {
    entities: HashMap<String, StoredEntity>,
    /// term -> ids containing the term in any field
    postings: KeyIndex,
    by_file_name: KeyIndex,
    /// `name` and `full_name` -> ids
    by_name: KeyIndex,
    length_totals: [u64; FIELD_COUNT],
}

impl Shard {
    fn insert(&mut self, stored: StoredEntity) {
        let id = stored.entity.id.clone();
        self.remove(&id);

        for term in stored.doc.terms() {
            link(&mut self.postings, term, &id);
        }
        link(&mut self.by_file_name, file_name(&stored.entity.file_path), &id);
        link(&mut self.by_name, &stored.entity.name, &id);
        link(&mut self.by_name, &stored.entity.full_name, &id);
        for (total, len) in self.length_totals.iter_mut().zip(stored.doc.lengths()) {
            *total += u64::from(len);
        }

        self.entities.insert(id, stored);
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(stored) = self.entities.remove(id) else {
            return false;
        };

        for term in stored.doc.terms() {
            unlink(&mut self.postings, term, id);
        }
        unlink(&mut self.by_file_name, file_name(&stored.entity.file_path), id);
        unlink(&mut self.by_name, &stored.entity.name, id);
        unlink(&mut self.by_name, &stored.entity.full_name, id);
        for (total, len) in self.length_totals.iter_mut().zip(stored.doc.lengths()) {
            *total = total.saturating_sub(u64::from(len));
        }

        true
    }

    fn lookup<'a>(&'a self, index: &'a KeyIndex, key: &str) -> impl Iterator<Item = &'a CodeEntity> {
        index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id))
            .map(|stored| &stored.entity)
    }
}

fn link(index: &mut KeyIndex, key: &str, id: &str) {
    index
        .entry(key.to_string())
        .or_default()
        .insert(id.to_string());
}

fn unlink(index: &mut KeyIndex, key: &str, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedStore {
    version: u32,
    generation: u64,
    entities: Vec<CodeEntity>,
}

/// In-process sharded entity store.
///
/// Entities are partitioned by a stable hash of their id. A write batch is
/// validated up front, then applied one shard at a time with each shard's
/// portion under a single write lock. `snapshot` takes the commit lock
/// exclusively, so it observes either none or all of every in-flight batch.
pub struct MemoryEntityStore {
    config: StoreConfig,
    shards: Vec<RwLock<Shard>>,
    /// Shared by writers, exclusive for snapshots
    commit: RwLock<()>,
    generation: AtomicU64,
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntityStore {
    /// Create an empty store with the default configuration
    pub fn new() -> Self {
        Self::build(StoreConfig::default())
    }

    /// Create an empty store with a custom configuration
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        Ok(Self::build(config))
    }

    fn build(config: StoreConfig) -> Self {
        let shards = (0..config.shard_count)
            .map(|_| RwLock::new(Shard::default()))
            .collect();
        Self {
            config,
            shards,
            commit: RwLock::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Open the snapshot at `path` if it exists, otherwise start empty
    pub async fn open(path: &Path, config: StoreConfig) -> Result<Self> {
        if tokio::fs::try_exists(path).await? {
            Self::load(path, config).await
        } else {
            debug!("No entity snapshot at {}, starting empty", path.display());
            Self::with_config(config)
        }
    }

    /// Restore a store from a JSON snapshot written by [`Self::save`]
    pub async fn load(path: &Path, config: StoreConfig) -> Result<Self> {
        let store = Self::with_config(config)?;

        let content = tokio::fs::read(path).await?;
        let persisted: PersistedStore = serde_json::from_slice(&content)?;
        if persisted.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: persisted.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let count = store.upsert(persisted.entities).await?;
        store
            .generation
            .store(persisted.generation, Ordering::SeqCst);

        info!(
            "Loaded {count} entities from {} (generation {})",
            path.display(),
            persisted.generation
        );
        Ok(store)
    }

    /// Persist a consistent snapshot as JSON, replacing `path` atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await?;
        let count = snapshot.entities.len();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let persisted = PersistedStore {
            version: SNAPSHOT_VERSION,
            generation: snapshot.generation,
            entities: snapshot.entities,
        };
        let data = serde_json::to_vec(&persisted)?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        info!("Saved {count} entities to {}", path.display());
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn shard_index(&self, id: &str) -> usize {
        // FNV-1a: stable across runs and platforms
        let hash = id.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        });
        (hash % self.shards.len() as u64) as usize
    }

    async fn read_all(&self) -> Vec<RwLockReadGuard<'_, Shard>> {
        let mut guards = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            guards.push(shard.read().await);
        }
        guards
    }

    fn partition<T>(&self, items: impl IntoIterator<Item = (String, T)>) -> Vec<Vec<T>> {
        let mut partitions: Vec<Vec<T>> = (0..self.shards.len()).map(|_| Vec::new()).collect();
        for (id, item) in items {
            partitions[self.shard_index(&id)].push(item);
        }
        partitions
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn upsert(&self, entities: Vec<CodeEntity>) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut validated = Vec::with_capacity(entities.len());
        for mut entity in entities {
            entity.file_path = normalize_path(&entity.file_path);
            entity
                .validate(self.config.embedding_dim)
                .map_err(|reason| StoreError::InvalidEntity {
                    id: entity.id.clone(),
                    reason,
                })?;
            validated.push(entity);
        }

        let count = validated.len();
        let partitions = self.partition(
            validated
                .into_iter()
                .map(|entity| (entity.id.clone(), StoredEntity::new(entity))),
        );

        let _commit = self.commit.read().await;
        for (shard, batch) in self.shards.iter().zip(partitions) {
            if batch.is_empty() {
                continue;
            }
            let mut shard = shard.write().await;
            for stored in batch {
                shard.insert(stored);
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        debug!("Upserted {count} entities (generation {generation})");
        Ok(count)
    }

    async fn get(&self, id: &str) -> Result<Option<CodeEntity>> {
        let shard = self.shards[self.shard_index(id)].read().await;
        Ok(shard.entities.get(id).map(|stored| stored.entity.clone()))
    }

    async fn remove(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let partitions = self.partition(ids.iter().map(|id| (id.clone(), id.as_str())));

        let _commit = self.commit.read().await;
        let mut removed = 0;
        for (shard, batch) in self.shards.iter().zip(partitions) {
            if batch.is_empty() {
                continue;
            }
            let mut shard = shard.write().await;
            removed += batch.into_iter().filter(|id| shard.remove(id)).count();
        }
        if removed > 0 {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        debug!("Removed {removed} of {} requested entities", ids.len());
        Ok(removed)
    }

    async fn search_lexical(&self, query: &str, top_k: usize) -> Result<Vec<ScoredId>> {
        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let shards = self.read_all().await;
        let doc_count: usize = shards.iter().map(|shard| shard.entities.len()).sum();
        if doc_count == 0 {
            return Ok(Vec::new());
        }

        let mut length_totals = [0_u64; FIELD_COUNT];
        for shard in &shards {
            for (total, shard_total) in length_totals.iter_mut().zip(shard.length_totals) {
                *total += shard_total;
            }
        }
        let scorer = Bm25Scorer::new(
            self.config.bm25,
            self.config.field_weights,
            length_totals,
            doc_count,
        );

        // Terms are visited in sorted order so per-document float sums are reproducible
        let mut scores: HashMap<&str, f32> = HashMap::new();
        for term in &terms {
            let doc_freq: usize = shards
                .iter()
                .filter_map(|shard| shard.postings.get(term))
                .map(BTreeSet::len)
                .sum();
            if doc_freq == 0 {
                continue;
            }
            let idf = scorer.idf(doc_freq);

            for shard in &shards {
                let Some(ids) = shard.postings.get(term) else {
                    continue;
                };
                for id in ids {
                    if let Some(stored) = shard.entities.get(id) {
                        *scores.entry(id.as_str()).or_insert(0.0) +=
                            scorer.term_score(idf, &stored.doc, term);
                    }
                }
            }
        }

        let mut hits: Vec<ScoredId> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(id, score)| ScoredId::new(id, score))
            .collect();
        sort_scored(&mut hits);
        hits.truncate(top_k);

        debug!("Lexical search for '{query}' matched {} entities", hits.len());
        Ok(hits)
    }

    async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredId>> {
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.config.embedding_dim.filter(|dim| *dim != query.len()) {
            warn!(
                "Query vector has {} dimensions, store expects {dim}; skipping vector search",
                query.len()
            );
            return Ok(Vec::new());
        }
        if magnitude(query) == 0.0 {
            debug!("Zero-norm query vector, skipping vector search");
            return Ok(Vec::new());
        }

        let shards = self.read_all().await;
        let mut hits: Vec<ScoredId> = shards
            .iter()
            .flat_map(|shard| shard.entities.values())
            .filter_map(|stored| {
                let embedding = stored.entity.embedding.as_ref()?;
                (embedding.len() == query.len()).then(|| {
                    ScoredId::new(
                        stored.entity.id.as_str(),
                        cosine_similarity(query, embedding),
                    )
                })
            })
            .collect();
        sort_scored(&mut hits);
        hits.truncate(top_k);

        debug!("Vector search returned {} entities", hits.len());
        Ok(hits)
    }

    async fn find_by_location(&self, file_path: &str, line: usize) -> Result<Vec<CodeEntity>> {
        let key = file_name(file_path);
        let shards = self.read_all().await;

        let mut matches: Vec<CodeEntity> = shards
            .iter()
            .flat_map(|shard| shard.lookup(&shard.by_file_name, key))
            .filter(|entity| entity.contains_line(line) && paths_match(&entity.file_path, file_path))
            .cloned()
            .collect();

        // Narrowest span first; for equal spans the innermost (latest start) wins
        matches.sort_by(|a, b| {
            a.span_len()
                .cmp(&b.span_len())
                .then_with(|| b.start_line.cmp(&a.start_line))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matches)
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<CodeEntity>> {
        let shards = self.read_all().await;
        let mut matches: Vec<CodeEntity> = shards
            .iter()
            .flat_map(|shard| shard.lookup(&shard.by_name, name))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn find_by_file(&self, file_path: &str) -> Result<Vec<CodeEntity>> {
        let normalized = normalize_path(file_path);
        let key = file_name(&normalized);
        let shards = self.read_all().await;
        let mut matches: Vec<CodeEntity> = shards
            .iter()
            .flat_map(|shard| shard.lookup(&shard.by_file_name, key))
            .filter(|entity| entity.file_path == normalized)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let _commit = self.commit.write().await;
        let shards = self.read_all().await;

        let mut entities: Vec<CodeEntity> = shards
            .iter()
            .flat_map(|shard| shard.entities.values())
            .map(|stored| stored.entity.clone())
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(StoreSnapshot {
            generation: self.generation.load(Ordering::SeqCst),
            entities,
        })
    }

    async fn count(&self) -> Result<usize> {
        let shards = self.read_all().await;
        Ok(shards.iter().map(|shard| shard.entities.len()).sum())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
