//! Shared fixtures for tests that need an entity store with injected
//! failures or latency.

use async_trait::async_trait;
use faultline_entity_store::{
    CodeEntity, EntityStore, EntityType, MemoryEntityStore, Result, ScoredId, StoreError,
    StoreSnapshot,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Operation group a [`FlakyStore`] can fail or slow down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `upsert` and `remove`
    Writes,
    Lexical,
    Vector,
    /// `find_by_location`, `find_by_name`, `find_by_file` and `get`
    Lookups,
}

const FAULT_COUNT: usize = 4;

/// Memory store wrapper that reports [`StoreError::Unavailable`] or sleeps
/// for the operation groups it is told to
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryEntityStore,
    failing: [AtomicBool; FAULT_COUNT],
    delay_ms: [AtomicU64; FAULT_COUNT],
    rejected_name: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryEntityStore) -> Self {
        Self {
            inner,
            failing: Default::default(),
            delay_ms: Default::default(),
            rejected_name: Mutex::new(None),
        }
    }

    pub fn fail(&self, fault: Fault) {
        self.failing[fault as usize].store(true, Ordering::SeqCst);
    }

    pub fn heal(&self, fault: Fault) {
        self.failing[fault as usize].store(false, Ordering::SeqCst);
    }

    pub fn delay(&self, fault: Fault, by: Duration) {
        self.delay_ms[fault as usize].store(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail, without delay, every upsert carrying an entity named `name`
    pub fn reject_name(&self, name: &str) {
        *self
            .rejected_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
    }

    pub fn inner(&self) -> &MemoryEntityStore {
        &self.inner
    }

    async fn check(&self, fault: Fault) -> Result<()> {
        let delay = self.delay_ms[fault as usize].load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing[fault as usize].load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{fault:?} backend unreachable")));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn upsert(&self, entities: Vec<CodeEntity>) -> Result<usize> {
        let rejected = self
            .rejected_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(name) = rejected
            && entities.iter().any(|entity| entity.name == name)
        {
            return Err(StoreError::Unavailable(format!("write of {name} rejected")));
        }
        self.check(Fault::Writes).await?;
        self.inner.upsert(entities).await
    }

    async fn get(&self, id: &str) -> Result<Option<CodeEntity>> {
        self.check(Fault::Lookups).await?;
        self.inner.get(id).await
    }

    async fn remove(&self, ids: &[String]) -> Result<usize> {
        self.check(Fault::Writes).await?;
        self.inner.remove(ids).await
    }

    async fn search_lexical(&self, query: &str, top_k: usize) -> Result<Vec<ScoredId>> {
        self.check(Fault::Lexical).await?;
        self.inner.search_lexical(query, top_k).await
    }

    async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredId>> {
        self.check(Fault::Vector).await?;
        self.inner.search_vector(query, top_k).await
    }

    async fn find_by_location(&self, file_path: &str, line: usize) -> Result<Vec<CodeEntity>> {
        self.check(Fault::Lookups).await?;
        self.inner.find_by_location(file_path, line).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<CodeEntity>> {
        self.check(Fault::Lookups).await?;
        self.inner.find_by_name(name).await
    }

    async fn find_by_file(&self, file_path: &str) -> Result<Vec<CodeEntity>> {
        self.check(Fault::Lookups).await?;
        self.inner.find_by_file(file_path).await
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        self.inner.snapshot().await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    fn generation(&self) -> u64 {
        self.inner.generation()
    }
}

/// A method entity spanning `start..=end`, with a signature derived from its name
pub fn method(
    id: &str,
    full_name: &str,
    file_path: &str,
    start: usize,
    end: usize,
) -> CodeEntity {
    let name = full_name.rsplit('.').next().unwrap_or(full_name);
    CodeEntity::new(id, name, full_name, EntityType::Method, file_path, start, end)
        .with_signature(format!("def {name}(self)"))
}
