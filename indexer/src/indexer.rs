use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::parser::{EntityParser, ManifestParser, ParseError};
use crate::state::IndexState;
use faultline_entity_store::{EntityStore, StoreError, normalize_path};
use ignore::WalkBuilder;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Progress callback for indexing operations
pub type ProgressCallback = Arc<dyn Fn(IndexProgress) + Send + Sync>;

/// Indexing progress information
#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPhase {
    Discovering,
    Removing,
    Parsing,
    Complete,
}

/// A file that could not be indexed and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexError {
    pub path: String,
    pub reason: String,
}

/// Outcome of one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Files parsed and stored
    pub indexed_count: usize,
    /// Files that failed to read or parse; one entry each in `errors`
    pub skipped_count: usize,
    /// Files left alone because their content hash matched the last run
    pub unchanged_count: usize,
    /// Stale entities removed from changed or deleted files
    pub removed_count: usize,
    /// Entities written this run
    pub entity_count: usize,
    pub errors: Vec<IndexError>,
    /// Store generation once the run finished
    pub generation: u64,
}

enum FileOutcome {
    Unchanged,
    Indexed {
        content_hash: String,
        entity_ids: Vec<String>,
    },
    Failed {
        reason: String,
    },
}

/// Bulk loader that turns a source tree into store entities.
///
/// Files are processed in batches by tokio tasks, at most
/// `max_concurrent` at a time. Each task reads, parses and upserts its own
/// file, so a bad file costs only itself.
pub struct Indexer {
    config: IndexerConfig,
    store: Arc<dyn EntityStore>,
    parser: Arc<dyn EntityParser>,
    state: Mutex<IndexState>,
}

impl Indexer {
    /// Create an indexer that reads entity manifests
    pub fn new(config: IndexerConfig, store: Arc<dyn EntityStore>) -> Result<Self> {
        config.validate().map_err(IndexerError::InvalidConfig)?;

        let state = match &config.index_dir {
            Some(index_dir) => IndexState::load(index_dir)?,
            None => IndexState::default(),
        };

        Ok(Self {
            config,
            store,
            parser: Arc::new(ManifestParser),
            state: Mutex::new(state),
        })
    }

    /// Replace the parser used for discovered files
    pub fn with_parser(mut self, parser: Arc<dyn EntityParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index every supported file under `source_root`
    pub async fn index(&self, source_root: &Path) -> Result<IndexReport> {
        self.index_with_progress(source_root, None).await
    }

    /// Index with progress reporting. Concurrent runs on one indexer are
    /// serialized.
    pub async fn index_with_progress(
        &self,
        source_root: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<IndexReport> {
        if !source_root.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "Source root is not a directory: {}",
                source_root.display()
            )));
        }
        info!("Starting indexing in {}", source_root.display());

        let mut state = self.state.lock().await;
        if state.root_dir != source_root {
            if !state.files.is_empty() {
                warn!(
                    "Index state belongs to {}, starting fresh for {}",
                    state.root_dir.display(),
                    source_root.display()
                );
            }
            *state = IndexState::new(source_root.to_path_buf());
        } else if !state.files.is_empty() && self.store.count().await? == 0 {
            // State without entities would leave every unchanged file missing
            warn!("Entity store is empty, discarding index state");
            *state = IndexState::new(source_root.to_path_buf());
        }

        let mut report = IndexReport::default();

        report_progress(&progress_callback, IndexPhase::Discovering, 0, 0, None);
        let files = self.discover_files(source_root)?;
        info!("Discovered {} files", files.len());

        // Entities of files that disappeared since the last run
        let present: Vec<String> = files.iter().map(|(relative, _)| relative.clone()).collect();
        let missing: Vec<String> = state
            .missing_files(&present)
            .into_iter()
            .map(String::from)
            .collect();
        for (idx, path) in missing.iter().enumerate() {
            report_progress(
                &progress_callback,
                IndexPhase::Removing,
                idx + 1,
                missing.len(),
                Some(path.clone()),
            );
            if let Some(file_state) = state.remove_file(path) {
                report.removed_count += self.store.remove(&file_state.entity_ids).await?;
            }
        }

        let total = files.len();
        for (batch_idx, batch) in files.chunks(self.config.batch_size).enumerate() {
            debug!(
                "Processing batch {}/{} ({} files)",
                batch_idx + 1,
                total.div_ceil(self.config.batch_size),
                batch.len()
            );
            self.process_batch(
                batch,
                batch_idx * self.config.batch_size,
                total,
                &mut state,
                &mut report,
                &progress_callback,
            )
            .await?;
        }

        if let Some(index_dir) = &self.config.index_dir {
            state.save(index_dir)?;
        }
        drop(state);

        report.generation = self.store.generation();
        report_progress(&progress_callback, IndexPhase::Complete, total, total, None);

        info!(
            "Indexing complete: {} indexed, {} unchanged, {} skipped, {} entities written, {} removed",
            report.indexed_count,
            report.unchanged_count,
            report.skipped_count,
            report.entity_count,
            report.removed_count
        );

        Ok(report)
    }

    /// Process a batch of files concurrently and fold the outcomes into
    /// `report` in file order
    async fn process_batch(
        &self,
        files: &[(String, PathBuf)],
        batch_offset: usize,
        total: usize,
        state: &mut IndexState,
        report: &mut IndexReport,
        progress_callback: &Option<ProgressCallback>,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = Vec::with_capacity(files.len());

        for (idx, (relative, absolute)) in files.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| IndexerError::Task(format!("Semaphore error: {e}")))?;

            let store = self.store.clone();
            let parser = self.parser.clone();
            let relative = relative.clone();
            let absolute = absolute.clone();
            let previous_hash = if self.config.incremental {
                state.content_hash(&relative).map(String::from)
            } else {
                None
            };
            let progress_callback = progress_callback.clone();
            let current = batch_offset + idx + 1;

            tasks.push(tokio::spawn(async move {
                report_progress(
                    &progress_callback,
                    IndexPhase::Parsing,
                    current,
                    total,
                    Some(relative.clone()),
                );
                let outcome = process_file(
                    store.as_ref(),
                    parser.as_ref(),
                    &relative,
                    &absolute,
                    previous_hash,
                )
                .await;
                drop(permit);
                outcome
            }));
        }

        // Drain every task before surfacing an error so no write outlives the batch
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            outcomes.push(task.await);
        }

        for ((relative, _), outcome) in files.iter().zip(outcomes) {
            match outcome?? {
                FileOutcome::Unchanged => report.unchanged_count += 1,
                FileOutcome::Indexed {
                    content_hash,
                    entity_ids,
                } => {
                    report.indexed_count += 1;
                    report.entity_count += entity_ids.len();

                    let stale = state.update_file(relative, content_hash, entity_ids);
                    if !stale.is_empty() {
                        report.removed_count += self.store.remove(&stale).await?;
                    }
                }
                FileOutcome::Failed { reason } => {
                    warn!("Skipping {relative}: {reason}");
                    report.skipped_count += 1;
                    report.errors.push(IndexError {
                        path: relative.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(())
    }

    /// Supported files under `root` as sorted `(relative, absolute)` pairs
    fn discover_files(&self, root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let ignore_dirs: HashSet<String> = self.config.ignore_dirs.iter().cloned().collect();

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && ignore_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
            });

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() || !self.parser.supports(path) {
                continue;
            }

            let relative = path.strip_prefix(root).map_err(|_| {
                IndexerError::InvalidPath(format!(
                    "Path {} is not under root {}",
                    path.display(),
                    root.display()
                ))
            })?;
            files.push((
                normalize_path(&relative.to_string_lossy()),
                path.to_path_buf(),
            ));
        }

        files.sort();
        Ok(files)
    }
}

/// Read, parse and store one file. Only store failures are errors; anything
/// wrong with the file itself becomes [`FileOutcome::Failed`].
async fn process_file(
    store: &dyn EntityStore,
    parser: &dyn EntityParser,
    relative: &str,
    absolute: &Path,
    previous_hash: Option<String>,
) -> Result<FileOutcome> {
    debug!("Processing file: {relative}");

    let content = match tokio::fs::read(absolute).await {
        Ok(content) => content,
        Err(e) => {
            return Ok(FileOutcome::Failed {
                reason: ParseError::Unreadable(e.to_string()).to_string(),
            });
        }
    };

    let content_hash = IndexState::hash_content(&content);
    if previous_hash.as_deref() == Some(content_hash.as_str()) {
        debug!("Unchanged: {relative}");
        return Ok(FileOutcome::Unchanged);
    }

    let Ok(text) = String::from_utf8(content) else {
        return Ok(FileOutcome::Failed {
            reason: ParseError::Unreadable("not valid UTF-8".to_string()).to_string(),
        });
    };

    let entities = match parser
        .parse(relative, &text)
        .and_then(|parsed| parsed.into_entities())
    {
        Ok(entities) => entities,
        Err(e) => {
            return Ok(FileOutcome::Failed {
                reason: e.to_string(),
            });
        }
    };

    let entity_ids: Vec<String> = entities.iter().map(|entity| entity.id.clone()).collect();
    match store.upsert(entities).await {
        Ok(_) => {}
        // The file's content is at fault, not the store
        Err(StoreError::InvalidEntity { id, reason }) => {
            return Ok(FileOutcome::Failed {
                reason: format!("entity {id} rejected: {reason}"),
            });
        }
        Err(e) => return Err(e.into()),
    }

    Ok(FileOutcome::Indexed {
        content_hash,
        entity_ids,
    })
}

fn report_progress(
    callback: &Option<ProgressCallback>,
    phase: IndexPhase,
    current: usize,
    total: usize,
    current_file: Option<String>,
) {
    if let Some(cb) = callback {
        cb(IndexProgress {
            phase,
            current,
            total,
            current_file,
        });
    }
}
