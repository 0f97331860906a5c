use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// What the last successful run stored for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    /// File path relative to root
    pub path: String,

    /// SHA256 hash of file content
    pub content_hash: String,

    /// Ids of the entities written for this file
    pub entity_ids: Vec<String>,

    /// Index timestamp
    pub indexed_at: SystemTime,
}

/// Index state tracking all indexed files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexState {
    /// Version of the state format
    pub version: u32,

    /// Root directory the paths are relative to
    pub root_dir: PathBuf,

    /// Relative path -> file state
    pub files: BTreeMap<String, FileState>,

    /// Last update timestamp
    pub last_update: Option<SystemTime>,
}

impl Default for IndexState {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

impl IndexState {
    const CURRENT_VERSION: u32 = 1;
    pub const STATE_FILENAME: &'static str = "index-state.json";

    /// Create new index state
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            root_dir,
            files: BTreeMap::new(),
            last_update: None,
        }
    }

    /// Load index state from disk. A missing or outdated state file yields
    /// an empty state.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let state_path = index_dir.join(Self::STATE_FILENAME);

        if !state_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&state_path)?;
        let state: IndexState = serde_json::from_str(&content)?;

        if state.version != Self::CURRENT_VERSION {
            log::warn!(
                "Index state version mismatch: {} vs {}. Rebuilding index.",
                state.version,
                Self::CURRENT_VERSION
            );
            return Ok(Self::default());
        }

        Ok(state)
    }

    /// Save index state to disk
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        fs::create_dir_all(index_dir)?;

        let state_path = index_dir.join(Self::STATE_FILENAME);
        let tmp_path = state_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &state_path)?;

        Ok(())
    }

    /// Stored content hash of `path`, if it was indexed before
    pub fn content_hash(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|file| file.content_hash.as_str())
    }

    /// Record a successful run for `path` and return the ids it no longer
    /// produces
    pub fn update_file(
        &mut self,
        path: &str,
        content_hash: String,
        entity_ids: Vec<String>,
    ) -> Vec<String> {
        let stale = self
            .files
            .get(path)
            .map(|old| {
                old.entity_ids
                    .iter()
                    .filter(|id| !entity_ids.contains(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        self.files.insert(
            path.to_string(),
            FileState {
                path: path.to_string(),
                content_hash,
                entity_ids,
                indexed_at: SystemTime::now(),
            },
        );
        self.last_update = Some(SystemTime::now());

        stale
    }

    /// Forget `path`, returning what was stored for it
    pub fn remove_file(&mut self, path: &str) -> Option<FileState> {
        let removed = self.files.remove(path);
        if removed.is_some() {
            self.last_update = Some(SystemTime::now());
        }
        removed
    }

    /// Tracked files that are not in `present`, which must be sorted
    pub fn missing_files<'a>(&'a self, present: &[String]) -> Vec<&'a str> {
        self.files
            .keys()
            .filter(|path| present.binary_search(*path).is_err())
            .map(String::as_str)
            .collect()
    }

    /// Total entities across tracked files
    pub fn entity_count(&self) -> usize {
        self.files.values().map(|file| file.entity_ids.len()).sum()
    }

    /// Compute SHA256 hash of file content
    pub fn hash_content(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }
}
