use anyhow::{Context, Result};
use faultline_entity_store::StoreConfig;
use faultline_indexer::IndexerConfig;
use faultline_localizer::{CacheConfig, FusionConfig, GraphConfig, LocalizerConfig};
use faultline_retrieval::RetrievalConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the persisted entity snapshot inside the index directory
pub const ENTITIES_FILENAME: &str = "entities.json";

/// Settings read from `--config`. Every table is optional.
///
/// ```toml
/// [store]
/// embedding_dim = 384
///
/// [fusion]
/// top_k = 10
/// lexical_weight = 0.7
///
/// [graph]
/// max_depth = 3
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultlineConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl FaultlineConfig {
    /// Read and validate `path`, or fall back to defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate().map_err(anyhow::Error::msg)?;
        self.localizer_config()
            .validate()
            .map_err(anyhow::Error::msg)?;
        Ok(())
    }

    /// Localizer settings with indexing state kept under `index_dir`
    pub fn localizer_config_for(&self, index_dir: &Path) -> LocalizerConfig {
        let mut config = self.localizer_config();
        config.indexer.index_dir = Some(index_dir.to_path_buf());
        config
    }

    fn localizer_config(&self) -> LocalizerConfig {
        LocalizerConfig {
            indexer: self.indexer.clone(),
            retrieval: self.retrieval.clone(),
            fusion: self.fusion.clone(),
            graph: self.graph.clone(),
            cache: self.cache.clone(),
        }
    }
}
