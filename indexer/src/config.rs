use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for entity indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directory holding `index-state.json`. Without one, state lives only
    /// as long as the indexer.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,

    /// Files processed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum files parsed and stored at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Directory names skipped during discovery, in addition to gitignore rules
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// Skip files whose content hash is unchanged since the last run
    #[serde(default = "default_true")]
    pub incremental: bool,
}

fn default_batch_size() -> usize {
    100
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        ".faultline",
        "node_modules",
        "target",
        "dist",
        "build",
        "__pycache__",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            ignore_dirs: default_ignore_dirs(),
            incremental: true,
        }
    }
}

impl IndexerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("Batch size must be > 0".to_string());
        }

        if self.max_concurrent == 0 {
            return Err("Max concurrent must be > 0".to_string());
        }

        if self.ignore_dirs.iter().any(|dir| dir.contains(['/', '\\'])) {
            return Err("Ignore dirs must be plain directory names".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = IndexerConfig::default();
        assert!(config.incremental);
        assert!(config.batch_size > 0);
        assert!(config.max_concurrent > 0);
        assert!(config.ignore_dirs.contains(&".git".to_string()));
        assert_eq!(config.index_dir, None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = IndexerConfig::default();
        assert!(config.validate().is_ok());

        config.batch_size = 0;
        assert!(config.validate().is_err());

        let config = IndexerConfig {
            ignore_dirs: vec!["vendor/lib".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
