use serde::{Deserialize, Serialize};

/// Relative weight of each indexed text field in lexical scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    #[serde(default = "default_name_weight")]
    pub name: f32,

    #[serde(default = "default_name_weight")]
    pub full_name: f32,

    #[serde(default = "default_signature_weight")]
    pub signature: f32,

    #[serde(default = "default_body_weight")]
    pub body: f32,
}

fn default_name_weight() -> f32 {
    3.0
}

fn default_signature_weight() -> f32 {
    1.5
}

fn default_body_weight() -> f32 {
    1.0
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            name: default_name_weight(),
            full_name: default_name_weight(),
            signature: default_signature_weight(),
            body: default_body_weight(),
        }
    }
}

impl FieldWeights {
    pub(crate) fn as_array(&self) -> [f32; 4] {
        [self.name, self.full_name, self.signature, self.body]
    }
}

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f32,

    /// Length normalization (0 = none, 1 = full)
    #[serde(default = "default_b")]
    pub b: f32,
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

/// Configuration for the entity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of independently locked shards
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Embedding dimensionality for this deployment. `None` accepts any
    /// length; vector search then skips entities whose length differs from
    /// the query.
    #[serde(default)]
    pub embedding_dim: Option<usize>,

    #[serde(default)]
    pub field_weights: FieldWeights,

    #[serde(default)]
    pub bm25: Bm25Params,
}

fn default_shard_count() -> usize {
    16
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            embedding_dim: None,
            field_weights: FieldWeights::default(),
            bm25: Bm25Params::default(),
        }
    }
}

impl StoreConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.shard_count == 0 {
            return Err("shard_count must be > 0".to_string());
        }

        if self.embedding_dim == Some(0) {
            return Err("embedding_dim must be > 0 when set".to_string());
        }

        let weights = self.field_weights.as_array();
        if weights.iter().any(|w| *w < 0.0) {
            return Err(format!("field weights must be >= 0, got {weights:?}"));
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err("at least one field weight must be > 0".to_string());
        }

        if self.bm25.k1 < 0.0 {
            return Err(format!("bm25.k1 must be >= 0, got {}", self.bm25.k1));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(format!("bm25.b must be in [0.0, 1.0], got {}", self.bm25.b));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.field_weights.name, 3.0);
        assert_eq!(config.bm25.k1, 1.2);
    }

    #[test]
    fn test_invalid_configs() {
        let config = StoreConfig {
            shard_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig {
            bm25: Bm25Params { k1: 1.2, b: 1.5 },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig {
            field_weights: FieldWeights {
                name: 0.0,
                full_name: 0.0,
                signature: 0.0,
                body: 0.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"embedding_dim": 768}"#).unwrap();
        assert_eq!(config.embedding_dim, Some(768));
        assert_eq!(config.shard_count, 16);
        assert_eq!(config.field_weights, FieldWeights::default());
    }
}
