use faultline_indexer::IndexerConfig;
use faultline_retrieval::RetrievalConfig;
use serde::{Deserialize, Serialize};

/// Score weights for merging direct, graph and retrieval evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Score added per stack frame that directly matches an entity
    #[serde(default = "default_direct_base_score")]
    pub direct_base_score: f32,

    /// Score added per stack frame that names an entity without its span
    /// containing the frame's line
    #[serde(default = "default_name_match_score")]
    pub name_match_score: f32,

    /// Upper bound on the summed direct score of one entity
    #[serde(default = "default_direct_score_cap")]
    pub direct_score_cap: f32,

    /// Graph score at depth `d` is `expansion_base_score / (1 + d)`
    #[serde(default = "default_expansion_base_score")]
    pub expansion_base_score: f32,

    /// Weight of the normalized lexical score
    #[serde(default = "default_half")]
    pub lexical_weight: f32,

    /// Weight of the normalized vector score
    #[serde(default = "default_half")]
    pub vector_weight: f32,

    /// Number of candidates returned when the request does not say
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_direct_base_score() -> f32 {
    1.0
}

fn default_name_match_score() -> f32 {
    0.9
}

fn default_direct_score_cap() -> f32 {
    3.0
}

fn default_expansion_base_score() -> f32 {
    0.7
}

fn default_half() -> f32 {
    0.5
}

fn default_top_k() -> usize {
    20
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            direct_base_score: default_direct_base_score(),
            name_match_score: default_name_match_score(),
            direct_score_cap: default_direct_score_cap(),
            expansion_base_score: default_expansion_base_score(),
            lexical_weight: default_half(),
            vector_weight: default_half(),
            top_k: default_top_k(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("direct_base_score", self.direct_base_score),
            ("name_match_score", self.name_match_score),
            ("direct_score_cap", self.direct_score_cap),
            ("expansion_base_score", self.expansion_base_score),
            ("lexical_weight", self.lexical_weight),
            ("vector_weight", self.vector_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a finite non-negative number"));
            }
        }

        if self.direct_score_cap < self.direct_base_score {
            return Err("direct_score_cap must be >= direct_base_score".to_string());
        }

        if self.name_match_score > self.direct_base_score {
            return Err("name_match_score must be <= direct_base_score".to_string());
        }

        if self.top_k == 0 {
            return Err("top_k must be > 0".to_string());
        }

        Ok(())
    }
}

/// Bounds on call-graph expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Caller hops followed from the direct matches
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Callers followed per node, in id order
    #[serde(default = "default_max_fanin")]
    pub max_fanin: usize,
}

fn default_max_depth() -> usize {
    2
}

fn default_max_fanin() -> usize {
    10
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_fanin: default_max_fanin(),
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth > 0 && self.max_fanin == 0 {
            return Err("max_fanin must be > 0 when max_depth > 0".to_string());
        }
        Ok(())
    }
}

/// Everything a [`crate::FaultLocalizer`] needs besides its store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizerConfig {
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

/// Result cache for repeated requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enable_cache")]
    pub enabled: bool,

    /// Maximum cached requests
    #[serde(default = "default_cache_size")]
    pub size: usize,
}

fn default_enable_cache() -> bool {
    true
}

fn default_cache_size() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enable_cache(),
            size: default_cache_size(),
        }
    }
}

impl LocalizerConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.indexer.validate()?;
        self.retrieval.validate()?;
        self.fusion.validate()?;
        self.graph.validate()?;

        if self.cache.enabled && self.cache.size == 0 {
            return Err("cache size must be > 0 when the cache is enabled".to_string());
        }

        Ok(())
    }

    /// Favor the failure site: shallow expansion, few candidates
    pub fn precise() -> Self {
        Self {
            fusion: FusionConfig {
                top_k: 10,
                ..Default::default()
            },
            graph: GraphConfig {
                max_depth: 1,
                max_fanin: 5,
            },
            ..Default::default()
        }
    }

    /// Cast a wide net: deep expansion, large retrieval pools
    pub fn broad() -> Self {
        Self {
            retrieval: RetrievalConfig::accurate(),
            fusion: FusionConfig {
                top_k: 50,
                ..Default::default()
            },
            graph: GraphConfig {
                max_depth: 4,
                max_fanin: 25,
            },
            ..Default::default()
        }
    }
}
