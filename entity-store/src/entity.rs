use serde::{Deserialize, Serialize};

/// Kind of code entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Function,
    Method,
    Class,
    Module,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Function => "function",
            EntityType::Method => "method",
            EntityType::Class => "class",
            EntityType::Module => "module",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indexed unit of code with its location, text and optional embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeEntity {
    /// Stable identifier, unique within a store
    pub id: String,

    /// Short display name (`charge`)
    pub name: String,

    /// Qualified name (`PaymentService.charge`)
    pub full_name: String,

    pub entity_type: EntityType,

    /// Path of the containing source file, relative to the indexed root
    pub file_path: String,

    /// Starting line number (1-indexed)
    pub start_line: usize,

    /// Ending line number (1-indexed, inclusive)
    pub end_line: usize,

    #[serde(default)]
    pub signature: String,

    #[serde(default)]
    pub body: String,

    /// Embedding vector supplied by the embedding collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Callee names or ids in source order. Unknown targets are allowed.
    #[serde(default)]
    pub calls: Vec<String>,
}

impl CodeEntity {
    /// Create a new entity with empty text, no embedding and no calls
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        full_name: impl Into<String>,
        entity_type: EntityType,
        file_path: impl Into<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            full_name: full_name.into(),
            entity_type,
            file_path: normalize_path(&file_path.into()),
            start_line,
            end_line,
            signature: String::new(),
            body: String::new(),
            embedding: None,
            calls: Vec::new(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the callee list, dropping repeats while keeping first-seen order
    pub fn with_calls<I, S>(mut self, calls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        self.calls = calls
            .into_iter()
            .map(Into::into)
            .filter(|call: &String| seen.insert(call.clone()))
            .collect();
        self
    }

    /// Number of lines covered by this entity
    pub fn span_len(&self) -> usize {
        if self.end_line >= self.start_line {
            self.end_line - self.start_line + 1
        } else {
            0
        }
    }

    /// Whether `line` falls inside this entity's span
    pub fn contains_line(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    /// Check the structural invariants the store relies on
    pub(crate) fn validate(&self, embedding_dim: Option<usize>) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.file_path.trim().is_empty() {
            return Err("file_path must not be empty".to_string());
        }
        if self.start_line == 0 {
            return Err("start_line is 1-indexed, got 0".to_string());
        }
        if self.start_line > self.end_line {
            return Err(format!(
                "start_line ({}) must not exceed end_line ({})",
                self.start_line, self.end_line
            ));
        }
        match (embedding_dim, &self.embedding) {
            (Some(dim), Some(embedding)) if embedding.len() != dim => Err(format!(
                "embedding has {} dimensions, store expects {dim}",
                embedding.len()
            )),
            _ => Ok(()),
        }
    }
}

/// Normalize a path for comparison: forward slashes, no leading `./`
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut trimmed = replaced.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Final path component
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Whether two paths name the same file, allowing either one to be a suffix
/// of the other at a path-component boundary.
///
/// Stack traces often carry absolute paths (`/srv/app/validator.py`) or bare
/// file names (`Validator.java`) while the index stores root-relative paths.
pub fn paths_match(stored: &str, query: &str) -> bool {
    let stored = normalize_path(stored);
    let query = normalize_path(query);
    if stored.is_empty() || query.is_empty() {
        return false;
    }
    if stored == query {
        return true;
    }
    let is_suffix = |long: &str, short: &str| {
        long.len() > short.len()
            && long.ends_with(short)
            && long.as_bytes()[long.len() - short.len() - 1] == b'/'
    };
    is_suffix(&stored, &query) || is_suffix(&query, &stored)
}
