use faultline_entity_store::{CodeEntity, EntityType, normalize_path};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// File name suffix of entity manifests
pub const MANIFEST_SUFFIX: &str = ".entities.json";

/// Why a single file could not be turned into entities
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("entity '{name}': {reason}")]
    InvalidEntity { name: String, reason: String },

    #[error("unreadable file: {0}")]
    Unreadable(String),
}

/// An entity as reported by an extractor, before it gets an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntity {
    pub name: String,

    /// Qualified name; falls back to `name` when empty
    #[serde(default)]
    pub full_name: String,

    pub entity_type: EntityType,
    pub start_line: usize,
    pub end_line: usize,

    #[serde(default)]
    pub signature: String,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub calls: Vec<String>,
}

impl ParsedEntity {
    fn check(&self) -> Result<(), ParseError> {
        let reason = if self.name.trim().is_empty() {
            "name must not be empty".to_string()
        } else if self.start_line == 0 {
            "start_line is 1-indexed, got 0".to_string()
        } else if self.start_line > self.end_line {
            format!(
                "start_line ({}) must not exceed end_line ({})",
                self.start_line, self.end_line
            )
        } else {
            return Ok(());
        };

        Err(ParseError::InvalidEntity {
            name: self.name.clone(),
            reason,
        })
    }
}

/// Entities extracted from one source file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    /// Root-relative path of the source file the entities live in
    pub file_path: String,
    pub entities: Vec<ParsedEntity>,
}

impl ParsedFile {
    /// Assign stable ids and convert to store entities.
    ///
    /// Fails on the first structurally invalid entity so a file is either
    /// stored whole or recorded as skipped.
    pub fn into_entities(self) -> Result<Vec<CodeEntity>, ParseError> {
        let file_path = normalize_path(&self.file_path);
        let mut occurrences: HashMap<String, usize> = HashMap::new();

        self.entities
            .into_iter()
            .map(|parsed| {
                parsed.check()?;

                let full_name = if parsed.full_name.trim().is_empty() {
                    parsed.name.clone()
                } else {
                    parsed.full_name
                };
                let seen = occurrences.entry(full_name.clone()).or_insert(0);
                let id = entity_id(&file_path, &full_name, *seen);
                *seen += 1;

                let mut entity = CodeEntity::new(
                    id,
                    parsed.name,
                    full_name,
                    parsed.entity_type,
                    file_path.as_str(),
                    parsed.start_line,
                    parsed.end_line,
                )
                .with_signature(parsed.signature)
                .with_body(parsed.body)
                .with_calls(parsed.calls);
                entity.embedding = parsed.embedding;
                Ok(entity)
            })
            .collect()
    }
}

/// Stable entity id: the first 32 hex chars of
/// `sha256(file_path + "::" + full_name)`.
///
/// The n-th repeat of a full name inside one file (overloads, redefinitions)
/// hashes `#n` as well, so ids stay unique and reproducible.
pub fn entity_id(file_path: &str, full_name: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"::");
    hasher.update(full_name.as_bytes());
    if occurrence > 0 {
        hasher.update(format!("#{occurrence}").as_bytes());
    }

    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(32);
    hex
}

/// Turns source files into entities. Implementations must be pure functions
/// of the path and content so re-indexing is idempotent.
pub trait EntityParser: Send + Sync {
    /// Whether discovery should hand `path` to this parser
    fn supports(&self, path: &Path) -> bool;

    fn parse(&self, relative_path: &str, content: &str) -> Result<ParsedFile, ParseError>;
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    file_path: Option<String>,
    entities: Vec<ParsedEntity>,
}

/// Reads `*.entities.json` manifests written by an external extractor:
///
/// ```json
/// {
///   "file_path": "app/validator.py",
///   "entities": [
///     {"name": "validate", "full_name": "Validator.validate", "entity_type": "method",
///      "start_line": 10, "end_line": 24, "calls": ["check_schema"]}
///   ]
/// }
/// ```
///
/// Without `file_path`, the manifest path minus its suffix is used, so
/// `app/validator.py.entities.json` describes `app/validator.py`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestParser;

impl EntityParser for ManifestParser {
    fn supports(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.len() > MANIFEST_SUFFIX.len() && name.ends_with(MANIFEST_SUFFIX))
    }

    fn parse(&self, relative_path: &str, content: &str) -> Result<ParsedFile, ParseError> {
        let manifest: Manifest = serde_json::from_str(content)?;

        let file_path = match manifest.file_path {
            Some(path) if !path.trim().is_empty() => path,
            _ => relative_path
                .strip_suffix(MANIFEST_SUFFIX)
                .unwrap_or(relative_path)
                .to_string(),
        };

        Ok(ParsedFile {
            file_path,
            entities: manifest.entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r#"{
        "file_path": "./app/validator.py",
        "entities": [
            {"name": "Validator", "entity_type": "class", "start_line": 1, "end_line": 40},
            {"name": "validate", "full_name": "Validator.validate", "entity_type": "method",
             "start_line": 10, "end_line": 24, "signature": "def validate(self, data)",
             "calls": ["check_schema", "check_schema", "log"]},
            {"name": "validate", "full_name": "Validator.validate", "entity_type": "method",
             "start_line": 26, "end_line": 30, "embedding": [0.5, 0.5]}
        ]
    }"#;

    #[test]
    fn test_supports_only_manifests() {
        let parser = ManifestParser;
        assert!(parser.supports(Path::new("app/validator.py.entities.json")));
        assert!(!parser.supports(Path::new("app/validator.py")));
        assert!(!parser.supports(Path::new(".entities.json")));
        assert!(!parser.supports(Path::new("entities.json")));
    }

    #[test]
    fn test_parse_manifest() {
        let parsed = ManifestParser
            .parse("manifests/validator.entities.json", MANIFEST)
            .unwrap();
        assert_eq!(parsed.file_path, "./app/validator.py");

        let entities = parsed.into_entities().unwrap();
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].full_name, "Validator");
        assert_eq!(entities[1].file_path, "app/validator.py");
        assert_eq!(entities[1].calls, vec!["check_schema", "log"]);
        assert_eq!(entities[2].embedding, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn test_ids_are_stable_and_unique() {
        let first = ManifestParser
            .parse("m.entities.json", MANIFEST)
            .unwrap()
            .into_entities()
            .unwrap();
        let second = ManifestParser
            .parse("m.entities.json", MANIFEST)
            .unwrap()
            .into_entities()
            .unwrap();

        let ids: Vec<&str> = first.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, second.iter().map(|e| e.id.as_str()).collect::<Vec<_>>());
        assert_eq!(ids[1], entity_id("app/validator.py", "Validator.validate", 0));
        assert_eq!(ids[2], entity_id("app/validator.py", "Validator.validate", 1));
        assert_ne!(ids[1], ids[2]);
        assert_eq!(ids[0].len(), 32);
    }

    #[test]
    fn test_missing_file_path_uses_manifest_path() {
        let parsed = ManifestParser
            .parse(
                "src/pay.py.entities.json",
                r#"{"entities": [{"name": "charge", "entity_type": "function", "start_line": 3, "end_line": 9}]}"#,
            )
            .unwrap();
        assert_eq!(parsed.file_path, "src/pay.py");
    }

    #[test]
    fn test_malformed_manifest() {
        let result = ManifestParser.parse("bad.entities.json", "{ \"entities\": [");
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_invalid_span_rejects_file() {
        let parsed = ManifestParser
            .parse(
                "x.entities.json",
                r#"{"entities": [{"name": "f", "entity_type": "function", "start_line": 9, "end_line": 3}]}"#,
            )
            .unwrap();
        let err = parsed.into_entities().unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }
}
