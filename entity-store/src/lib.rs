//! # Faultline Entity Store
//!
//! Keyed storage for indexed code entities (functions, methods, classes,
//! modules) together with the lexical and vector representations used to
//! find them again at query time.
//!
//! ## Features
//!
//! - Upsert semantics keyed by entity id, batched and idempotent
//! - BM25 lexical search over `name`, `full_name`, `signature` and `body`
//!   with per-field weights
//! - Cosine similarity search over entity embeddings
//! - Location lookup: which entities contain `file:line`, narrowest first
//! - Consistent snapshots tagged with a store generation
//!
//! The [`EntityStore`] trait is the seam for alternative backends; the
//! in-process [`MemoryEntityStore`] shards entities behind async locks and can
//! persist itself as a JSON snapshot.
//!
//! ## Example
//!
//! ```no_run
//! use faultline_entity_store::{CodeEntity, EntityStore, EntityType, MemoryEntityStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryEntityStore::new();
//!     let entity = CodeEntity::new("e1", "validate", "Validator.validate", EntityType::Method, "app/validator.py", 10, 24)
//!         .with_signature("def validate(self, data)");
//!     store.upsert(vec![entity]).await?;
//!
//!     let hits = store.search_lexical("validate data", 5).await?;
//!     println!("Found {} entities", hits.len());
//!     Ok(())
//! }
//! ```

mod config;
mod entity;
mod error;
mod lexical;
mod memory;
mod store;

pub use config::{Bm25Params, FieldWeights, StoreConfig};
pub use entity::{CodeEntity, EntityType, file_name, normalize_path, paths_match};
pub use error::{Result, StoreError};
pub use lexical::tokenize;
pub use memory::MemoryEntityStore;
pub use store::{EntityStore, ScoredId, StoreSnapshot};
