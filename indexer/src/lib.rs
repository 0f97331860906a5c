/*!
# Faultline Indexer

Bulk, idempotent loading of code entities into an entity store.

## Features

- **Partial-failure tolerant**: a file that fails to parse is reported and skipped
- **Stable ids**: derived from file path and qualified name, so re-runs overwrite in place
- **Incremental indexing**: unchanged files are skipped by content hash
- **Concurrent processing**: batches of files parsed and stored in parallel
- **Pluggable parsing**: entity manifests by default, any [`EntityParser`] otherwise

## Example

```rust,no_run
use faultline_entity_store::MemoryEntityStore;
use faultline_indexer::{Indexer, IndexerConfig};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    let indexer = Indexer::new(IndexerConfig::default(), store)?;
    let report = indexer.index(Path::new("./my-project")).await?;

    println!(
        "Indexed {} files, skipped {}",
        report.indexed_count, report.skipped_count
    );

    Ok(())
}
```
*/

mod config;
mod error;
mod indexer;
mod parser;
mod state;

pub use config::IndexerConfig;
pub use error::{IndexerError, Result};
pub use indexer::{
    IndexError, IndexPhase, IndexProgress, IndexReport, Indexer, ProgressCallback,
};
pub use parser::{
    EntityParser, MANIFEST_SUFFIX, ManifestParser, ParseError, ParsedEntity, ParsedFile,
    entity_id,
};
pub use state::{FileState, IndexState};
