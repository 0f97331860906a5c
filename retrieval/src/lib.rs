/*!
# Faultline Retrieval

Hybrid candidate retrieval for fault localization:
- **Lexical search** via the store's BM25 index over entity names, signatures and bodies
- **Vector search** via cosine similarity over entity embeddings
- **Min-max normalization** so BM25 and cosine scores are comparable before merging

## Architecture

```text
RetrievalQuery {text, vector}
  ├─> Lexical search (BM25)      ─┐
  │                               ├─> normalize each list to [0, 1]
  └─> Vector search (cosine)     ─┘        └─> merge by id
        └─ QueryEmbedder when no vector          └─> RetrievedHit {lexical, vector}
```

Both searches run concurrently. When one fails the other still contributes
and the failure is listed in [`Retrieval::degraded`].

## Example

```rust,no_run
use faultline_entity_store::MemoryEntityStore;
use faultline_retrieval::{HybridRetriever, RetrievalConfig, RetrievalQuery};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    let retriever = HybridRetriever::new(RetrievalConfig::default(), store)?;

    let query = RetrievalQuery::new("NullPointerException in validate");
    let retrieval = retriever.search(&query).await?;
    for hit in &retrieval.hits {
        println!("{} lexical={:.2} vector={:.2}", hit.id, hit.lexical, hit.vector);
    }
    Ok(())
}
```
*/

mod config;
mod embedder;
mod error;
mod normalize;
mod result;
mod retriever;

pub use config::RetrievalConfig;
pub use embedder::QueryEmbedder;
pub use error::{Result, RetrievalError};
pub use normalize::min_max_normalize;
pub use result::{
    DegradedSource, Retrieval, RetrievalQuery, RetrievalSource, RetrievalStats, RetrievedHit,
};
pub use retriever::HybridRetriever;
