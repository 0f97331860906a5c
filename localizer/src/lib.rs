/*!
# Faultline Localizer

Turns a parsed failure signal (stack frames plus free text) into a ranked,
explainable list of code entities that likely caused it.

## Sources

- **Direct**: entities whose span contains a frame's `file:line`, or whose
  `full_name` equals the frame's method
- **Graph**: callers of the direct matches, scored `base / (1 + depth)`
- **Retrieval**: BM25 and vector hits for the free text and frame method names

Scores from all sources are summed per entity, so independent evidence
compounds. Ties fall to the shallower graph depth, then the entity id, which
keeps output identical for identical store state.

## Architecture

```text
LocalizeRequest
  ├─> Direct lookups (store) ──> Caller expansion (call graph)
  └─> Hybrid retrieval (BM25 + vector)
        └─> FusionEngine: sum per entity, rank, truncate
              └─> Vec<Candidate>
```

## Example

```rust,no_run
use faultline_entity_store::MemoryEntityStore;
use faultline_localizer::{FaultLocalizer, LocalizeRequest, LocalizerConfig, StackFrame};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    let localizer = FaultLocalizer::new(LocalizerConfig::default(), store).await?;
    localizer.index(Path::new("./manifests")).await?;

    let request = LocalizeRequest::new("ValueError: missing payload")
        .with_frame(StackFrame::new("app/validator.py", 18, "validate"));
    for candidate in localizer.localize(&request).await? {
        println!("{} {:.2} {:?}", candidate.entity_id, candidate.score, candidate.matched_reason);
    }
    Ok(())
}
```
*/

mod candidate;
mod config;
mod error;
mod frame;
mod fusion;
mod localizer;
mod request;
mod result;

pub use candidate::{Candidate, MatchSource, ScoreBreakdown};
pub use config::{CacheConfig, FusionConfig, GraphConfig, LocalizerConfig};
pub use error::{LocalizeError, Result};
pub use frame::StackFrame;
pub use fusion::{FrameMatches, FusionEngine, FusionInput};
pub use localizer::{CacheStats, FaultLocalizer};
pub use request::LocalizeRequest;
pub use result::{Degradation, LocalizeStats, Localization};
