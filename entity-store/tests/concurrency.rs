use anyhow::Result;
use faultline_entity_store::{CodeEntity, EntityStore, EntityType, MemoryEntityStore, StoreConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn function(id: String, file: &str, line: usize) -> CodeEntity {
    CodeEntity::new(
        id.clone(),
        format!("fn_{id}"),
        format!("mod.fn_{id}"),
        EntityType::Function,
        file,
        line,
        line + 4,
    )
    .with_body(format!("handle request {id}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_concurrent_batches_all_land() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let batch: Vec<CodeEntity> = (0..50)
                .map(|i| function(format!("w{worker}-{i:03}"), &format!("src/w{worker}.py"), i * 5 + 1))
                .collect();
            store.upsert(batch).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await??, 50);
    }

    assert_eq!(store.count().await?, 400);
    assert_eq!(store.generation(), 8);

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.entities.len(), 400);
    assert!(
        snapshot
            .entities
            .windows(2)
            .all(|pair| pair[0].id < pair[1].id)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshot_never_sees_partial_batches() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for round in 0..20 {
                // Every batch rewrites the same 32 ids with the same round marker
                let batch: Vec<CodeEntity> = (0..32)
                    .map(|i| {
                        function(format!("e{i:02}"), "src/app.py", i * 10 + 1)
                            .with_signature(format!("round{round}"))
                    })
                    .collect();
                store.upsert(batch).await?;
                tokio::task::yield_now().await;
            }
            anyhow::Ok(())
        })
    };

    for _ in 0..20 {
        let snapshot = store.snapshot().await?;
        let mut rounds: Vec<&str> = snapshot
            .entities
            .iter()
            .map(|e| e.signature.as_str())
            .collect();
        rounds.dedup();
        assert!(rounds.len() <= 1, "mixed rounds in snapshot: {rounds:?}");
        tokio::task::yield_now().await;
    }

    writer.await??;
    assert_eq!(store.count().await?, 32);
    Ok(())
}

#[tokio::test]
async fn persisted_snapshot_round_trips_search_results() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("entities.json");

    let store = MemoryEntityStore::new();
    store
        .upsert((0..10).map(|i| function(format!("id{i}"), "src/lib.py", i * 10 + 1)).collect())
        .await?;
    store.save(&path).await?;

    let loaded = MemoryEntityStore::load(&path, StoreConfig::default()).await?;
    assert_eq!(
        loaded.search_lexical("handle id3", 5).await?,
        store.search_lexical("handle id3", 5).await?
    );
    assert_eq!(
        loaded.find_by_location("lib.py", 35).await?,
        store.find_by_location("lib.py", 35).await?
    );
    Ok(())
}

#[tokio::test]
async fn corrupt_snapshot_is_an_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("entities.json");
    std::fs::write(&path, "{ not json")?;

    assert!(MemoryEntityStore::load(&path, StoreConfig::default()).await.is_err());
    Ok(())
}
