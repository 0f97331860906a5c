use anyhow::Result;
use entity_store_test_support::{Fault, FlakyStore};
use faultline_entity_store::{EntityStore, MemoryEntityStore, StoreError};
use faultline_indexer::{Indexer, IndexerConfig, IndexerError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_manifest(root: &Path, relative: &str, entities: serde_json::Value) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json!({ "entities": entities }).to_string())?;
    Ok(())
}

fn function(name: &str, start: usize) -> serde_json::Value {
    json!({
        "name": name,
        "entity_type": "function",
        "start_line": start,
        "end_line": start + 5,
        "body": format!("def {name}(): pass"),
    })
}

fn config(batch_size: usize) -> IndexerConfig {
    IndexerConfig {
        batch_size,
        max_concurrent: 4,
        ..Default::default()
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn one_malformed_file_among_one_hundred() -> Result<()> {
    let source = TempDir::new()?;
    for i in 0..100 {
        write_manifest(
            source.path(),
            &format!("pkg{}/mod{i:03}.py.entities.json", i % 7),
            json!([function(&format!("handler_{i}"), 1)]),
        )?;
    }
    fs::write(source.path().join("pkg3/broken.py.entities.json"), "{ \"entities\": [")?;

    let store = Arc::new(MemoryEntityStore::new());
    let report = Indexer::new(config(16), store.clone())?
        .index(source.path())
        .await?;

    assert_eq!(report.indexed_count, 100);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "pkg3/broken.py.entities.json");
    assert!(report.errors[0].reason.contains("malformed"));
    assert_eq!(store.count().await?, 100);
    Ok(())
}

#[tokio::test]
async fn reindexing_unchanged_tree_is_idempotent() -> Result<()> {
    let source = TempDir::new()?;
    write_manifest(
        source.path(),
        "app/validator.py.entities.json",
        json!([function("validate", 1), function("check", 10)]),
    )?;
    write_manifest(
        source.path(),
        "app/pay.py.entities.json",
        json!([function("charge", 1)]),
    )?;

    let full = IndexerConfig {
        incremental: false,
        ..config(1)
    };

    let first_store = Arc::new(MemoryEntityStore::new());
    Indexer::new(full.clone(), first_store.clone())?
        .index(source.path())
        .await?;

    let second_store = Arc::new(MemoryEntityStore::new());
    let indexer = Indexer::new(full, second_store.clone())?;
    indexer.index(source.path()).await?;
    let rerun = indexer.index(source.path()).await?;

    assert_eq!(rerun.indexed_count, 2);
    assert_eq!(rerun.removed_count, 0);
    assert_eq!(
        first_store.snapshot().await?.entities,
        second_store.snapshot().await?.entities
    );
    assert_eq!(second_store.count().await?, 3);
    Ok(())
}

#[tokio::test]
async fn incremental_run_skips_unchanged_and_drops_stale() -> Result<()> {
    let source = TempDir::new()?;
    write_manifest(
        source.path(),
        "a.py.entities.json",
        json!([function("alpha", 1), function("beta", 10)]),
    )?;
    write_manifest(source.path(), "b.py.entities.json", json!([function("gamma", 1)]))?;
    write_manifest(source.path(), "c.py.entities.json", json!([function("delta", 1)]))?;

    let store = Arc::new(MemoryEntityStore::new());
    let indexer = Indexer::new(config(10), store.clone())?;
    let first = indexer.index(source.path()).await?;
    assert_eq!(first.indexed_count, 3);
    assert_eq!(store.count().await?, 4);

    // a loses beta, c is deleted, b untouched
    write_manifest(source.path(), "a.py.entities.json", json!([function("alpha", 1)]))?;
    fs::remove_file(source.path().join("c.py.entities.json"))?;

    let second = indexer.index(source.path()).await?;
    assert_eq!(second.indexed_count, 1);
    assert_eq!(second.unchanged_count, 1);
    assert_eq!(second.removed_count, 2);
    assert!(second.generation > first.generation);

    let mut names: Vec<String> = store
        .snapshot()
        .await?
        .entities
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpha", "gamma"]);
    Ok(())
}

#[tokio::test]
async fn state_survives_restart_with_index_dir() -> Result<()> {
    let source = TempDir::new()?;
    let index_dir = TempDir::new()?;
    write_manifest(source.path(), "a.py.entities.json", json!([function("alpha", 1)]))?;

    let persisted = IndexerConfig {
        index_dir: Some(index_dir.path().to_path_buf()),
        ..config(10)
    };

    let store = Arc::new(MemoryEntityStore::new());
    Indexer::new(persisted.clone(), store.clone())?
        .index(source.path())
        .await?;
    assert!(index_dir.path().join("index-state.json").exists());

    // Same store, new indexer: state comes from disk
    let report = Indexer::new(persisted.clone(), store.clone())?
        .index(source.path())
        .await?;
    assert_eq!(report.unchanged_count, 1);
    assert_eq!(report.indexed_count, 0);

    // Fresh store: stale state is discarded and everything is reindexed
    let fresh = Arc::new(MemoryEntityStore::new());
    let report = Indexer::new(persisted, fresh.clone())?
        .index(source.path())
        .await?;
    assert_eq!(report.indexed_count, 1);
    assert_eq!(fresh.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn entity_with_bad_span_skips_only_its_file() -> Result<()> {
    let source = TempDir::new()?;
    write_manifest(source.path(), "good.py.entities.json", json!([function("ok", 1)]))?;
    write_manifest(
        source.path(),
        "bad.py.entities.json",
        json!([{"name": "broken", "entity_type": "function", "start_line": 0, "end_line": 3}]),
    )?;

    let store = Arc::new(MemoryEntityStore::new());
    let report = Indexer::new(config(10), store.clone())?
        .index(source.path())
        .await?;

    assert_eq!(report.indexed_count, 1);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(report.errors[0].path, "bad.py.entities.json");
    assert_eq!(store.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_store_is_fatal_and_retryable() -> Result<()> {
    let source = TempDir::new()?;
    write_manifest(source.path(), "a.py.entities.json", json!([function("alpha", 1)]))?;

    let store = Arc::new(FlakyStore::default());
    store.fail(Fault::Writes);
    let result = Indexer::new(config(10), store)?.index(source.path()).await;

    match result {
        Err(err @ IndexerError::Store(StoreError::Unavailable(_))) => {
            assert!(err.is_retryable());
        }
        other => panic!("expected unavailable store error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_batch_leaves_no_writes_in_flight() -> Result<()> {
    let source = TempDir::new()?;
    write_manifest(source.path(), "a_boom.py.entities.json", json!([function("boom", 1)]))?;
    for name in ["b_alpha", "c_beta", "d_gamma"] {
        write_manifest(
            source.path(),
            &format!("{name}.py.entities.json"),
            json!([function(name, 1)]),
        )?;
    }

    let store = Arc::new(FlakyStore::default());
    store.reject_name("boom");
    store.delay(Fault::Writes, std::time::Duration::from_millis(300));
    let result = Indexer::new(config(10), store.clone())?
        .index(source.path())
        .await;
    assert!(matches!(
        result,
        Err(IndexerError::Store(StoreError::Unavailable(_)))
    ));

    let count_at_return = store.count().await?;
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert_eq!(store.count().await?, count_at_return);
    assert_eq!(count_at_return, 3);
    Ok(())
}
