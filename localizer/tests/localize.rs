use anyhow::Result;
use entity_store_test_support::{Fault, FlakyStore};
use faultline_entity_store::{CodeEntity, EntityStore, EntityType, MemoryEntityStore, StoreError};
use faultline_localizer::{
    CacheConfig, Candidate, FaultLocalizer, GraphConfig, LocalizeError, LocalizeRequest,
    LocalizerConfig, MatchSource, StackFrame,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn function(id: &str, name: &str, file_path: &str, start: usize, end: usize) -> CodeEntity {
    CodeEntity::new(id, name, name, EntityType::Function, file_path, start, end)
}

fn uncached() -> LocalizerConfig {
    LocalizerConfig {
        cache: CacheConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// processPayment calls validate and charge
fn payment_entities() -> Vec<CodeEntity> {
    vec![
        function("pay", "processPayment", "app/payment.py", 1, 20)
            .with_body("validate(order)\ncharge(order.card, order.total)")
            .with_calls(["validate", "charge"]),
        function("val", "validate", "app/validator.py", 1, 15)
            .with_body("if order.total <= 0: raise ValueError('total must be positive')"),
        function("chg", "charge", "app/payment.py", 22, 40).with_body("gateway.submit(card, amount)"),
    ]
}

fn ids(candidates: &[Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.entity_id.as_str()).collect()
}

#[test_log::test(tokio::test)]
async fn failure_in_callee_surfaces_its_caller() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store.upsert(payment_entities()).await?;
    let localizer = FaultLocalizer::new(uncached(), store).await?;

    let request = LocalizeRequest::new("ValueError: total must be positive")
        .with_frame(StackFrame::new("/srv/shop/app/validator.py", 7, "validate"));
    let candidates = localizer.localize(&request).await?;

    let validate = &candidates[0];
    assert_eq!(validate.entity_id, "val");
    assert_eq!(validate.graph_depth, Some(0));
    assert!(validate.matched_by(MatchSource::Direct));

    let caller = candidates
        .iter()
        .find(|c| c.entity_id == "pay")
        .ok_or_else(|| anyhow::anyhow!("processPayment missing from {:?}", ids(&candidates)))?;
    assert_eq!(caller.graph_depth, Some(1));
    assert!(caller.matched_by(MatchSource::Graph));
    assert!((caller.score_breakdown.graph - 0.35).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn empty_store_yields_no_candidates() -> Result<()> {
    let localizer = FaultLocalizer::new(uncached(), Arc::new(MemoryEntityStore::new())).await?;

    let request = LocalizeRequest::new("NullPointerException")
        .with_frame(StackFrame::new("Validator.java", 42, "validate").with_class("Validator"));
    assert!(localizer.localize(&request).await?.is_empty());
    assert!(localizer.localize(&LocalizeRequest::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn direct_and_lexical_agreement_ranks_first() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store
        .upsert(vec![
            function("checkout", "checkout", "app/cart.py", 1, 30).with_body("order = cart.submit()"),
            function("validate_amount", "validate_amount", "app/rules.py", 1, 12)
                .with_body("if amount <= 0: raise InvalidAmount('amount must be positive')"),
            function("format_amount", "format_amount", "app/fmt.py", 1, 4)
                .with_body("return f'{amount:.2f}'"),
        ])
        .await?;
    let localizer = FaultLocalizer::new(uncached(), store).await?;

    let request = LocalizeRequest::new("InvalidAmount: amount must be positive")
        .with_frame(StackFrame::new("app/cart.py", 12, "checkout"))
        .with_frame(StackFrame::new("app/rules.py", 5, "validate_amount"));
    let candidates = localizer.localize(&request).await?;

    let top = &candidates[0];
    assert_eq!(top.entity_id, "validate_amount");
    assert_eq!(
        top.matched_reason,
        vec![MatchSource::Direct, MatchSource::Lexical]
    );
    assert_eq!(top.score_breakdown.lexical, 0.5);

    // Summed, never maxed
    assert!(top.score >= top.score_breakdown.direct);
    assert!(top.score >= top.score_breakdown.lexical);
    assert_eq!(top.score, top.score_breakdown.total());
    Ok(())
}

#[tokio::test]
async fn same_named_function_elsewhere_does_not_outrank_failure_site() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store
        .upsert(vec![
            function("b-real", "validate", "app/validator.py", 1, 15),
            function("a-unrelated", "validate", "legacy/forms.py", 100, 140),
        ])
        .await?;
    let localizer = FaultLocalizer::new(uncached(), store).await?;

    let request =
        LocalizeRequest::default().with_frame(StackFrame::new("app/validator.py", 7, "validate"));
    let candidates = localizer.localize(&request).await?;

    assert_eq!(ids(&candidates), vec!["b-real"]);
    assert_eq!(candidates[0].score_breakdown.direct, 1.0);
    Ok(())
}

#[tokio::test]
async fn unknown_file_falls_back_to_name_match() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store
        .upsert(vec![function("val", "validate", "app/validator.py", 1, 15)])
        .await?;
    let localizer = FaultLocalizer::new(uncached(), store).await?;

    let request = LocalizeRequest::default()
        .with_frame(StackFrame::new("vendored/copy_of_validator.py", 7, "validate"));
    let candidates = localizer.localize(&request).await?;

    assert_eq!(ids(&candidates), vec!["val"]);
    assert!(candidates[0].matched_by(MatchSource::Direct));
    assert!((candidates[0].score_breakdown.direct - 0.9).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn identical_state_gives_identical_output() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store.upsert(payment_entities()).await?;

    let request = LocalizeRequest::new("charge failed for order")
        .with_frame(StackFrame::new("app/validator.py", 3, "validate"))
        .with_frame(StackFrame::new("app/payment.py", 30, "charge"));

    let first = FaultLocalizer::new(uncached(), store.clone()).await?;
    let second = FaultLocalizer::new(uncached(), store).await?;

    let a = serde_json::to_string(&first.localize(&request).await?)?;
    let b = serde_json::to_string(&first.localize(&request).await?)?;
    let c = serde_json::to_string(&second.localize(&request).await?)?;
    assert_eq!(a, b);
    assert_eq!(a, c);
    Ok(())
}

#[tokio::test]
async fn closer_callers_rank_above_distant_ones() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store
        .upsert(vec![
            function("leaf", "parse_header", "net/http.py", 1, 10),
            function("mid", "read_request", "net/http.py", 12, 30).with_calls(["parse_header"]),
            // serve and dispatch call each other
            function("top", "serve", "net/server.py", 1, 40).with_calls(["read_request", "dispatch"]),
            function("loop", "dispatch", "net/server.py", 42, 60).with_calls(["serve"]),
        ])
        .await?;
    let config = LocalizerConfig {
        graph: GraphConfig {
            max_depth: 5,
            max_fanin: 10,
        },
        ..uncached()
    };
    let localizer = FaultLocalizer::new(config, store).await?;

    let request =
        LocalizeRequest::default().with_frame(StackFrame::new("net/http.py", 4, "parse_header"));
    let candidates = localizer.localize(&request).await?;

    assert_eq!(ids(&candidates), vec!["leaf", "mid", "top", "loop"]);
    let depths: Vec<Option<usize>> = candidates.iter().map(|c| c.graph_depth).collect();
    assert_eq!(depths, vec![Some(0), Some(1), Some(2), Some(3)]);
    assert!(candidates[1].score >= candidates[2].score);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn failed_lexical_source_degrades_gracefully() -> Result<()> {
    let store = Arc::new(FlakyStore::default());
    store.upsert(payment_entities()).await?;
    store.fail(Fault::Lexical);
    let localizer = FaultLocalizer::new(uncached(), store).await?;

    let request = LocalizeRequest::new("ValueError: total must be positive")
        .with_frame(StackFrame::new("app/validator.py", 7, "validate"));
    let localization = localizer.localize_detailed(&request).await?;

    assert_eq!(ids(&localization.candidates), vec!["val", "pay"]);
    assert_eq!(localization.degraded.len(), 1);
    assert_eq!(localization.degraded[0].source, MatchSource::Lexical);
    assert!(!localization.is_complete());
    Ok(())
}

#[tokio::test]
async fn unreachable_store_is_fatal() -> Result<()> {
    let store = Arc::new(FlakyStore::default());
    store.upsert(payment_entities()).await?;
    let localizer = FaultLocalizer::new(uncached(), store.clone()).await?;
    for fault in [Fault::Lookups, Fault::Lexical, Fault::Vector] {
        store.fail(fault);
    }

    let request = LocalizeRequest::new("ValueError")
        .with_frame(StackFrame::new("app/validator.py", 7, "validate"))
        .with_query_vector(vec![1.0, 0.0]);
    match localizer.localize(&request).await {
        Err(err @ LocalizeError::Store(StoreError::Unavailable(_))) => {
            assert!(err.is_retryable());
        }
        other => panic!("expected unavailable store, got {other:?}"),
    }

    // Lookups alone are enough to answer
    store.heal(Fault::Lookups);
    let candidates = localizer.localize(&request).await?;
    assert_eq!(candidates[0].entity_id, "val");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn budget_returns_partial_results() -> Result<()> {
    let store = Arc::new(FlakyStore::default());
    store.upsert(payment_entities()).await?;
    store.delay(Fault::Lexical, Duration::from_secs(5));
    let localizer = FaultLocalizer::new(uncached(), store).await?;

    let request = LocalizeRequest::new("ValueError: total must be positive")
        .with_frame(StackFrame::new("app/validator.py", 7, "validate"));

    let started = Instant::now();
    let localization = localizer
        .localize_within(&request, Duration::from_millis(200))
        .await?;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(localization.timed_out.contains(&MatchSource::Lexical));
    assert!(!localization.timed_out.contains(&MatchSource::Direct));
    assert_eq!(ids(&localization.candidates), vec!["val", "pay"]);
    Ok(())
}

#[tokio::test]
async fn cache_is_dropped_when_generation_changes() -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    store.upsert(payment_entities()).await?;
    let localizer = FaultLocalizer::new(LocalizerConfig::default(), store.clone()).await?;

    let request = LocalizeRequest::default()
        .with_frame(StackFrame::new("app/validator.py", 7, "validate"));
    let first = localizer.localize_detailed(&request).await?;
    assert!(!first.stats.cache_hit);
    let second = localizer.localize_detailed(&request).await?;
    assert!(second.stats.cache_hit);
    assert_eq!(first.candidates, second.candidates);

    store
        .upsert(vec![
            function("api", "handle_checkout", "app/api.py", 1, 25).with_calls(["processPayment"]),
        ])
        .await?;
    localizer.rebuild_graph().await?;

    let third = localizer.localize_detailed(&request).await?;
    assert!(!third.stats.cache_hit);
    assert_eq!(third.graph_generation, store.generation());
    assert!(third.candidates.iter().any(|c| c.entity_id == "api"));
    assert_eq!(localizer.cache_stats().await.map(|s| s.size), Some(1));
    Ok(())
}

#[tokio::test]
async fn index_then_localize_from_manifests() -> Result<()> {
    let source = TempDir::new()?;
    std::fs::create_dir_all(source.path().join("app"))?;
    std::fs::write(
        source.path().join("app/payment.py.entities.json"),
        json!({
            "entities": [
                {"name": "processPayment", "entity_type": "function", "start_line": 1,
                 "end_line": 20, "calls": ["validate", "charge"]},
                {"name": "charge", "entity_type": "function", "start_line": 22, "end_line": 40},
            ]
        })
        .to_string(),
    )?;
    std::fs::write(
        source.path().join("app/validator.py.entities.json"),
        json!({
            "entities": [
                {"name": "validate", "entity_type": "function", "start_line": 1, "end_line": 15},
            ]
        })
        .to_string(),
    )?;

    let store = Arc::new(MemoryEntityStore::new());
    let localizer = FaultLocalizer::new(uncached(), store.clone()).await?;
    assert_eq!(localizer.graph_generation().await, 0);

    let report = localizer.index(source.path()).await?;
    assert_eq!(report.indexed_count, 2);
    assert_eq!(localizer.graph_generation().await, store.generation());
    assert_eq!(localizer.graph().await.edge_count(), 2);

    let request =
        LocalizeRequest::default().with_frame(StackFrame::new("app/validator.py", 9, "validate"));
    let candidates = localizer.localize(&request).await?;
    let names: Vec<String> = {
        let mut names = Vec::new();
        for candidate in &candidates {
            if let Some(entity) = store.get(&candidate.entity_id).await? {
                names.push(entity.name);
            }
        }
        names
    };
    assert_eq!(names, vec!["validate", "processPayment"]);
    Ok(())
}
