//! Integration tests for LayerStore against the mock source.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tileconf_core::{CacheBackendHandle, SpecParser};
use tileconf_storage::{LayerStore, MockLayerSource, ReadOutcome, StoreOptions};
use tileconf_test_utils::assertions::{assert_config_not_found, assert_key_not_found};
use tileconf_test_utils::fixtures::{
    empty_source, proxy_definition, roads_definition, roads_definition_v2, seeded_source,
    DISK_CACHE,
};
use tileconf_test_utils::{CountingParser, LayerKey, LogLevel};

fn options() -> StoreOptions {
    StoreOptions::new()
        .with_working_dir("/tmp/stache")
        .with_log_level(LogLevel::Info)
}

async fn open_counting(
    source: &Arc<MockLayerSource>,
) -> (LayerStore<Arc<MockLayerSource>, CountingParser>, CountingParser) {
    let parser = CountingParser::new();
    let store = LayerStore::open_with(Arc::clone(source), parser.clone(), &SpecParser, &options())
        .await
        .unwrap();
    (store, parser)
}

// ============================================================================
// Scenario: external edit of a cached layer
// ============================================================================

#[tokio::test]
async fn test_roads_scenario() {
    let source = empty_source();
    let roads = LayerKey::from("roads");
    let t1 = source.update_layer(roads.clone(), roads_definition());
    let (store, parser) = open_counting(&source).await;

    let first = store.read(&roads).await.unwrap();
    assert_eq!(first.outcome(), ReadOutcome::Miss);
    assert_eq!(first.revision(), t1);
    assert_eq!(parser.calls(), 1);
    let style = first.layer().style().unwrap();
    assert_eq!(style.source, "/tmp/stache/styles/roads.xml");

    // An editor writes straight to the layers table.
    let t2 = source.update_layer(roads.clone(), roads_definition_v2());
    assert_ne!(t1, t2);

    let second = store.read(&roads).await.unwrap();
    assert_eq!(second.outcome(), ReadOutcome::Reloaded);
    assert_eq!(second.revision(), t2);
    assert_eq!(parser.calls(), 2);
    assert!(!Arc::ptr_eq(first.layer(), second.layer()));
    assert!(first.layer().compiled_style().is_none());
    assert_eq!(
        second.layer().style().unwrap().source,
        "/tmp/stache/styles/roads-night.xml"
    );

    // The replacement is now the cached entry.
    let third = store.read(&roads).await.unwrap();
    assert!(third.was_cache_hit());
    assert!(Arc::ptr_eq(second.layer(), third.layer()));
    assert_eq!(parser.calls(), 2);
}

#[tokio::test]
async fn test_touch_without_content_change_still_reparses() {
    let source = seeded_source();
    let roads = LayerKey::from("roads");
    let (store, parser) = open_counting(&source).await;

    let first = store.get(&roads).await.unwrap();
    source.touch(&roads).unwrap();
    let second = store.get(&roads).await.unwrap();

    assert_eq!(parser.calls(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.fingerprint(), second.fingerprint());
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test]
async fn test_unknown_config_name_fails_before_reading_layers() {
    let source = seeded_source();
    let result = LayerStore::open(
        Arc::clone(&source),
        &options().with_config_name("production"),
    )
    .await;

    assert_config_not_found(&result.map(|_| ()));
    assert_eq!(source.fetches(), 0);
    assert_eq!(source.revision_reads(), 0);
}

#[tokio::test]
async fn test_config_row_overrides_caller_defaults() {
    let source = Arc::new(MockLayerSource::with_config("tiles", DISK_CACHE));
    source.update_layer("roads", roads_definition());
    let store = LayerStore::open(
        Arc::clone(&source),
        &options().with_config_name("tiles"),
    )
    .await
    .unwrap();

    assert_eq!(store.config().working_dir(), Path::new("/srv/stache"));
    assert_eq!(store.config().log_level(), LogLevel::Debug);

    let roads = store.get(&LayerKey::from("roads")).await.unwrap();
    assert_eq!(roads.working_dir(), Path::new("/srv/stache"));
    assert_eq!(roads.log_level(), LogLevel::Debug);
    assert!(matches!(
        roads.cache().as_ref(),
        CacheBackendHandle::Disk { root, umask: 0o002, .. } if root == Path::new("/srv/stache")
    ));
}

#[tokio::test]
async fn test_layers_share_one_cache_backend() {
    let source = seeded_source();
    let store = LayerStore::open(Arc::clone(&source), &options()).await.unwrap();

    let roads = store.get(&LayerKey::from("roads")).await.unwrap();
    let osm = store.get(&LayerKey::from("osm")).await.unwrap();
    assert!(Arc::ptr_eq(roads.cache(), osm.cache()));
    assert!(Arc::ptr_eq(roads.cache(), store.config().cache()));
}

// ============================================================================
// Existence and enumeration
// ============================================================================

#[tokio::test]
async fn test_deleted_row_stays_visible_to_contains_until_next_get() {
    let source = seeded_source();
    let roads = LayerKey::from("roads");
    let store = LayerStore::open(Arc::clone(&source), &options()).await.unwrap();
    store.get(&roads).await.unwrap();

    source.remove_layer(&roads);
    assert!(store.contains(&roads).await.unwrap());
    assert!(!store.keys().await.unwrap().contains(&roads));

    assert_key_not_found(&store.get(&roads).await, "roads");
    assert!(!store.contains(&roads).await.unwrap());
    assert!(store.cached_keys().await.is_empty());
}

#[tokio::test]
async fn test_keys_reflect_external_inserts() {
    let source = seeded_source();
    let store = LayerStore::open(Arc::clone(&source), &options()).await.unwrap();
    assert_eq!(store.keys().await.unwrap().len(), 2);

    source.update_layer("water", proxy_definition());
    let keys = store.keys().await.unwrap();
    assert_eq!(
        keys,
        vec![
            LayerKey::from("osm"),
            LayerKey::from("roads"),
            LayerKey::from("water")
        ]
    );
    assert!(store.contains(&LayerKey::from("water")).await.unwrap());
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_outage_surfaces_as_unavailable_not_missing() {
    let source = seeded_source();
    let store = LayerStore::open(Arc::clone(&source), &options()).await.unwrap();
    source.set_unavailable(true);

    let err = store.get(&LayerKey::from("roads")).await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(!err.is_not_found());
    assert!(store.keys().await.unwrap_err().is_unavailable());
    assert!(store.warm().await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn test_fixed_row_recovers_after_parse_failure() {
    let source = empty_source();
    let roads = LayerKey::from("roads");
    source.update_layer(roads.clone(), r#"{"provider": {"name": "mapnik", "mapfile": ""}}"#);
    let (store, parser) = open_counting(&source).await;

    assert!(store.get(&roads).await.unwrap_err().is_definition_error());
    source.update_layer(roads.clone(), roads_definition());
    store.get(&roads).await.unwrap();

    assert_eq!(parser.calls(), 2);
    assert_eq!(store.stats().await.parse_failures, 1);
}

#[tokio::test]
async fn test_warm_then_release() {
    let source = seeded_source();
    let (store, parser) = open_counting(&source).await;

    let report = store.warm().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(parser.calls(), 2);

    let osm = LayerKey::from("osm");
    assert!(store.release(&osm).await);
    assert!(store.contains(&osm).await.unwrap());
    store.get(&osm).await.unwrap();
    assert_eq!(parser.calls(), 3);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stale_reads_reparse_once() {
    let source = Arc::new(
        MockLayerSource::with_config("default", r#"{"name": "Test"}"#)
            .with_latency(Duration::from_millis(20)),
    );
    let roads = LayerKey::from("roads");
    source.update_layer(roads.clone(), roads_definition());
    let (store, parser) = open_counting(&source).await;
    let store = Arc::new(store);

    store.get(&roads).await.unwrap();
    source.update_layer(roads.clone(), roads_definition_v2());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = roads.clone();
            tokio::spawn(async move { store.get(&key).await })
        })
        .collect();

    let mut layers = Vec::new();
    for handle in handles {
        layers.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(parser.calls(), 2);
    assert_eq!(source.fetches(), 2);
    assert!(layers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(store.stats().await.stale_reloads, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_load_in_parallel() {
    let source = Arc::new(
        MockLayerSource::with_config("default", r#"{"name": "Test"}"#)
            .with_latency(Duration::from_millis(100)),
    );
    for i in 0..4 {
        source.update_layer(format!("layer-{}", i), proxy_definition());
    }
    let store = Arc::new(LayerStore::open(Arc::clone(&source), &options()).await.unwrap());

    let started = std::time::Instant::now();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get(&LayerKey::from(format!("layer-{}", i))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Serialized loads would take at least 400ms.
    assert!(started.elapsed() < Duration::from_millis(350));
    assert_eq!(store.cached_keys().await.len(), 4);
}
