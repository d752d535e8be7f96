//! Cache faults, eviction and expiry as seen through `identify`.

use std::sync::Arc;
use std::time::Duration;

use sightline_cache::{FingerprintCache, ResultCache};
use sightline_core::{CacheConfig, SightlineConfig};
use sightline_orchestrator::{OrchestratorBuilder, RecognitionOrchestrator};
use sightline_test_utils::fixtures::*;
use sightline_test_utils::{
    EnrichmentPayload, EntityId, FaultyBackend, IdentificationResult, ImageFingerprint,
    ScriptedClassifier, ScriptedDataSource,
};
use tokio::sync::watch;

type FaultyFingerprints = FaultyBackend<ImageFingerprint, IdentificationResult>;
type FaultyResults = FaultyBackend<EntityId, EnrichmentPayload>;

fn builder(
    classifier: &Arc<ScriptedClassifier>,
    source: &Arc<ScriptedDataSource>,
) -> OrchestratorBuilder {
    RecognitionOrchestrator::builder(classifier.clone(), source.clone())
}

#[tokio::test]
async fn test_broken_fingerprint_cache_reads_as_miss() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let backend: Arc<FaultyFingerprints> = Arc::new(FaultyBackend::broken(64));
    let fingerprints = Arc::new(FingerprintCache::new(
        "fingerprint_cache",
        backend,
        Duration::from_secs(60),
    ));
    let orch = builder(&classifier, &source)
        .config(fast_config())
        .fingerprint_cache(Arc::clone(&fingerprints))
        .build()
        .unwrap();

    for _ in 0..2 {
        let result = orch.identify(&image("uncacheable")).await.unwrap();
        assert!(!result.served_from_cache);
        assert!(result.enriched_data.is_some());
    }

    assert_eq!(classifier.calls(), 2);
    // Enrichment still comes from the healthy result cache.
    assert_eq!(source.fetch_count(), 1);
    assert!(fingerprints.stats().await.faults >= 4);
}

#[tokio::test]
async fn test_broken_result_cache_still_enriches() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let backend: Arc<FaultyResults> = Arc::new(FaultyBackend::broken(64));
    let results = Arc::new(ResultCache::new("result_cache", backend, Duration::from_secs(60)));
    let orch = builder(&classifier, &source)
        .config(fast_config())
        .result_cache(results)
        .build()
        .unwrap();

    for tag in ["a", "b"] {
        let result = orch.identify(&image(tag)).await.unwrap();
        assert!(result.enriched_data.is_some());
    }
    assert_eq!(source.fetch_count(), 2);

    let report = orch.health().await;
    let check = report.check("result_cache").unwrap();
    assert!(check.metadata.as_ref().unwrap()["faults"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_recovered_backend_resumes_caching() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let backend: Arc<FaultyFingerprints> = Arc::new(FaultyBackend::broken(64));
    let fingerprints = Arc::new(FingerprintCache::new(
        "fingerprint_cache",
        backend.clone(),
        Duration::from_secs(60),
    ));
    let orch = builder(&classifier, &source)
        .config(fast_config())
        .fingerprint_cache(fingerprints)
        .build()
        .unwrap();

    orch.identify(&image("x")).await.unwrap();
    backend.set_failing(false);
    orch.identify(&image("x")).await.unwrap();
    let third = orch.identify(&image("x")).await.unwrap();

    assert!(third.served_from_cache);
    assert_eq!(classifier.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fingerprint_entry_expires() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let config = SightlineConfig {
        fingerprint_cache: CacheConfig::new(100, Duration::from_secs(60)),
        ..SightlineConfig::default()
    };
    let orch = builder(&classifier, &source).config(config).build().unwrap();

    orch.identify(&image("ephemeral")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(orch.identify(&image("ephemeral")).await.unwrap().served_from_cache);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let after = orch.identify(&image("ephemeral")).await.unwrap();
    assert!(!after.served_from_cache);
    assert_eq!(classifier.calls(), 2);
}

#[tokio::test]
async fn test_least_recently_used_image_evicted() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let config = SightlineConfig {
        fingerprint_cache: CacheConfig::new(2, Duration::from_secs(3600)),
        ..fast_config()
    };
    let orch = builder(&classifier, &source).config(config).build().unwrap();

    orch.identify(&image("a")).await.unwrap();
    orch.identify(&image("b")).await.unwrap();
    // Touch "a" so "b" is the eviction candidate.
    assert!(orch.identify(&image("a")).await.unwrap().served_from_cache);
    orch.identify(&image("c")).await.unwrap();

    assert!(orch.identify(&image("a")).await.unwrap().served_from_cache);
    assert!(!orch.identify(&image("b")).await.unwrap().served_from_cache);
    assert_eq!(classifier.calls(), 4);
    assert!(orch.fingerprint_cache().stats().await.evictions >= 1);
}

#[tokio::test]
async fn test_full_fingerprint_cache_keeps_every_image() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let config = SightlineConfig {
        fingerprint_cache: CacheConfig::new(32, Duration::from_secs(3600)),
        ..fast_config()
    };
    let orch = builder(&classifier, &source).config(config).build().unwrap();

    for i in 0..32 {
        orch.identify(&image(&format!("img-{}", i))).await.unwrap();
    }
    for i in 0..32 {
        let again = orch.identify(&image(&format!("img-{}", i))).await.unwrap();
        assert!(again.served_from_cache, "img-{} was evicted", i);
    }

    assert_eq!(classifier.calls(), 32);
    assert_eq!(orch.fingerprint_cache().stats().await.evictions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweepers_remove_expired_entries() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3));
    let cache = CacheConfig::new(100, Duration::from_secs(5))
        .with_sweep_interval(Duration::from_secs(10));
    let config = SightlineConfig {
        fingerprint_cache: cache.clone(),
        result_cache: cache,
        ..SightlineConfig::default()
    };
    let orch = builder(&classifier, &source).config(config).build().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweepers = orch.spawn_cache_sweepers(shutdown_rx);

    orch.identify(&image("swept")).await.unwrap();
    assert_eq!(orch.fingerprint_cache().len().await, 1);
    assert_eq!(orch.result_cache().len().await, 1);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(orch.fingerprint_cache().len().await, 0);
    assert_eq!(orch.result_cache().len().await, 0);

    shutdown_tx.send(true).unwrap();
    for sweeper in sweepers {
        let metrics = sweeper.await.unwrap().snapshot();
        assert_eq!(metrics.entries_expired, 1);
    }
}
