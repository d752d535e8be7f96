//! Concurrent identify behaviour: coalescing and breaker trials.

use std::sync::Arc;
use std::time::Duration;

use sightline_core::{BreakerConfig, CircuitState, ClassifierError, SightlineConfig};
use sightline_orchestrator::RecognitionOrchestrator;
use sightline_test_utils::fixtures::*;
use sightline_test_utils::{IdentifyError, ScriptedClassifier, ScriptedDataSource};
use tokio::time::Instant;

fn orchestrator(
    classifier: &Arc<ScriptedClassifier>,
    source: &Arc<ScriptedDataSource>,
    config: SightlineConfig,
) -> RecognitionOrchestrator {
    RecognitionOrchestrator::builder(classifier.clone(), source.clone())
        .config(config)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_uploads_classified_once() {
    let classifier = Arc::new(
        ScriptedClassifier::always(ranked(&[0.9])).with_latency(Duration::from_millis(50)),
    );
    let source = Arc::new(populated_source(3));
    let orch = orchestrator(&classifier, &source, fast_config());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.identify(&image("popular")).await })
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.primary.entity_id, 1);
        if !result.served_from_cache {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(classifier.calls(), 1);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_entity_enriched_once_under_concurrency() {
    let classifier = Arc::new(ScriptedClassifier::always(ranked(&[0.9])));
    let source = Arc::new(populated_source(3).with_latency(Duration::from_millis(50)));
    let orch = orchestrator(&classifier, &source, fast_config());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.identify(&image(&format!("angle-{}", i))).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.enriched_data.is_some());
    }

    assert_eq!(classifier.calls(), 8);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_images_do_not_wait_on_each_other() {
    let classifier = Arc::new(
        ScriptedClassifier::always(ranked(&[0.9])).with_latency(Duration::from_millis(100)),
    );
    let source = Arc::new(populated_source(3));
    let orch = orchestrator(&classifier, &source, SightlineConfig::default());

    let started = Instant::now();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.identify(&image(&format!("distinct-{}", i))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(classifier.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_one_trial() {
    let classifier = Arc::new(
        ScriptedClassifier::always(ranked(&[0.9])).with_latency(Duration::from_millis(100)),
    );
    classifier.push_reply(Err(ClassifierError::Transient {
        reason: "crash".to_string(),
    }));
    let source = Arc::new(populated_source(3));
    let mut config = SightlineConfig::default();
    config.classifier_breaker = BreakerConfig::new(1, Duration::from_secs(10));
    let orch = orchestrator(&classifier, &source, config);

    assert!(orch.identify(&image("first")).await.is_err());
    assert_eq!(orch.classifier_breaker().state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_secs(11)).await;

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.identify(&image(&format!("probe-{}", i))).await })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(IdentifyError::ClassifierUnavailable(ClassifierError::CircuitOpen)) => rejected += 1,
            Err(other) => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(rejected, 4);
    assert_eq!(classifier.calls(), 2);
    assert_eq!(orch.classifier_breaker().state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_duplicate_uploads() {
    let classifier = Arc::new(
        ScriptedClassifier::always(ranked(&[0.9])).with_latency(Duration::from_millis(10)),
    );
    let source = Arc::new(populated_source(3));
    let orch = orchestrator(&classifier, &source, fast_config());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.identify(&image(&format!("img-{}", i % 4))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(classifier.calls(), 4);
    assert_eq!(orch.stats().requests, 32);
    assert_eq!(orch.stats().cache_hits, 28);
}
