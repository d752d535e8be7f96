//! Identify images from the command line with the mock classifier.
//!
//! Usage: sightline-identify [--offline] <image-file>...
//!
//! Prints one JSON line per file, then the health report on stderr.
//! `--offline` enriches from the built-in catalogue instead of the data
//! source at `SIGHTLINE_DATA_SOURCE_URL`.

use std::sync::Arc;

use serde_json::json;
use sightline_core::{EnrichmentPayload, SightlineConfig};
use sightline_orchestrator::telemetry::{init_tracing, LogFormat};
use sightline_orchestrator::RecognitionOrchestrator;
use sightline_providers::{
    DataSource, HttpEntitySource, MockClassifier, StaticDataSource, MOCK_CATALOGUE,
};

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing(LogFormat::from_env()) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let offline = args.iter().any(|a| a == "--offline");
    let paths: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    if paths.is_empty() {
        eprintln!("Usage: sightline-identify [--offline] <image-file>...");
        std::process::exit(2);
    }

    let config = SightlineConfig::from_env();
    let classifier = Arc::new(MockClassifier::new(config.policy.confidence_threshold));

    let data_source: Arc<dyn DataSource> = if offline {
        Arc::new(
            MOCK_CATALOGUE
                .iter()
                .map(|&(id, name)| (id, EnrichmentPayload::new(json!({"id": id, "name": name}))))
                .collect::<StaticDataSource>(),
        )
    } else {
        match HttpEntitySource::new(
            config.data_source_base_url.clone(),
            config.data_source_request_timeout(),
        ) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                eprintln!("Failed to create data source: {}", e);
                std::process::exit(1);
            }
        }
    };

    let orchestrator = match RecognitionOrchestrator::builder(classifier, data_source)
        .config(config)
        .build()
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut failures = 0usize;
    for path in paths {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Failed to read {}: {}", path, e);
                failures += 1;
                continue;
            }
        };

        let line = match orchestrator.identify(&bytes).await {
            Ok(result) => json!({ "file": path, "result": result }),
            Err(e) => {
                if !e.is_no_match() {
                    failures += 1;
                }
                json!({ "file": path, "error": e.to_string(), "retryable": e.is_retryable() })
            }
        };
        println!("{}", line);
    }

    match serde_json::to_string_pretty(&orchestrator.health().await) {
        Ok(report) => eprintln!("{}", report),
        Err(e) => eprintln!("Failed to render health report: {}", e),
    }
    eprintln!("{}", json!({ "stats": orchestrator.stats() }));

    if failures > 0 {
        std::process::exit(1);
    }
}
