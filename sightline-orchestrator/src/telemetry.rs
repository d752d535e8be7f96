//! Tracing subscriber initialization.
//!
//! Installs an `EnvFilter` (from `RUST_LOG`, default `sightline=info`) and a
//! `fmt` layer. Output is JSON unless `SIGHTLINE_LOG_FORMAT=console`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing_subscriber::util::TryInitError;

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_LOG_FILTER: &str = "sightline=info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable lines
    Console,
}

impl LogFormat {
    /// Read `SIGHTLINE_LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("SIGHTLINE_LOG_FORMAT").ok().as_deref())
    }

    /// `console`, `pretty` or `text` select [`LogFormat::Console`]; anything
    /// else is JSON.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("console") | Some("pretty") | Some("text") => LogFormat::Console,
            _ => LogFormat::Json,
        }
    }
}

/// Install the global subscriber. Call once at startup; a second call fails.
pub fn init_tracing(format: LogFormat) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Console => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    tracing::info!(format = ?format, "Telemetry initialized");
    Ok(())
}
