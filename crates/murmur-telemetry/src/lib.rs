//! # murmur-telemetry
//!
//! `tracing` subscriber setup shared by the murmur binaries.
//!
//! Logs go to stderr so stdout stays free for the chat transcript.
//! `RUST_LOG` always wins over the configured levels.

#![deny(unsafe_code)]

use std::fmt::Write as _;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for log output.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default log level.
    pub level: Level,
    /// Per-module level overrides (e.g. `"murmur_server" => DEBUG`).
    pub module_levels: Vec<(String, Level)>,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

/// Build the `EnvFilter` directive string for a config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        let _ = write!(directives, ",{module}={}", level.to_string().to_lowercase());
    }
    directives
}

/// Install the global subscriber. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
