//! Server configuration.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. Load `.env` from the working directory into the process environment, if present
//! 3. Apply environment variable overrides
//!
//! Invalid override values are ignored with a warning.

use std::time::Duration;

use murmur_core::reply::{DEFAULT_FRAGMENT_CHARS, DEFAULT_FRAGMENT_DELAY};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for the murmur server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`, `0` for auto-assign).
    pub port: u16,
    /// Characters per streamed fragment.
    pub fragment_chars: usize,
    /// Pause before each fragment, in milliseconds.
    pub fragment_delay_ms: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Inbound frames buffered per connection while a cycle is running.
    pub inbound_queue: usize,
    /// Outbound events buffered per connection.
    pub outbound_queue: usize,
    /// Interval between server Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this long without a Pong, in seconds.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            fragment_chars: DEFAULT_FRAGMENT_CHARS,
            #[allow(clippy::cast_possible_truncation)]
            fragment_delay_ms: DEFAULT_FRAGMENT_DELAY.as_millis() as u64,
            max_message_size: 1024 * 1024, // 1 MB
            inbound_queue: 64,
            outbound_queue: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Pause before each fragment.
    pub fn fragment_delay(&self) -> Duration {
        Duration::from_millis(self.fragment_delay_ms)
    }

    /// Interval between server Ping frames.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Pong timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    /// `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load configuration from defaults, `.env` and the environment.
pub fn load_config() -> ServerConfig {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!(".env not found, using process environment"),
        Err(e) => warn!(error = %e, "failed to load .env, ignoring"),
    }

    let mut config = ServerConfig::default();
    apply_env_overrides(&mut config);
    config
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(config: &mut ServerConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// | Variable | Field | Range |
/// |----------|-------|-------|
/// | `PORT` | `port` | 1–65535 |
/// | `MURMUR_HOST` | `host` | non-empty |
/// | `MURMUR_FRAGMENT_CHARS` | `fragment_chars` | 1–4096 |
/// | `MURMUR_FRAGMENT_DELAY_MS` | `fragment_delay_ms` | 0–60000 |
pub fn apply_overrides_with<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = read_u16(&lookup, "PORT", 1, 65535) {
        config.port = v;
    }
    if let Some(v) = lookup("MURMUR_HOST").filter(|v| !v.is_empty()) {
        config.host = v;
    }
    if let Some(v) = read_usize(&lookup, "MURMUR_FRAGMENT_CHARS", 1, 4096) {
        config.fragment_chars = v;
    }
    if let Some(v) = read_u64(&lookup, "MURMUR_FRAGMENT_DELAY_MS", 0, 60_000) {
        config.fragment_delay_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_u16<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: u16,
    max: u16,
) -> Option<u16> {
    let val = lookup(name)?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_u64<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_usize<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = lookup(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.fragment_chars, 12);
        assert_eq!(cfg.fragment_delay(), Duration::from_millis(40));
        assert_eq!(cfg.inbound_queue, 64);
        assert_eq!(cfg.outbound_queue, 1024);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn heartbeat_durations_never_zero() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 0,
            heartbeat_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn port_override() {
        let mut cfg = ServerConfig::default();
        apply_overrides_with(&mut cfg, env(&[("PORT", "3000")]));
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn all_overrides() {
        let mut cfg = ServerConfig::default();
        apply_overrides_with(
            &mut cfg,
            env(&[
                ("PORT", "9999"),
                ("MURMUR_HOST", "127.0.0.1"),
                ("MURMUR_FRAGMENT_CHARS", "5"),
                ("MURMUR_FRAGMENT_DELAY_MS", "0"),
            ]),
        );
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.fragment_chars, 5);
        assert_eq!(cfg.fragment_delay_ms, 0);
    }

    #[test]
    fn invalid_values_fall_back() {
        let mut cfg = ServerConfig::default();
        apply_overrides_with(
            &mut cfg,
            env(&[
                ("PORT", "not-a-port"),
                ("MURMUR_HOST", ""),
                ("MURMUR_FRAGMENT_CHARS", "0"),
                ("MURMUR_FRAGMENT_DELAY_MS", "999999"),
            ]),
        );
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.fragment_chars, 12);
        assert_eq!(cfg.fragment_delay_ms, 40);
    }

    #[test]
    fn port_zero_rejected_from_env() {
        let mut cfg = ServerConfig::default();
        apply_overrides_with(&mut cfg, env(&[("PORT", "0")]));
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("80", 1, 65535), Some(80));
        assert_eq!(parse_u16_range(" 80 ", 1, 65535), Some(80));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_usize_range("12", 1, 12), Some(12));
        assert_eq!(parse_usize_range("13", 1, 12), None);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.fragment_chars, cfg.fragment_chars);
    }
}
