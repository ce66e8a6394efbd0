//! # murmur-server
//!
//! Axum HTTP + `WebSocket` server for the murmur chat demo.
//!
//! - `WebSocket` gateway on `/` and `/ws`: one session per connection
//! - Response cycle: `typing` → `start` → `delta`* → `end` → `typing`
//! - `/health` and `/metrics` endpoints
//! - Configuration from defaults, `.env` and environment variables
//! - Graceful shutdown via a `CancellationToken` shared with every session

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod responder;
pub mod server;
pub mod websocket;

pub use config::{ServerConfig, load_config};
pub use responder::{EventSink, Responder, SinkError};
pub use server::{DEFAULT_SHUTDOWN_TIMEOUT, MurmurServer};
