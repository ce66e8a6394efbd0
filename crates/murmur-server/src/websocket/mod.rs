//! WebSocket connection state, per-connection session loop, and registry.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Outbound queue and safe emission for one client |
//! | `session` | Upgrade-to-disconnect lifecycle: hello, reader, writer, heartbeat |
//! | `registry` | Live connection tracking |

pub mod connection;
pub mod registry;
pub mod session;
