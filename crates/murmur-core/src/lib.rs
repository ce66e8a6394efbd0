//! # murmur-core
//!
//! Shared pieces of the murmur chat demo:
//!
//! - [`protocol`]: the framed JSON events exchanged over the WebSocket, and
//!   validation of inbound client frames
//! - [`reply`]: the mock reply generator and the fragmenting used to stream it

#![deny(unsafe_code)]

pub mod protocol;
pub mod reply;

pub use protocol::{ClientEvent, Inbound, ProtocolError, Role, ServerEvent, parse_inbound};
pub use reply::{MockReply, ReplySource, fragment};
