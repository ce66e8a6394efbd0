//! # murmur-client
//!
//! The client side of the murmur chat demo.
//!
//! - [`transcript`]: connection status, typing indicator and the message list,
//!   driven by inbound server events and local submissions
//! - [`composer`]: input buffer and Enter / modified-Enter handling
//! - [`channel`]: `WebSocket` transport over `tokio-tungstenite`
//! - [`console`]: terminal rendering and the interactive chat loop

#![deny(unsafe_code)]

pub mod channel;
pub mod composer;
pub mod console;
pub mod errors;
pub mod transcript;

pub use channel::{ChannelEvent, ChannelHandle, connect};
pub use composer::{Composer, ComposerAction, KeyInput};
pub use errors::ClientError;
pub use transcript::{ChatMessage, ChatState, ConnectionStatus, Delivery, ViewChange};
