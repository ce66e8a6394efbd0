//! Client-side chat state: connection status, typing indicator, and the
//! transcript.
//!
//! The assistant message being streamed is tracked explicitly: `start`
//! appends it and records its index, `delta` appends to that index only,
//! and `end` clears it. A `delta` with no active stream is dropped.

use std::fmt;

use murmur_core::protocol::{ClientEvent, Role, ServerEvent};
use tracing::{debug, trace};

/// State of the underlying channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress.
    Connecting,
    /// Open and usable.
    Connected,
    /// Closed by either side.
    Disconnected,
    /// The transport reported an error.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Transmission state of a user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Added locally, not yet handed to the transport.
    Pending,
    /// Handed to an open transport.
    Sent,
    /// The transport was not open, or the send failed.
    Failed,
}

/// One rendered chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Text so far; assistant messages grow while streaming.
    pub content: String,
    /// Delivery state, for user messages only.
    pub delivery: Option<Delivery>,
}

impl ChatMessage {
    fn user(content: String) -> Self {
        Self {
            role: Role::User,
            content,
            delivery: Some(Delivery::Pending),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            delivery: None,
        }
    }
}

/// What a state mutation changed, for the renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewChange {
    /// Nothing changed.
    None,
    /// Connection status changed.
    Status(ConnectionStatus),
    /// Typing indicator set.
    Typing(bool),
    /// A message was appended at this index.
    MessageAdded(usize),
    /// Text was appended to the message at `index`.
    Appended {
        /// Message index.
        index: usize,
        /// Appended text.
        delta: String,
    },
    /// The streaming message (if any) is complete.
    StreamEnded(Option<usize>),
    /// Delivery state of a user message changed.
    Delivery {
        /// Message index.
        index: usize,
        /// New state.
        delivery: Delivery,
    },
    /// Server greeting.
    Hello(String),
    /// Error reported by the server.
    ServerError(String),
}

impl ViewChange {
    /// Whether the view should scroll to the newest entry.
    pub fn scrolls(&self) -> bool {
        matches!(
            self,
            Self::Typing(_) | Self::MessageAdded(_) | Self::Appended { .. } | Self::Delivery { .. }
        )
    }
}

/// A local submission: where the user message landed, and the event to
/// transmit if the connection was open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// Index of the new user message.
    pub index: usize,
    /// `user_message` to send, or `None` if the connection is not open.
    pub event: Option<ClientEvent>,
}

/// Connection status, typing indicator and transcript for one endpoint.
#[derive(Clone, Debug)]
pub struct ChatState {
    status: ConnectionStatus,
    typing: bool,
    messages: Vec<ChatMessage>,
    streaming: Option<usize>,
    last_error: Option<String>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    /// Empty state, connecting.
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            typing: false,
            messages: Vec::new(),
            streaming: None,
            last_error: None,
        }
    }

    /// Start the transcript with an assistant greeting.
    #[must_use]
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::assistant(greeting));
        self
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether the assistant is typing.
    pub fn typing(&self) -> bool {
        self.typing
    }

    /// Transcript, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Index of the assistant message being streamed.
    pub fn streaming_index(&self) -> Option<usize> {
        self.streaming
    }

    /// Last error reported by the server.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The channel opened.
    pub fn on_open(&mut self) -> ViewChange {
        self.set_status(ConnectionStatus::Connected)
    }

    /// The channel closed. Any stream in progress is abandoned.
    pub fn on_close(&mut self) -> ViewChange {
        self.streaming = None;
        self.typing = false;
        self.set_status(ConnectionStatus::Disconnected)
    }

    /// The transport reported an error.
    pub fn on_transport_error(&mut self) -> ViewChange {
        self.set_status(ConnectionStatus::Error)
    }

    fn set_status(&mut self, status: ConnectionStatus) -> ViewChange {
        if self.status == status {
            return ViewChange::None;
        }
        debug!(%status, "connection status");
        self.status = status;
        ViewChange::Status(status)
    }

    /// Apply a raw server frame. Unparseable frames are ignored.
    pub fn apply_frame(&mut self, frame: &str) -> ViewChange {
        match ServerEvent::from_frame(frame) {
            Ok(event) => self.apply(event),
            Err(e) => {
                trace!(error = %e, "ignoring unparseable frame");
                ViewChange::None
            }
        }
    }

    /// Apply a server event.
    pub fn apply(&mut self, event: ServerEvent) -> ViewChange {
        match event {
            ServerEvent::Typing { value } => {
                self.typing = value;
                ViewChange::Typing(value)
            }
            ServerEvent::Start { .. } => {
                self.messages.push(ChatMessage::assistant(String::new()));
                let index = self.messages.len() - 1;
                self.streaming = Some(index);
                ViewChange::MessageAdded(index)
            }
            ServerEvent::Delta { delta } => {
                let Some(index) = self.streaming else {
                    debug!(len = delta.len(), "delta without an active stream, dropped");
                    return ViewChange::None;
                };
                self.messages[index].content.push_str(&delta);
                ViewChange::Appended { index, delta }
            }
            ServerEvent::End => ViewChange::StreamEnded(self.streaming.take()),
            ServerEvent::Hello { message } => ViewChange::Hello(message),
            ServerEvent::Error { message } => {
                self.last_error = Some(message.clone());
                ViewChange::ServerError(message)
            }
        }
    }

    /// Submit user input.
    ///
    /// Blank input is a no-op. Otherwise the trimmed text is appended to the
    /// transcript right away. When the connection is open the returned
    /// submission carries the event to send and the message stays
    /// [`Delivery::Pending`] until [`mark_delivery`](Self::mark_delivery);
    /// when it is not, the message is marked [`Delivery::Failed`].
    pub fn submit(&mut self, input: &str) -> Option<Submission> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        self.messages.push(ChatMessage::user(text.to_owned()));
        let index = self.messages.len() - 1;

        if self.status != ConnectionStatus::Connected {
            debug!(%self.status, "not connected, message kept locally");
            self.messages[index].delivery = Some(Delivery::Failed);
            return Some(Submission { index, event: None });
        }

        Some(Submission {
            index,
            event: Some(ClientEvent::UserMessage {
                text: text.to_owned(),
            }),
        })
    }

    /// Record the transmission outcome of a user message.
    pub fn mark_delivery(&mut self, index: usize, delivery: Delivery) -> ViewChange {
        match self.messages.get_mut(index) {
            Some(message) if message.role == Role::User => {
                message.delivery = Some(delivery);
                ViewChange::Delivery { index, delivery }
            }
            _ => ViewChange::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> ChatState {
        let mut state = ChatState::new();
        let _ = state.on_open();
        state
    }

    #[test]
    fn status_transitions() {
        let mut state = ChatState::new();
        assert_eq!(state.status(), ConnectionStatus::Connecting);
        assert_eq!(
            state.on_open(),
            ViewChange::Status(ConnectionStatus::Connected)
        );
        assert_eq!(state.on_open(), ViewChange::None);
        assert_eq!(
            state.on_transport_error(),
            ViewChange::Status(ConnectionStatus::Error)
        );
        assert_eq!(
            state.on_close(),
            ViewChange::Status(ConnectionStatus::Disconnected)
        );
        assert_eq!(state.status().to_string(), "disconnected");
    }

    #[test]
    fn typing_toggles() {
        let mut state = connected();
        assert_eq!(
            state.apply_frame(r#"{"type":"typing","value":true}"#),
            ViewChange::Typing(true)
        );
        assert!(state.typing());
        let _ = state.apply_frame(r#"{"type":"typing","value":false}"#);
        assert!(!state.typing());
    }

    #[test]
    fn start_then_deltas_concatenate() {
        let mut state = connected();
        let _ = state.apply_frame(r#"{"type":"start","role":"assistant"}"#);
        let _ = state.apply_frame(r#"{"type":"delta","delta":"ab"}"#);
        let _ = state.apply_frame(r#"{"type":"delta","delta":"cd"}"#);

        let last = state.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "abcd");
    }

    #[test]
    fn end_clears_stream_without_mutation() {
        let mut state = connected();
        let _ = state.apply(ServerEvent::Start {
            role: Role::Assistant,
        });
        let _ = state.apply(ServerEvent::Delta { delta: "x".into() });
        let before = state.messages().to_vec();

        assert_eq!(state.apply(ServerEvent::End), ViewChange::StreamEnded(Some(0)));
        assert_eq!(state.messages(), before.as_slice());
        assert_eq!(state.streaming_index(), None);
    }

    #[test]
    fn delta_without_stream_is_dropped() {
        let mut state = connected().with_greeting("Tere!");
        assert_eq!(
            state.apply(ServerEvent::Delta {
                delta: "lost".into()
            }),
            ViewChange::None
        );
        assert_eq!(state.messages()[0].content, "Tere!");
    }

    #[test]
    fn delta_targets_streaming_message_not_latest() {
        let mut state = connected();
        let _ = state.apply(ServerEvent::Start {
            role: Role::Assistant,
        });
        // A user message lands while the reply streams.
        let sub = state.submit("interrupt").unwrap();
        let _ = state.mark_delivery(sub.index, Delivery::Sent);
        let change = state.apply(ServerEvent::Delta { delta: "ok".into() });

        assert_eq!(
            change,
            ViewChange::Appended {
                index: 0,
                delta: "ok".into()
            }
        );
        assert_eq!(state.messages()[0].content, "ok");
        assert_eq!(state.messages()[1].content, "interrupt");
    }

    #[test]
    fn unparseable_frames_ignored() {
        let mut state = connected();
        assert_eq!(state.apply_frame("garbage"), ViewChange::None);
        assert_eq!(state.apply_frame(r#"{"type":"ping"}"#), ViewChange::None);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn hello_is_inert() {
        let mut state = connected();
        let change = state.apply(ServerEvent::hello());
        assert!(matches!(change, ViewChange::Hello(_)));
        assert!(state.messages().is_empty());
    }

    #[test]
    fn server_error_is_recorded_not_appended() {
        let mut state = connected();
        let change = state.apply(ServerEvent::error("Invalid JSON"));
        assert_eq!(change, ViewChange::ServerError("Invalid JSON".into()));
        assert_eq!(state.last_error(), Some("Invalid JSON"));
        assert!(state.messages().is_empty());
    }

    #[test]
    fn submit_blank_is_noop() {
        let mut state = connected();
        assert!(state.submit("   \n\t").is_none());
        assert!(state.messages().is_empty());
    }

    #[test]
    fn submit_when_connected() {
        let mut state = connected();
        let sub = state.submit("  hi  ").unwrap();
        assert_eq!(sub.index, 0);
        assert_eq!(
            sub.event,
            Some(ClientEvent::UserMessage { text: "hi".into() })
        );
        let msg = &state.messages()[0];
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.delivery, Some(Delivery::Pending));

        let change = state.mark_delivery(0, Delivery::Sent);
        assert!(change.scrolls());
        assert_eq!(state.messages()[0].delivery, Some(Delivery::Sent));
    }

    #[test]
    fn submit_when_disconnected_is_local_and_failed() {
        let mut state = ChatState::new();
        let _ = state.on_close();
        let sub = state.submit("hi").unwrap();
        assert!(sub.event.is_none());
        assert_eq!(state.messages()[0].delivery, Some(Delivery::Failed));
    }

    #[test]
    fn mark_delivery_ignores_assistant_messages() {
        let mut state = connected().with_greeting("hello");
        assert_eq!(state.mark_delivery(0, Delivery::Sent), ViewChange::None);
        assert_eq!(state.mark_delivery(9, Delivery::Sent), ViewChange::None);
    }

    #[test]
    fn close_abandons_stream() {
        let mut state = connected();
        let _ = state.apply(ServerEvent::Typing { value: true });
        let _ = state.apply(ServerEvent::Start {
            role: Role::Assistant,
        });
        let _ = state.on_close();
        assert!(!state.typing());
        assert_eq!(state.streaming_index(), None);
    }

    #[test]
    fn scroll_on_transcript_and_typing_changes() {
        assert!(ViewChange::Typing(false).scrolls());
        assert!(ViewChange::MessageAdded(0).scrolls());
        assert!(
            ViewChange::Appended {
                index: 0,
                delta: "x".into()
            }
            .scrolls()
        );
        assert!(!ViewChange::None.scrolls());
        assert!(!ViewChange::Status(ConnectionStatus::Connected).scrolls());
    }
}
