//! Stream responder: turns one inbound frame into an ordered event sequence.
//!
//! For a non-empty `user_message` the emitted sequence is
//! `typing{true}`, `start`, `delta`*, `end`, `typing{false}`. Malformed and
//! unknown frames get a single `error` event; blank messages get nothing.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use murmur_core::protocol::{
    Inbound, ProtocolError, Role, STREAMING_FAILED, ServerEvent, parse_inbound,
};
use murmur_core::reply::{MockReply, ReplySource, fragment};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::metrics::{CYCLES_FAILED_TOTAL, CYCLES_TOTAL, FRAMES_REJECTED_TOTAL};

/// Errors from emitting an event to a client.
///
/// A closed connection is not an error: sinks drop events silently once the
/// connection is no longer open.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
    /// The event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for server events on one connection.
pub trait EventSink: Send + Sync {
    /// Send `event` if the connection is open, otherwise drop it and return `Ok`.
    fn emit(&self, event: &ServerEvent) -> Result<(), SinkError>;
}

/// Where a response cycle is in its sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    /// No cycle running.
    Idle,
    /// `typing{true}` sent.
    TypingOn,
    /// Between `start` and the last `delta`.
    Streaming,
    /// `end` sent.
    Ending,
    /// `typing{false}` sent.
    TypingOff,
}

/// How a response cycle finished.
#[derive(Debug)]
pub enum CycleOutcome {
    /// All fragments and `end` were emitted.
    Completed {
        /// Number of `delta` events emitted.
        fragments: usize,
    },
    /// Emission failed mid-stream and the cycle was abandoned.
    Failed {
        /// Number of `delta` events emitted before the failure.
        fragments: usize,
        /// The emission error.
        error: SinkError,
    },
}

/// State for one streamed reply: the text, its fragments and a cursor.
#[derive(Debug)]
pub struct ResponseCycle {
    reply: String,
    fragments: Vec<String>,
    cursor: usize,
    phase: CyclePhase,
}

impl ResponseCycle {
    /// Prepare a cycle streaming `reply` in fragments of `fragment_chars`.
    pub fn new(reply: String, fragment_chars: usize) -> Self {
        let fragments = fragment(&reply, fragment_chars);
        Self {
            reply,
            fragments,
            cursor: 0,
            phase: CyclePhase::Idle,
        }
    }

    /// Full reply text.
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Fragments in emission order.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Number of fragments emitted so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current phase.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        trace!(from = ?self.phase, to = ?phase, "cycle phase");
        self.phase = phase;
    }

    /// Run the cycle against `sink`, pausing `delay` before each fragment.
    ///
    /// On a mid-stream failure, reports `Streaming failed` once and still
    /// attempts `typing{false}`; `end` is not sent.
    pub async fn run<S: EventSink + ?Sized>(&mut self, sink: &S, delay: Duration) -> CycleOutcome {
        self.enter(CyclePhase::TypingOn);
        emit_best_effort(sink, &ServerEvent::Typing { value: true });

        let outcome = match self.stream(sink, delay).await {
            Ok(()) => CycleOutcome::Completed {
                fragments: self.cursor,
            },
            Err(error) => {
                self.enter(CyclePhase::Idle);
                warn!(
                    error = %error,
                    sent = self.cursor,
                    total = self.fragments.len(),
                    "streaming failed"
                );
                counter!(CYCLES_FAILED_TOTAL).increment(1);
                emit_best_effort(sink, &ServerEvent::error(STREAMING_FAILED));
                CycleOutcome::Failed {
                    fragments: self.cursor,
                    error,
                }
            }
        };

        if self.phase == CyclePhase::Ending {
            self.enter(CyclePhase::TypingOff);
        }
        emit_best_effort(sink, &ServerEvent::Typing { value: false });
        self.enter(CyclePhase::Idle);
        outcome
    }

    async fn stream<S: EventSink + ?Sized>(
        &mut self,
        sink: &S,
        delay: Duration,
    ) -> Result<(), SinkError> {
        self.enter(CyclePhase::Streaming);
        sink.emit(&ServerEvent::Start {
            role: Role::Assistant,
        })?;

        while let Some(delta) = self.fragments.get(self.cursor).cloned() {
            tokio::time::sleep(delay).await;
            sink.emit(&ServerEvent::Delta { delta })?;
            self.cursor += 1;
        }

        sink.emit(&ServerEvent::End)?;
        self.enter(CyclePhase::Ending);
        Ok(())
    }
}

/// Result of handling one inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The frame was rejected and an `error` event was sent.
    Rejected(ProtocolError),
    /// A blank `user_message`; nothing was sent.
    Ignored,
    /// A response cycle ran.
    Cycle(CycleOutcome),
}

/// Handles inbound frames for a connection.
#[derive(Clone)]
pub struct Responder {
    source: Arc<dyn ReplySource>,
    fragment_chars: usize,
    fragment_delay: Duration,
}

impl Responder {
    /// Create a responder with an explicit reply source.
    pub fn new(
        source: Arc<dyn ReplySource>,
        fragment_chars: usize,
        fragment_delay: Duration,
    ) -> Self {
        Self {
            source,
            fragment_chars,
            fragment_delay,
        }
    }

    /// Mock responder using the configured fragment size and delay.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            Arc::new(MockReply),
            config.fragment_chars,
            config.fragment_delay(),
        )
    }

    /// Handle one raw text frame, emitting the resulting events to `sink`.
    pub async fn handle_frame<S: EventSink + ?Sized>(&self, raw: &str, sink: &S) -> FrameOutcome {
        let text = match parse_inbound(raw) {
            Ok(Inbound::UserMessage { text }) => text,
            Err(e) => {
                debug!(reason = %e, len = raw.len(), "rejected inbound frame");
                let reason = match e {
                    ProtocolError::InvalidJson => "invalid_json",
                    ProtocolError::UnknownType => "unknown_type",
                };
                counter!(FRAMES_REJECTED_TOTAL, "reason" => reason).increment(1);
                emit_best_effort(sink, &ServerEvent::error(e));
                return FrameOutcome::Rejected(e);
            }
        };

        if text.is_empty() {
            trace!("ignoring blank user message");
            return FrameOutcome::Ignored;
        }

        debug!(chars = text.chars().count(), "starting response cycle");
        counter!(CYCLES_TOTAL).increment(1);

        let mut cycle = ResponseCycle::new(self.source.reply(&text), self.fragment_chars);
        let outcome = cycle.run(sink, self.fragment_delay).await;
        if let CycleOutcome::Completed { fragments } = &outcome {
            debug!(fragments, "response cycle complete");
        }
        FrameOutcome::Cycle(outcome)
    }
}

fn emit_best_effort<S: EventSink + ?Sized>(sink: &S, event: &ServerEvent) {
    if let Err(e) = sink.emit(event) {
        debug!(event_type = event.event_type(), error = %e, "failed to emit event");
    }
}
