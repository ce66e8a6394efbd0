//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use murmur_core::protocol::ServerEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;
use uuid::Uuid;

use crate::metrics::EVENTS_DROPPED_TOTAL;
use crate::responder::{EventSink, SinkError};

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<String>,
    /// Cleared once the socket is closing; emission is dropped afterwards.
    open: AtomicBool,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has answered since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or Ping) was received.
    last_pong: Mutex<Instant>,
    /// Events dropped because the connection was closed.
    dropped_events: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            open: AtomicBool::new(true),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Generate a fresh connection ID.
    pub fn new_id() -> String {
        format!("conn_{}", Uuid::now_v7())
    }

    /// Whether events sent now would reach the write task.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Mark the connection closed. Later emissions are dropped.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Total events dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn record_drop(&self, event: &ServerEvent) {
        let _ = self.dropped_events.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_DROPPED_TOTAL).increment(1);
        trace!(
            conn_id = %self.id,
            event_type = event.event_type(),
            "connection closed, event dropped"
        );
    }
}

impl EventSink for ClientConnection {
    fn emit(&self, event: &ServerEvent) -> Result<(), SinkError> {
        if !self.is_open() {
            self.record_drop(event);
            return Ok(());
        }

        let frame = event.to_frame()?;
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::QueueFull),
            Err(TrySendError::Closed(_)) => {
                self.close();
                self.record_drop(event);
                Ok(())
            }
        }
    }
}
