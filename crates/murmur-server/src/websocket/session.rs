//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use murmur_core::protocol::ServerEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::responder::{EventSink, Responder};

/// Everything a session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Handles inbound frames.
    pub responder: Responder,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
    /// Inbound frames buffered while a cycle runs.
    pub inbound_queue: usize,
    /// Outbound events buffered for the writer.
    pub outbound_queue: usize,
    /// Interval between Ping frames.
    pub ping_interval: Duration,
    /// Disconnect after this long without a Pong.
    pub pong_timeout: Duration,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Sends `hello`
/// 2. Queues inbound text frames; a single responder task handles them in
///    arrival order, so one cycle finishes before the next frame is read
/// 3. Forwards outbound events to the socket, with periodic Ping frames
/// 4. On disconnect, closes the connection so a running cycle drops the rest
///    of its events
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(ws: WebSocket, conn_id: String, ctx: SessionContext) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(ctx.outbound_queue.max(1));
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));
    let session_token = ctx.shutdown.child_token();

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    ctx.registry.add(connection.clone());

    if let Err(e) = connection.emit(&ServerEvent::hello()) {
        warn!(error = %e, "failed to queue hello");
    }

    // Outbound forwarder with periodic Ping frames.
    let outbound_conn = connection.clone();
    let outbound_token = session_token.clone();
    let ping_interval = ctx.ping_interval;
    let pong_timeout = ctx.pong_timeout;
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_token.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        outbound_conn.close();
        outbound_token.cancel();
    });

    // Inbound frames are handled one at a time, in order.
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(ctx.inbound_queue.max(1));
    let responder_conn = connection.clone();
    let responder = ctx.responder.clone();
    let responder_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if !responder_conn.is_open() {
                debug!("connection closed, discarding queued frames");
                break;
            }
            let _ = responder.handle_frame(&frame, responder_conn.as_ref()).await;
        }
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = session_token.cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            // Invalid UTF-8 decodes lossily and is then rejected as invalid JSON.
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                continue;
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
        };

        if frame_tx.send(text).await.is_err() {
            break;
        }
    }

    // Clean up
    connection.close();
    session_token.cancel();
    drop(frame_tx);
    let _ = outbound.await;
    // A cycle still in flight finishes on its own, dropping its events.
    drop(responder_task);

    let _ = ctx.registry.remove(&conn_id);
    info!(
        dropped_events = connection.drop_count(),
        duration_secs = connection_start.elapsed().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS)
        .record(connection_start.elapsed().as_secs_f64());
}
