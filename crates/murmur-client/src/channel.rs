//! `WebSocket` channel to a murmur server, over `tokio-tungstenite`.
//!
//! [`connect`] performs the handshake and spawns one task that owns the
//! socket. Outbound frames reach it through a queue held by the
//! [`ChannelHandle`]; inbound frames and lifecycle changes come back as
//! [`ChannelEvent`]s.

use futures::{SinkExt, StreamExt};
use murmur_core::protocol::ClientEvent;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 1024;

/// Something that happened on the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake complete. Always the first event.
    Opened,
    /// A text frame from the server.
    Frame(String),
    /// The channel closed. Always the last event.
    Closed,
    /// The transport failed; `Closed` follows.
    Failed(String),
}

/// Sending half of an open channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl ChannelHandle {
    /// Whether the channel is still open.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.tx.is_closed()
    }

    /// Queue an event for transmission.
    pub fn send(&self, event: &ClientEvent) -> Result<(), ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotOpen);
        }
        let frame = event.to_frame()?;
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => {
                debug!("outbound queue full, frame rejected");
                ClientError::QueueFull
            }
            TrySendError::Closed(_) => ClientError::NotOpen,
        })
    }

    /// Ask the channel to close. `Closed` is delivered once it has.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

/// Connect to `url` and start the channel task.
pub async fn connect(
    url: &str,
) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), ClientError> {
    let (ws, _) = connect_async(url).await?;
    info!(%url, "connected");

    let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(EVENT_QUEUE);
    let closed = CancellationToken::new();

    let _ = event_tx.send(ChannelEvent::Opened).await;
    drop(tokio::spawn(channel_loop(ws, out_rx, event_tx, closed.clone())));

    Ok((ChannelHandle { tx: out_tx, closed }, event_rx))
}

#[instrument(skip_all)]
async fn channel_loop(
    ws: WsStream,
    mut out_rx: mpsc::Receiver<String>,
    events: mpsc::Sender<ChannelEvent>,
    closed: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(error = %e, "send failed");
                    let _ = events.send(ChannelEvent::Failed(e.to_string())).await;
                    break;
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(error = %e, "receive failed");
                        let _ = events.send(ChannelEvent::Failed(e.to_string())).await;
                        break;
                    }
                    None => break,
                };
                let text = match msg {
                    Message::Text(text) => text.as_str().to_owned(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Message::Close(_) => {
                        debug!("server closed the channel");
                        break;
                    }
                    _ => continue,
                };
                if events.send(ChannelEvent::Frame(text)).await.is_err() {
                    // Nobody is listening any more.
                    break;
                }
            }
            () = closed.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    closed.cancel();
    let _ = events.send(ChannelEvent::Closed).await;
    info!("disconnected");
}
