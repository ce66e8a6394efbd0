//! Client error types.

use thiserror::Error;

/// Errors from the client transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket handshake failed.
    #[error("failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    /// The channel is not open.
    #[error("connection is not open")]
    NotOpen,
    /// The outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
    /// An outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    /// Terminal I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_open_display() {
        assert_eq!(ClientError::NotOpen.to_string(), "connection is not open");
    }

    #[test]
    fn queue_full_display() {
        assert_eq!(ClientError::QueueFull.to_string(), "outbound queue full");
    }

    #[test]
    fn io_error_from_conversion() {
        let err: ClientError = std::io::Error::other("boom").into();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(err.to_string().contains("boom"));
    }
}
