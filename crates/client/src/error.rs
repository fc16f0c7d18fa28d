//! Transport-level errors. These stay inside the sync layer; views never see them.

use thiserror::Error;
use ticketpool_shared::ProtocolError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("endpoint {0} cannot carry a SockJS path")]
    Endpoint(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection closed by server ({code}: {reason})")]
    Closed { code: u16, reason: String },
    #[error("timed out connecting after {0}ms")]
    ConnectTimeout(u64),
    #[error("no heart-beat from broker for {0}ms")]
    HeartbeatTimeout(u64),
    #[error("link to broker is gone")]
    LinkGone,
}
