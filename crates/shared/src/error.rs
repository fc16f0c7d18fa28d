//! Shared error types.

use thiserror::Error;

/// Failure to decode a STOMP or SockJS frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown STOMP command: {0:?}")]
    UnknownCommand(String),
    #[error("frame is missing its line terminator")]
    MissingTerminator,
    #[error("frame body is not NUL-terminated")]
    MissingNull,
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),
    #[error("invalid content-length: {0}")]
    ContentLength(String),
    #[error("malformed SockJS frame: {0}")]
    SockJs(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// REST error type for client-side use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}
