//! Shared types for the ticket pool client: ticket models, the STOMP and
//! SockJS wire codecs, and error types.

pub mod error;
pub mod models;
pub mod protocol;
pub mod sockjs;
pub mod stomp;

pub use error::*;
pub use models::*;
pub use protocol::*;
