//! Real-time sync with the ticket pool broker.
//!
//! This module provides:
//! - Transport sessions over SockJS/STOMP with fixed-delay auto-reconnect
//! - The two live feeds (ticket snapshots, activity log lines)
//! - A session factory that hands each caller one exclusive session handle
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │               SessionFactory               │
//! │   connect(on_snapshot, on_log) -> handle   │
//! └────────────────────────────────────────────┘
//!                       │
//!                       ▼
//!              ┌─────────────────┐
//!              │TransportSession │  one driver task,
//!              │  (per handle)   │  reconnects every 5s
//!              └─────────────────┘
//!                       │ Connector (SockJS or in-memory)
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   /topic/ticketpool           /topic/logs
//!   JSON -> TicketSnapshot      text -> String
//!          │                         │
//!          └────────────┬────────────┘
//!                       ▼
//!              ┌─────────────────┐
//!              │  LiveSurface    │  (surfaces module)
//!              └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let factory = SessionFactory::new(&config);
//! let mut handle = Some(factory.connect(
//!     |snapshot| println!("{} tickets", snapshot.len()),
//!     |line| println!("log: {line}"),
//! ));
//! // ...
//! ws::close(&mut handle);
//! ```

mod factory;
mod feeds;
mod session;
mod transport;

pub use factory::{close, SessionFactory, SessionHandle};
pub use feeds::{LiveFeeds, LogHandler, SnapshotHandler};
pub use session::{
    ConnectionState, MessageHandler, ReadyHook, ReconnectConfig, SessionOptions, Subscriber,
    TransportSession,
};
pub use transport::{
    sockjs_transport_url, websocket_url, Connector, FrameSink, FrameStream, Link, MemoryBroker,
    MemoryConnector, MemoryPeer, SockJsConnector,
};
