//! Ticket Pool Client - live views of the ticket pool
//!
//! This crate keeps local views of a ticket pool in sync with the backend:
//! an initial REST fetch, then ticket snapshots and activity logs pushed over
//! SockJS/STOMP.

pub mod api_client;
pub mod config;
pub mod error;
pub mod logging;
pub mod stores;
pub mod surfaces;
pub mod ws;

pub use api_client::{ApiClient, SnapshotSource};
pub use config::ClientConfig;
pub use error::TransportError;
pub use stores::{LogHistory, TicketBoard};
pub use surfaces::{LiveSurface, Notice, NoticeLevel, SurfaceKind, SurfaceStatus, SurfaceView};
pub use ws::{SessionFactory, SessionHandle};
