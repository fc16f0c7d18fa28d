//! Session factory: one transport session per caller, wired to its feed handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ticketpool_shared::TicketSnapshot;
use tokio::sync::watch;

use super::feeds::LiveFeeds;
use super::session::{ConnectionState, ReadyHook, SessionOptions, Subscriber, TransportSession};
use super::transport::{Connector, SockJsConnector};
use crate::config::ClientConfig;

/// Builds live sessions against one broker endpoint.
pub struct SessionFactory {
    connector: Arc<dyn Connector>,
    endpoint: String,
    options: SessionOptions,
    opened: AtomicU64,
}

impl SessionFactory {
    /// Factory using the SockJS WebSocket transport.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_connector(
            Arc::new(SockJsConnector::new(config.connect_timeout())),
            config,
        )
    }

    pub fn with_connector(connector: Arc<dyn Connector>, config: &ClientConfig) -> Self {
        Self {
            connector,
            endpoint: config.ws_endpoint.clone(),
            options: SessionOptions::from(config),
            opened: AtomicU64::new(0),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Open a session delivering snapshots to `on_snapshot` and log events to
    /// `on_log`. The session stays up, reconnecting as needed, until the
    /// returned handle is closed or dropped.
    pub fn connect(
        &self,
        on_snapshot: impl Fn(TicketSnapshot) + Send + Sync + 'static,
        on_log: impl Fn(String) + Send + Sync + 'static,
    ) -> SessionHandle {
        let feeds = LiveFeeds::new(on_snapshot, on_log);
        let on_ready: ReadyHook = Arc::new(move |subscriber: &mut Subscriber| {
            feeds.subscribe(subscriber)
        });

        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        crate::log_debug!("Opening live session #{} to {}", id, self.endpoint);
        let session = TransportSession::open(
            Arc::clone(&self.connector),
            self.endpoint.clone(),
            self.options.clone(),
            on_ready,
        );

        SessionHandle { id, session }
    }

    /// Number of sessions this factory has opened.
    pub fn sessions_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }
}

/// Exclusive handle on one live session. Closing is idempotent, and dropping
/// the handle closes the session.
pub struct SessionHandle {
    id: u64,
    session: TransportSession,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.session.is_active()
    }

    /// Connection state, for diagnostics.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.session.state()
    }

    /// Stop reconnecting and release the connection.
    pub fn close(&mut self) {
        if self.session.is_active() {
            crate::log_debug!("Closing live session #{}", self.id);
            self.session.deactivate();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Tear down whatever session `slot` holds and clear it. Safe on an empty slot
/// and safe to repeat.
pub fn close(slot: &mut Option<SessionHandle>) {
    if let Some(mut handle) = slot.take() {
        handle.close();
    }
}
