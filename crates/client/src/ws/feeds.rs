//! The two live feeds carried by every session: ticket snapshots and log events.

use std::sync::Arc;

use ticketpool_shared::{TicketSnapshot, LOG_TOPIC, TICKET_POOL_TOPIC};

use super::session::Subscriber;

pub type SnapshotHandler = Arc<dyn Fn(TicketSnapshot) + Send + Sync>;
pub type LogHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Handler pair for one session's feeds.
#[derive(Clone)]
pub struct LiveFeeds {
    on_snapshot: SnapshotHandler,
    on_log: LogHandler,
}

impl LiveFeeds {
    pub fn new(
        on_snapshot: impl Fn(TicketSnapshot) + Send + Sync + 'static,
        on_log: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_snapshot: Arc::new(on_snapshot),
            on_log: Arc::new(on_log),
        }
    }

    /// Register both topics on the current connection.
    ///
    /// Snapshot bodies that fail to parse are logged and dropped without
    /// reaching the handler. Log bodies are passed through untouched.
    pub fn subscribe(&self, subscriber: &mut Subscriber) {
        let on_snapshot = Arc::clone(&self.on_snapshot);
        subscriber.subscribe(TICKET_POOL_TOPIC, move |body| {
            match TicketSnapshot::from_json(body) {
                Ok(snapshot) => on_snapshot(snapshot),
                Err(e) => crate::log_error!("Error parsing ticket pool message: {}", e),
            }
        });

        let on_log = Arc::clone(&self.on_log);
        subscriber.subscribe(LOG_TOPIC, move |body| on_log(body.to_string()));
    }
}
