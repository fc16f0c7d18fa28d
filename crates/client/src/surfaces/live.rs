//! Live surface lifecycle: initial REST fetch, then one live session until unmount.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::view::{Notice, SurfaceKind, SurfaceStatus, SurfaceView};
use crate::api_client::SnapshotSource;
use crate::ws::{self, ConnectionState, SessionFactory, SessionHandle};
use ticketpool_shared::Ticket;

pub const EMPTY_POOL_NOTICE: &str = "No tickets available in the pool.";
pub const FETCH_FAILED_NOTICE: &str = "Failed to load tickets.";

/// One screen's view of the ticket pool, kept current by its own live session.
///
/// `Unmounted -> FetchingInitial -> Live -> Unmounted`. Mounting starts the
/// initial fetch and opens the session together; whichever result is applied
/// last is what the board shows. Every callback is tied to the mount that
/// created it and is ignored once that mount is over.
pub struct LiveSurface {
    kind: SurfaceKind,
    factory: Arc<SessionFactory>,
    source: Arc<dyn SnapshotSource>,
    view: Arc<watch::Sender<SurfaceView>>,
    session: Option<SessionHandle>,
    fetch: Option<JoinHandle<()>>,
    epoch: u64,
}

impl LiveSurface {
    pub fn new(
        kind: SurfaceKind,
        factory: Arc<SessionFactory>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let (view, _) = watch::channel(SurfaceView::default());
        Self {
            kind,
            factory,
            source,
            view: Arc::new(view),
            session: None,
            fetch: None,
            epoch: 0,
        }
    }

    pub fn kind(&self) -> &SurfaceKind {
        &self.kind
    }

    /// Observe every change to this surface's state.
    pub fn subscribe(&self) -> watch::Receiver<SurfaceView> {
        self.view.subscribe()
    }

    /// Current state.
    pub fn view(&self) -> SurfaceView {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> SurfaceStatus {
        self.view.borrow().status
    }

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// Connection state of the live session, while mounted.
    pub fn connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.session.as_ref().map(SessionHandle::state)
    }

    /// Tickets this surface lists, from the current board.
    pub fn relevant_tickets(&self) -> Vec<Ticket> {
        self.view.borrow().relevant_tickets(&self.kind)
    }

    /// Drain pending notices.
    pub fn take_notices(&self) -> Vec<Notice> {
        let mut taken = Vec::new();
        self.view.send_if_modified(|view| {
            if view.notices.is_empty() {
                return false;
            }
            taken = std::mem::take(&mut view.notices);
            true
        });
        taken
    }

    /// Wait for the next change on `updates` and return the new state along
    /// with the notices it raised. Draining notices is itself a change, so it
    /// is acknowledged here rather than waking the caller a second time.
    /// `None` once the surface is gone.
    pub async fn next_update(
        &self,
        updates: &mut watch::Receiver<SurfaceView>,
    ) -> Option<(SurfaceView, Vec<Notice>)> {
        updates.changed().await.ok()?;
        let mut notices = Vec::new();
        loop {
            notices.extend(self.take_notices());
            let view = updates.borrow_and_update().clone();
            if view.notices.is_empty() {
                return Some((view, notices));
            }
        }
    }

    /// Start the surface: reset its state, open the live session and kick off
    /// the initial fetch. A surface that is already mounted stays as it is.
    ///
    /// Must be called inside a tokio runtime.
    pub fn mount(&mut self) {
        if self.session.is_some() {
            crate::log_warn!("{} is already mounted; keeping its session", self.kind);
            return;
        }

        self.epoch += 1;
        let epoch = self.epoch;
        self.view.send_replace(SurfaceView::mounted(epoch));
        crate::log_info!("Mounting {} (epoch {})", self.kind, epoch);

        let snapshots = Arc::clone(&self.view);
        let logs = Arc::clone(&self.view);
        self.session = Some(self.factory.connect(
            move |snapshot| {
                snapshots.send_if_modified(|view| {
                    if !view.accepts(epoch) {
                        return false;
                    }
                    view.board.replace(snapshot);
                    true
                });
            },
            move |line| {
                logs.send_if_modified(|view| view.accepts(epoch) && view.logs.append(line));
            },
        ));

        let source = Arc::clone(&self.source);
        let view = Arc::clone(&self.view);
        let kind = self.kind.clone();
        self.fetch = Some(tokio::spawn(async move {
            let result = source.fetch_tickets().await;
            view.send_if_modified(|state| {
                if !state.accepts(epoch) {
                    return false;
                }
                match result {
                    Ok(snapshot) => {
                        if snapshot.is_empty() {
                            state.notices.push(Notice::info(EMPTY_POOL_NOTICE));
                        }
                        state.board.replace(snapshot);
                    }
                    Err(e) => {
                        crate::log_error!("Initial ticket fetch for {} failed: {}", kind, e);
                        state.notices.push(Notice::error(FETCH_FAILED_NOTICE));
                    }
                }
                state.status = SurfaceStatus::Live;
                crate::log_debug!("{} is live with {} tickets", kind, state.board.len());
                true
            });
        }));
    }

    /// Stop the surface and release its session. Safe to call at any time,
    /// any number of times.
    pub fn unmount(&mut self) {
        if self.session.is_none() && self.fetch.is_none() {
            return;
        }

        self.view.send_modify(|view| view.status = SurfaceStatus::Unmounted);
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
        ws::close(&mut self.session);
        crate::log_info!("Unmounted {}", self.kind);
    }
}

impl Drop for LiveSurface {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use ticketpool_shared::stomp::{Command, HeartBeat};
    use ticketpool_shared::{ApiError, TicketSnapshot, LOG_TOPIC, TICKET_POOL_TOPIC};
    use tokio::sync::Notify;

    use super::*;
    use crate::config::ClientConfig;
    use crate::surfaces::NoticeLevel;
    use crate::ws::{MemoryBroker, MemoryConnector, MemoryPeer, ReconnectConfig, SessionOptions};

    const WAIT: Duration = Duration::from_secs(5);
    const CONCERT_JSON: &str = r#"[{"ticketId":1,"eventName":"Concert","price":50.0,"timeDuration":"2h","date":"2024-12-01","vendorId":"VEND001","ticketStatus":"AVAILABLE"}]"#;
    const BACKEND_JSON: &str = r#"[{"ticketId":"VEND001-1","eventName":"Concert","price":50.0,"timeDuration":"2h","date":"2024-12-01","vendorId":"VEND001","ticketStatus":"Available","customerId":null}]"#;
    const RELEASED: &str = "Vendor VEND001 released 10 tickets for Concert";

    struct StubSource {
        result: Result<TicketSnapshot, ApiError>,
        gate: Option<Arc<Notify>>,
    }

    impl StubSource {
        fn ok(snapshot: TicketSnapshot) -> Self {
            Self {
                result: Ok(snapshot),
                gate: None,
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(ApiError::Network("connection refused".into())),
                gate: None,
            }
        }

        /// Holds the response back until the returned gate is notified.
        fn gated(snapshot: TicketSnapshot) -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let source = Self {
                result: Ok(snapshot),
                gate: Some(Arc::clone(&gate)),
            };
            (source, gate)
        }
    }

    #[async_trait]
    impl SnapshotSource for StubSource {
        async fn fetch_tickets(&self) -> Result<TicketSnapshot, ApiError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result.clone()
        }
    }

    fn concert() -> TicketSnapshot {
        TicketSnapshot::from_json(CONCERT_JSON).unwrap()
    }

    fn factory() -> (Arc<SessionFactory>, MemoryBroker) {
        let (connector, broker) = MemoryConnector::new();
        let factory = SessionFactory::with_connector(Arc::new(connector), &ClientConfig::default())
            .with_options(SessionOptions {
                reconnect: ReconnectConfig { delay_ms: 20 },
                ..SessionOptions::default()
            });
        (Arc::new(factory), broker)
    }

    fn surface(factory: &Arc<SessionFactory>, source: StubSource) -> LiveSurface {
        LiveSurface::new(SurfaceKind::Dashboard, Arc::clone(factory), Arc::new(source))
    }

    async fn connected_peer(broker: &mut MemoryBroker) -> MemoryPeer {
        let mut peer = tokio::time::timeout(WAIT, broker.accept())
            .await
            .unwrap()
            .unwrap();
        peer.accept_session(HeartBeat::default(), 2).await.unwrap();
        peer
    }

    async fn wait_view(
        rx: &mut watch::Receiver<SurfaceView>,
        check: impl FnMut(&SurfaceView) -> bool,
    ) -> SurfaceView {
        let view = tokio::time::timeout(WAIT, rx.wait_for(check))
            .await
            .expect("surface never reached the expected state")
            .unwrap();
        view.clone()
    }

    #[tokio::test]
    async fn concert_then_duplicate_log_then_empty_pool() {
        let (factory, mut broker) = factory();
        let mut surface = surface(&factory, StubSource::ok(TicketSnapshot::default()));
        let mut rx = surface.subscribe();

        surface.mount();
        let mut peer = connected_peer(&mut broker).await;
        wait_view(&mut rx, |v| v.status == SurfaceStatus::Live).await;
        let notices = surface.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].message, EMPTY_POOL_NOTICE);

        peer.publish(TICKET_POOL_TOPIC, CONCERT_JSON);
        let view = wait_view(&mut rx, |v| v.board.len() == 1).await;
        assert_eq!(view.board.tickets()[0].event_name, "Concert");

        peer.publish(LOG_TOPIC, RELEASED);
        peer.publish(LOG_TOPIC, RELEASED);
        peer.publish(TICKET_POOL_TOPIC, "[]");

        let view = wait_view(&mut rx, |v| v.board.revision() == 3).await;
        assert!(view.board.is_empty());
        assert_eq!(view.logs.entries(), [RELEASED]);
        assert_eq!(view.status, SurfaceStatus::Live);
    }

    #[tokio::test]
    async fn holds_at_most_one_session() {
        let (factory, mut broker) = factory();
        let mut surface = surface(&factory, StubSource::ok(concert()));

        surface.mount();
        surface.mount();
        assert_eq!(factory.sessions_opened(), 1);

        let _peer = connected_peer(&mut broker).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.opens(), 1);
        assert!(surface.is_mounted());
    }

    #[tokio::test]
    async fn unmount_stops_all_delivery() {
        let (factory, mut broker) = factory();
        let (source, gate) = StubSource::gated(concert());
        let mut surface = surface(&factory, source);

        surface.mount();
        assert_eq!(surface.status(), SurfaceStatus::FetchingInitial);
        let mut peer = connected_peer(&mut broker).await;

        surface.unmount();
        surface.unmount();
        assert_eq!(surface.status(), SurfaceStatus::Unmounted);
        assert!(!surface.is_mounted());

        let frame = tokio::time::timeout(WAIT, peer.recv_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Disconnect);

        gate.notify_one();
        peer.publish(TICKET_POOL_TOPIC, CONCERT_JSON);
        peer.publish(LOG_TOPIC, RELEASED);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let view = surface.view();
        assert_eq!(view.board.revision(), 0);
        assert!(view.logs.is_empty());
        assert!(view.notices.is_empty());
        assert_eq!(view.status, SurfaceStatus::Unmounted);
    }

    #[tokio::test]
    async fn malformed_snapshot_leaves_board_untouched() {
        let (factory, mut broker) = factory();
        let mut surface = surface(&factory, StubSource::ok(concert()));
        let mut rx = surface.subscribe();

        surface.mount();
        let mut peer = connected_peer(&mut broker).await;
        let before = wait_view(&mut rx, |v| v.status == SurfaceStatus::Live).await;

        peer.publish(TICKET_POOL_TOPIC, r#"[{"ticketId":"#);
        peer.publish(TICKET_POOL_TOPIC, r#"{"not":"an array"}"#);
        peer.publish(LOG_TOPIC, "marker");

        let after = wait_view(&mut rx, |v| v.logs.len() == 1).await;
        assert_eq!(after.board, before.board);
        assert_eq!(after.board.revision(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_raises_error_notice_once() {
        let (factory, mut broker) = factory();
        let mut surface = surface(&factory, StubSource::failing());
        let mut rx = surface.subscribe();

        surface.mount();
        let mut peer = connected_peer(&mut broker).await;
        let view = wait_view(&mut rx, |v| v.status == SurfaceStatus::Live).await;
        assert!(view.board.is_empty());

        let notices = surface.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, FETCH_FAILED_NOTICE);
        assert!(surface.take_notices().is_empty());

        // Live snapshots still fill the board.
        peer.publish(TICKET_POOL_TOPIC, CONCERT_JSON);
        wait_view(&mut rx, |v| v.board.len() == 1).await;
    }

    #[tokio::test]
    async fn next_update_reports_each_notice_once() {
        let (factory, mut broker) = factory();
        let mut surface = surface(&factory, StubSource::failing());
        let mut rx = surface.subscribe();

        surface.mount();
        let mut peer = connected_peer(&mut broker).await;
        let (view, notices) = loop {
            let update = tokio::time::timeout(WAIT, surface.next_update(&mut rx))
                .await
                .unwrap()
                .unwrap();
            if update.0.status == SurfaceStatus::Live {
                break update;
            }
        };
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, FETCH_FAILED_NOTICE);
        assert!(view.notices.is_empty());
        // Draining the notices must not wake the caller again.
        assert!(!rx.has_changed().unwrap());

        peer.publish(TICKET_POOL_TOPIC, BACKEND_JSON);
        let (view, notices) = tokio::time::timeout(WAIT, surface.next_update(&mut rx))
            .await
            .unwrap()
            .unwrap();
        assert!(notices.is_empty());
        assert_eq!(view.board.tickets()[0].ticket_id, "VEND001-1");
        assert_eq!(view.relevant_tickets(surface.kind()).len(), 1);
    }

    #[tokio::test]
    async fn last_applied_result_wins() {
        let (factory, mut broker) = factory();
        let (source, gate) = StubSource::gated(concert());
        let mut surface = surface(&factory, source);
        let mut rx = surface.subscribe();

        surface.mount();
        let mut peer = connected_peer(&mut broker).await;
        peer.publish(TICKET_POOL_TOPIC, "[]");
        let view = wait_view(&mut rx, |v| v.board.revision() == 1).await;
        assert_eq!(view.status, SurfaceStatus::FetchingInitial);

        gate.notify_one();
        let view = wait_view(&mut rx, |v| v.status == SurfaceStatus::Live).await;
        assert_eq!(view.board.snapshot(), &concert());
        assert_eq!(view.board.revision(), 2);
    }

    #[tokio::test]
    async fn remount_starts_from_a_clean_view() {
        let (factory, mut broker) = factory();
        let mut surface = surface(&factory, StubSource::ok(concert()));
        let mut rx = surface.subscribe();

        surface.mount();
        let mut first = connected_peer(&mut broker).await;
        first.publish(LOG_TOPIC, "from first mount");
        wait_view(&mut rx, |v| v.logs.len() == 1).await;

        surface.unmount();
        surface.mount();
        let mut second = connected_peer(&mut broker).await;
        assert_eq!(factory.sessions_opened(), 2);

        first.publish(LOG_TOPIC, "stale");
        second.publish(LOG_TOPIC, "fresh");
        let view = wait_view(&mut rx, |v| v.epoch == 2 && v.logs.len() == 1).await;
        assert_eq!(view.logs.entries(), ["fresh"]);
    }

    #[tokio::test]
    async fn surfaces_keep_separate_state() {
        let (factory, mut broker) = factory();
        let mut dashboard = surface(&factory, StubSource::ok(TicketSnapshot::default()));
        let mut vendor = LiveSurface::new(
            SurfaceKind::VendorConsole {
                vendor_id: "VEND002".into(),
            },
            Arc::clone(&factory),
            Arc::new(StubSource::ok(concert())),
        );
        let mut dashboard_rx = dashboard.subscribe();
        let mut vendor_rx = vendor.subscribe();

        dashboard.mount();
        let mut dashboard_peer = connected_peer(&mut broker).await;
        vendor.mount();
        let _vendor_peer = connected_peer(&mut broker).await;
        assert_eq!(broker.opens(), 2);

        wait_view(&mut vendor_rx, |v| v.status == SurfaceStatus::Live).await;
        assert_eq!(vendor.view().board.len(), 1);
        assert!(vendor.relevant_tickets().is_empty());

        dashboard_peer.publish(LOG_TOPIC, RELEASED);
        wait_view(&mut dashboard_rx, |v| v.logs.len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(vendor.view().logs.is_empty());
    }
}
