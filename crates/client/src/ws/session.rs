//! Transport session: one broker connection kept alive for as long as the
//! session is active.
//!
//! The session owns a single driver task. The task connects, performs the STOMP
//! handshake, runs the ready hook to (re-)create subscriptions, and dispatches
//! MESSAGE frames to their handlers in arrival order. When the link drops it
//! waits a fixed delay and starts over. Deactivation is the only way out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ticketpool_shared::stomp::{self, Command, Frame, HeartBeat, HEARTBEAT};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::transport::{Connector, FrameSink, Link};
use crate::config::ClientConfig;
use crate::error::TransportError;

/// Receives the body of each MESSAGE on one subscription.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs every time the broker accepts a connection. Subscriptions are
/// connection-scoped, so this is where they must be (re-)created.
pub type ReadyHook = Arc<dyn Fn(&mut Subscriber) + Send + Sync>;

/// Connection state for a transport session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Closed,
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Reconnect behavior. The delay is fixed and attempts never run out.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { delay_ms: 5000 }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub reconnect: ReconnectConfig,
    pub heart_beat: HeartBeat,
    /// Extra headers for the CONNECT frame.
    pub connect_headers: Vec<(String, String)>,
    /// How long the broker has to answer CONNECT before the link is dropped.
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heart_beat: HeartBeat::default(),
            connect_headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            reconnect: ReconnectConfig {
                delay_ms: config.reconnect_delay_ms,
            },
            heart_beat: HeartBeat::new(config.heartbeat_outgoing_ms, config.heartbeat_incoming_ms),
            connect_headers: Vec::new(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

struct Route {
    destination: String,
    handler: MessageHandler,
}

/// Collects the subscriptions a ready hook wants on the current connection.
pub struct Subscriber {
    next_id: u64,
    frames: Vec<Frame>,
    routes: HashMap<String, Route>,
}

impl Subscriber {
    fn starting_at(next_id: u64) -> Self {
        Self {
            next_id,
            frames: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Subscribe `handler` to `destination`; returns the subscription id.
    pub fn subscribe(
        &mut self,
        destination: &str,
        handler: impl Fn(&str) + Send + Sync + 'static,
    ) -> String {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        self.frames.push(Frame::subscribe(&id, destination));
        self.routes.insert(
            id.clone(),
            Route {
                destination: destination.to_string(),
                handler: Arc::new(handler),
            },
        );
        id
    }
}

/// An active broker session. Deactivate it to stop reconnecting and release
/// the connection.
pub struct TransportSession {
    endpoint: String,
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
}

impl TransportSession {
    /// Spawn the driver task and start connecting to `endpoint`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        connector: Arc<dyn Connector>,
        endpoint: impl Into<String>,
        options: SessionOptions,
        on_ready: ReadyHook,
    ) -> Self {
        let endpoint = endpoint.into();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            connector,
            endpoint: endpoint.clone(),
            options,
            on_ready,
            cancel: cancel.clone(),
            state: state_tx,
            next_subscription: 0,
        };
        tokio::spawn(driver.run());

        Self {
            endpoint,
            cancel,
            state: state_rx,
        }
    }

    /// Stop the session. Idempotent.
    pub fn deactivate(&self) {
        if !self.cancel.is_cancelled() {
            crate::log_debug!("Deactivating transport session for {}", self.endpoint);
            self.cancel.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

enum LinkEnd {
    Deactivated,
    Dropped,
}

struct Driver {
    connector: Arc<dyn Connector>,
    endpoint: String,
    options: SessionOptions,
    on_ready: ReadyHook,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    /// Subscription ids keep counting across reconnects.
    next_subscription: u64,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            if attempt == 0 {
                self.state.send_replace(ConnectionState::Connecting);
            } else {
                self.state
                    .send_replace(ConnectionState::Reconnecting { attempt });
            }

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect(&self.endpoint) => result,
            };

            match connected {
                Ok(link) => match self.drive(link, &mut attempt).await {
                    Ok(LinkEnd::Deactivated) => break,
                    Ok(LinkEnd::Dropped) => {
                        crate::log_info!("Disconnected from broker at {}", self.endpoint)
                    }
                    Err(e) => {
                        crate::log_error!("Connection to broker at {} lost: {}", self.endpoint, e)
                    }
                },
                Err(e) => crate::log_error!("Could not reach broker at {}: {}", self.endpoint, e),
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.state.send_replace(ConnectionState::Disconnected);

            let delay = Duration::from_millis(self.options.reconnect.delay_ms);
            crate::log_info!(
                "Reconnecting to {} in {}ms (attempt {})",
                self.endpoint,
                delay.as_millis(),
                attempt + 1
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = attempt.saturating_add(1);
        }

        self.state.send_replace(ConnectionState::Closed);
        crate::log_info!("Transport session for {} closed", self.endpoint);
    }

    /// Run one link until it drops or the session is deactivated.
    async fn drive(&mut self, link: Link, attempt: &mut u32) -> Result<LinkEnd, TransportError> {
        let Link {
            mut outbound,
            mut inbound,
        } = link;

        let mut connect = Frame::connect(self.options.heart_beat);
        connect
            .headers
            .extend(self.options.connect_headers.iter().cloned());
        outbound.send(connect.encode()).await?;

        let mut routes: HashMap<String, Route> = HashMap::new();
        let mut beat: Option<Interval> = None;
        let mut watchdog: Option<Interval> = None;
        let mut silence_limit = Duration::ZERO;
        let mut last_seen = Instant::now();
        let handshake_limit = self.options.connect_timeout;
        let mut handshake_deadline = Some(Instant::now() + handshake_limit);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = outbound.send(Frame::disconnect().encode()).await;
                    let _ = outbound.close().await;
                    return Ok(LinkEnd::Deactivated);
                }
                _ = tick(&mut beat) => {
                    outbound.send(HEARTBEAT.to_string()).await?;
                }
                _ = tick(&mut watchdog) => {
                    if last_seen.elapsed() > silence_limit {
                        return Err(TransportError::HeartbeatTimeout(silence_limit.as_millis() as u64));
                    }
                }
                next = inbound.next() => {
                    let Some(chunk) = next else {
                        return Ok(LinkEnd::Dropped);
                    };
                    let chunk = chunk?;
                    last_seen = Instant::now();

                    let frames = match stomp::decode_frames(&chunk) {
                        Ok(frames) => frames,
                        Err(e) => {
                            crate::log_error!("Discarding malformed STOMP frame from {}: {}", self.endpoint, e);
                            continue;
                        }
                    };

                    for frame in frames {
                        match frame.command {
                            Command::Connected => {
                                *attempt = 0;
                                handshake_deadline = None;
                                let negotiated = self.options.heart_beat.negotiate(frame.get("heart-beat"));
                                beat = every(negotiated.outgoing);
                                watchdog = every(negotiated.incoming);
                                silence_limit = Duration::from_millis(u64::from(negotiated.incoming) * 2);

                                self.state.send_replace(ConnectionState::Connected);
                                crate::log_info!(
                                    "Connected to broker at {} (STOMP {})",
                                    self.endpoint,
                                    frame.get("version").unwrap_or("1.0")
                                );
                                routes = self.establish_subscriptions(&mut outbound).await?;
                            }
                            Command::Message => self.dispatch(&routes, &frame),
                            Command::Error => crate::log_error!(
                                "STOMP error from {}: {} {}",
                                self.endpoint,
                                frame.get("message").unwrap_or("(no message)"),
                                frame.body
                            ),
                            Command::Receipt => crate::log_debug!(
                                "Receipt {}",
                                frame.get("receipt-id").unwrap_or("?")
                            ),
                            other => crate::log_warn!("Ignoring unexpected {} frame", other),
                        }
                    }
                }
                _ = until(handshake_deadline) => {
                    return Err(TransportError::ConnectTimeout(handshake_limit.as_millis() as u64));
                }
            }
        }
    }

    async fn establish_subscriptions(
        &mut self,
        outbound: &mut FrameSink,
    ) -> Result<HashMap<String, Route>, TransportError> {
        let mut subscriber = Subscriber::starting_at(self.next_subscription);
        (self.on_ready)(&mut subscriber);
        self.next_subscription = subscriber.next_id;

        let Subscriber { frames, routes, .. } = subscriber;
        for frame in frames {
            outbound.send(frame.encode()).await?;
        }
        for (id, route) in &routes {
            crate::log_debug!("Subscribed {} to {}", id, route.destination);
        }
        Ok(routes)
    }

    fn dispatch(&self, routes: &HashMap<String, Route>, frame: &Frame) {
        // A deactivated session must not reach its handlers, even for frames
        // already read off the wire.
        if self.cancel.is_cancelled() {
            return;
        }
        let Some(id) = frame.get("subscription") else {
            crate::log_warn!("MESSAGE frame without subscription header");
            return;
        };
        match routes.get(id) {
            Some(route) => (route.handler)(&frame.body),
            None => crate::log_warn!("MESSAGE for unknown subscription {}", id),
        }
    }
}

fn every(period_ms: u32) -> Option<Interval> {
    if period_ms == 0 {
        return None;
    }
    let period = Duration::from_millis(u64::from(period_ms));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ws::transport::{MemoryBroker, MemoryConnector};

    const WAIT: Duration = Duration::from_secs(5);

    fn options(delay_ms: u64) -> SessionOptions {
        SessionOptions {
            reconnect: ReconnectConfig { delay_ms },
            ..SessionOptions::default()
        }
    }

    /// Ready hook that subscribes to `/topic/a` and records every body.
    fn recording_hook() -> (ReadyHook, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: ReadyHook = Arc::new(move |subscriber: &mut Subscriber| {
            let sink = Arc::clone(&sink);
            subscriber.subscribe("/topic/a", move |body| sink.lock().unwrap().push(body.to_string()));
        });
        (hook, seen)
    }

    fn open(broker_delay_ms: u64) -> (TransportSession, MemoryBroker, Arc<Mutex<Vec<String>>>) {
        let (connector, broker) = MemoryConnector::new();
        let (hook, seen) = recording_hook();
        let session = TransportSession::open(Arc::new(connector), "memory", options(broker_delay_ms), hook);
        (session, broker, seen)
    }

    async fn wait_for_state(session: &TransportSession, want: ConnectionState) {
        let mut state = session.state();
        tokio::time::timeout(WAIT, state.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .expect("session state channel closed");
    }

    async fn wait_for_len(seen: &Arc<Mutex<Vec<String>>>, len: usize) {
        tokio::time::timeout(WAIT, async {
            while seen.lock().unwrap().len() < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for messages");
    }

    #[tokio::test]
    async fn handshake_subscribes_and_dispatches_in_order() {
        let (session, mut broker, seen) = open(50);
        let mut peer = broker.accept().await.unwrap();
        let subs = peer.accept_session(HeartBeat::default(), 1).await.unwrap();
        assert_eq!(subs.get("/topic/a").map(String::as_str), Some("sub-0"));
        wait_for_state(&session, ConnectionState::Connected).await;

        assert!(peer.publish("/topic/a", "first"));
        assert!(peer.publish("/topic/a", "second"));
        wait_for_len(&seen, 2).await;
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        session.deactivate();
    }

    #[tokio::test]
    async fn reconnect_resubscribes_with_fresh_ids() {
        let (session, mut broker, seen) = open(20);
        let mut peer = broker.accept().await.unwrap();
        peer.accept_session(HeartBeat::default(), 1).await.unwrap();
        drop(peer);

        let mut peer = tokio::time::timeout(WAIT, broker.accept()).await.unwrap().unwrap();
        let subs = peer.accept_session(HeartBeat::default(), 1).await.unwrap();
        assert_eq!(subs.get("/topic/a").map(String::as_str), Some("sub-1"));
        assert_eq!(broker.opens(), 2);

        peer.publish("/topic/a", "after reconnect");
        wait_for_len(&seen, 1).await;
        session.deactivate();
    }

    #[tokio::test]
    async fn keeps_retrying_while_broker_is_down() {
        let (connector, mut broker) = MemoryConnector::new();
        broker.set_refusing(true);
        let (hook, _seen) = recording_hook();
        let session = TransportSession::open(Arc::new(connector), "memory", options(10), hook);

        tokio::time::timeout(WAIT, async {
            while broker.opens() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session stopped retrying");

        broker.set_refusing(false);
        let mut peer = tokio::time::timeout(WAIT, broker.accept()).await.unwrap().unwrap();
        peer.accept_session(HeartBeat::default(), 1).await.unwrap();
        wait_for_state(&session, ConnectionState::Connected).await;
        session.deactivate();
    }

    #[tokio::test]
    async fn error_frames_and_garbage_do_not_end_the_session() {
        let (session, mut broker, seen) = open(50);
        let mut peer = broker.accept().await.unwrap();
        peer.accept_session(HeartBeat::default(), 1).await.unwrap();

        peer.send_frame(&Frame::error("bad destination", "details"));
        peer.send_raw("NOT A FRAME\n\n\0");
        peer.send_frame(&Frame::message("/topic/a", "sub-99", "m-x", "stray"));
        peer.publish("/topic/a", "still alive");

        wait_for_len(&seen, 1).await;
        assert_eq!(*seen.lock().unwrap(), vec!["still alive"]);
        assert_eq!(broker.opens(), 1);
        session.deactivate();
    }

    #[tokio::test]
    async fn deactivate_sends_disconnect_and_stops() {
        let (session, mut broker, seen) = open(10);
        let mut peer = broker.accept().await.unwrap();
        peer.accept_session(HeartBeat::default(), 1).await.unwrap();
        wait_for_state(&session, ConnectionState::Connected).await;

        session.deactivate();
        session.deactivate();
        assert!(!session.is_active());

        let frame = tokio::time::timeout(WAIT, peer.recv_frame()).await.unwrap().unwrap();
        assert_eq!(frame.command, Command::Disconnect);
        wait_for_state(&session, ConnectionState::Closed).await;

        peer.publish("/topic/a", "too late");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(broker.opens(), 1);
    }

    #[tokio::test]
    async fn unanswered_connect_is_dropped_and_retried() {
        let (connector, mut broker) = MemoryConnector::new();
        let (hook, _seen) = recording_hook();
        let mut opts = options(10);
        opts.connect_timeout = Duration::from_millis(50);
        let session = TransportSession::open(Arc::new(connector), "memory", opts, hook);

        // The first broker reads CONNECT and never answers.
        let mut silent = broker.accept().await.unwrap();
        let connect = tokio::time::timeout(WAIT, silent.recv_frame()).await.unwrap().unwrap();
        assert_eq!(connect.command, Command::Connect);

        let mut peer = tokio::time::timeout(WAIT, broker.accept()).await.unwrap().unwrap();
        assert_eq!(broker.opens(), 2);
        peer.accept_session(HeartBeat::default(), 1).await.unwrap();
        wait_for_state(&session, ConnectionState::Connected).await;

        // Once connected, the deadline no longer applies.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(broker.opens(), 2);
        assert_eq!(*session.state().borrow(), ConnectionState::Connected);
        session.deactivate();
    }

    #[tokio::test]
    async fn sends_heart_beats_and_drops_silent_links() {
        let (connector, mut broker) = MemoryConnector::new();
        let (hook, _seen) = recording_hook();
        let mut opts = options(10);
        opts.heart_beat = HeartBeat::new(20, 40);
        let session = TransportSession::open(Arc::new(connector), "memory", opts, hook);

        let mut peer = broker.accept().await.unwrap();
        peer.accept_session(HeartBeat::new(20, 20), 1).await.unwrap();

        let beat = tokio::time::timeout(WAIT, peer.recv_raw()).await.unwrap().unwrap();
        assert_eq!(beat, HEARTBEAT);

        // The peer never beats back, so the link is declared dead and re-opened.
        let _next = tokio::time::timeout(WAIT, broker.accept()).await.unwrap().unwrap();
        assert_eq!(broker.opens(), 2);
        session.deactivate();
    }
}
