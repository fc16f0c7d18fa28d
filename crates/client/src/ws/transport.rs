//! Raw broker links: how a transport session reaches the broker.
//!
//! A [`Connector`] turns an endpoint into a [`Link`], a sink and a stream of
//! STOMP text chunks. [`SockJsConnector`] speaks SockJS over a real WebSocket;
//! [`MemoryConnector`] hands the other end of each link to an in-process
//! [`MemoryBroker`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{future, stream, Sink, SinkExt, Stream, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use ticketpool_shared::sockjs::{self, SockJsFrame};
use ticketpool_shared::stomp::{self, Command, Frame, HeartBeat};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use url::Url;

use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// One open connection to the broker, carrying STOMP text in both directions.
pub struct Link {
    pub outbound: FrameSink,
    pub inbound: FrameStream,
}

/// Opens links to a broker endpoint. Called once per (re)connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError>;
}

// --- SockJS over WebSocket ---

/// Connects through the SockJS `websocket` transport of a SockJS endpoint.
#[derive(Debug, Clone)]
pub struct SockJsConnector {
    connect_timeout: Duration,
}

impl SockJsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for SockJsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for SockJsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let url = websocket_url(endpoint)?;
        crate::log_debug!("Opening SockJS websocket transport at {}", url);

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::ConnectTimeout(self.connect_timeout.as_millis() as u64))??;

        let (write, read) = ws_stream.split();
        let outbound = write.with(|frame: String| {
            future::ready(
                sockjs::encode_messages(&[frame])
                    .map(Message::text)
                    .map_err(TransportError::from),
            )
        });
        let inbound = read.flat_map(|message| stream::iter(unwrap_sockjs(message)));

        Ok(Link {
            outbound: Box::pin(outbound),
            inbound: Box::pin(inbound),
        })
    }
}

/// Build the SockJS raw-websocket URL for an endpoint with fresh session ids.
pub fn websocket_url(endpoint: &str) -> Result<Url, TransportError> {
    let (server_id, session_id) = session_ids();
    sockjs_transport_url(endpoint, &server_id, &session_id)
}

/// `http://host/ws` becomes `ws://host/ws/<server_id>/<session_id>/websocket`.
pub fn sockjs_transport_url(
    endpoint: &str,
    server_id: &str,
    session_id: &str,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(endpoint)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(TransportError::Endpoint(endpoint.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::Endpoint(endpoint.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| TransportError::Endpoint(endpoint.to_string()))?
        .pop_if_empty()
        .extend([server_id, session_id, "websocket"]);
    Ok(url)
}

fn session_ids() -> (String, String) {
    let mut rng = rand::thread_rng();
    let server_id = format!("{:03}", rng.gen_range(0..1000));
    let session_id: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    (server_id, session_id)
}

/// Flatten one WebSocket message into the STOMP chunks it carries.
fn unwrap_sockjs(
    message: Result<Message, tungstenite::Error>,
) -> Vec<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => match sockjs::decode(text.as_str()) {
            Ok(SockJsFrame::Open) => {
                crate::log_debug!("SockJS session open");
                Vec::new()
            }
            Ok(SockJsFrame::Heartbeat) => Vec::new(),
            Ok(SockJsFrame::Messages(messages)) => messages.into_iter().map(Ok).collect(),
            Ok(SockJsFrame::Close { code, reason }) => {
                vec![Err(TransportError::Closed { code, reason })]
            }
            Err(e) => {
                crate::log_warn!("Dropping malformed SockJS frame: {}", e);
                Vec::new()
            }
        },
        Ok(Message::Close(frame)) => {
            let (code, reason) = frame
                .map(|f| (u16::from(f.code), f.reason.to_string()))
                .unwrap_or((1005, String::new()));
            vec![Err(TransportError::Closed { code, reason })]
        }
        Ok(_) => Vec::new(),
        Err(e) => vec![Err(e.into())],
    }
}

// --- In-process broker ---

/// Connector whose links end at a [`MemoryBroker`] in the same process.
#[derive(Clone)]
pub struct MemoryConnector {
    accepted: UnboundedSender<MemoryPeer>,
    opens: Arc<AtomicUsize>,
    refusing: Arc<AtomicBool>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryBroker) {
        let (accepted_tx, accepted_rx) = unbounded();
        let opens = Arc::new(AtomicUsize::new(0));
        let refusing = Arc::new(AtomicBool::new(false));
        let connector = Self {
            accepted: accepted_tx,
            opens: Arc::clone(&opens),
            refusing: Arc::clone(&refusing),
        };
        let broker = MemoryBroker {
            accepted: accepted_rx,
            opens,
            refusing,
        };
        (connector, broker)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Link, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                code: 1006,
                reason: "connection refused".to_string(),
            });
        }

        let (to_client, inbound) = unbounded::<Result<String, TransportError>>();
        let (outbound, from_client) = unbounded::<String>();
        let peer = MemoryPeer {
            to_client,
            from_client,
            subscriptions: HashMap::new(),
            next_message: 0,
        };
        self.accepted
            .unbounded_send(peer)
            .map_err(|_| TransportError::LinkGone)?;

        Ok(Link {
            outbound: Box::pin(outbound.sink_map_err(|_| TransportError::LinkGone)),
            inbound: Box::pin(inbound),
        })
    }
}

/// Accepting side of a [`MemoryConnector`].
pub struct MemoryBroker {
    accepted: UnboundedReceiver<MemoryPeer>,
    opens: Arc<AtomicUsize>,
    refusing: Arc<AtomicBool>,
}

impl MemoryBroker {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.next().await
    }

    /// Number of connection attempts made so far, refused ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// While set, connection attempts fail as if the broker were down.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

/// Broker end of one in-memory link. Dropping it drops the connection.
pub struct MemoryPeer {
    to_client: UnboundedSender<Result<String, TransportError>>,
    from_client: UnboundedReceiver<String>,
    subscriptions: HashMap<String, String>,
    next_message: u64,
}

impl MemoryPeer {
    pub fn send_raw(&self, chunk: impl Into<String>) -> bool {
        self.to_client.unbounded_send(Ok(chunk.into())).is_ok()
    }

    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send_raw(frame.encode())
    }

    /// Next chunk the client sent, heart-beats included.
    pub async fn recv_raw(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Next frame the client sent, skipping heart-beats.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        while let Some(chunk) = self.from_client.next().await {
            if let Ok(frames) = stomp::decode_frames(&chunk) {
                if let Some(frame) = frames.into_iter().next() {
                    return Some(frame);
                }
            }
        }
        None
    }

    /// Play the broker side of a STOMP handshake.
    ///
    /// Waits for CONNECT, answers CONNECTED with `heart_beat`, then collects
    /// `subscriptions` SUBSCRIBE frames. Returns destination → subscription id.
    pub async fn accept_session(
        &mut self,
        heart_beat: HeartBeat,
        subscriptions: usize,
    ) -> Option<HashMap<String, String>> {
        let connect = self.recv_frame().await?;
        if !matches!(connect.command, Command::Connect | Command::Stomp) {
            return None;
        }
        self.send_frame(&Frame::connected("1.2", heart_beat));

        let mut subscribed = HashMap::new();
        while subscribed.len() < subscriptions {
            let frame = self.recv_frame().await?;
            if frame.command != Command::Subscribe {
                continue;
            }
            if let (Some(destination), Some(id)) = (frame.get("destination"), frame.get("id")) {
                subscribed.insert(destination.to_string(), id.to_string());
            }
        }
        self.subscriptions = subscribed.clone();
        Some(subscribed)
    }

    /// Send a MESSAGE on `destination` to the client's subscription for it.
    /// Returns false when the client never subscribed there.
    pub fn publish(&mut self, destination: &str, body: &str) -> bool {
        let Some(id) = self.subscriptions.get(destination) else {
            return false;
        };
        self.next_message += 1;
        let message_id = format!("msg-{}", self.next_message);
        let frame = Frame::message(destination, id, &message_id, body);
        self.send_frame(&frame)
    }
}
