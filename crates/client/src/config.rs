//! Client configuration.

use std::time::Duration;

use ticketpool_shared::{DEFAULT_API_BASE_URL, DEFAULT_WS_ENDPOINT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SockJS endpoint of the STOMP broker.
    pub ws_endpoint: String,
    /// Base URL for REST calls.
    pub api_base_url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Heart-beat we offer to send, in milliseconds (0 = never).
    pub heartbeat_outgoing_ms: u32,
    /// Heart-beat we ask the broker to send, in milliseconds (0 = never).
    pub heartbeat_incoming_ms: u32,
    /// Upper bound on a single connection attempt.
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            reconnect_delay_ms: 5000,
            heartbeat_outgoing_ms: 10000,
            heartbeat_incoming_ms: 10000,
            connect_timeout_ms: 10000,
        }
    }
}

impl ClientConfig {
    /// Defaults, with the endpoint URLs optionally overridden.
    ///
    /// Environment variables:
    /// - `TICKETPOOL_WS_URL`: broker endpoint (default: "http://localhost:8080/ws")
    /// - `TICKETPOOL_API_URL`: REST base URL (default: "http://localhost:8080/api")
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("TICKETPOOL_WS_URL") {
            config.ws_endpoint = url;
        }
        if let Ok(url) = std::env::var("TICKETPOOL_API_URL") {
            config.api_base_url = url;
        }
        config
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
