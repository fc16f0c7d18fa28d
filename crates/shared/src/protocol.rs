//! Broker destinations and well-known endpoints of the ticket pool backend.

/// SockJS endpoint exposed by the backend's STOMP broker.
pub const DEFAULT_WS_ENDPOINT: &str = "http://localhost:8080/ws";

/// Base URL of the REST API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Full ticket snapshots, published as a JSON array of tickets.
pub const TICKET_POOL_TOPIC: &str = "/topic/ticketpool";

/// Human-readable log events, published as plain text.
pub const LOG_TOPIC: &str = "/topic/logs";

/// STOMP versions offered in the CONNECT frame, newest first.
pub const STOMP_ACCEPT_VERSIONS: &str = "1.2,1.1,1.0";
