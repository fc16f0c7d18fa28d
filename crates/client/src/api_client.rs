//! HTTP client for the ticket pool REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use ticketpool_shared::{ApiError, TicketCounts, TicketSnapshot};

/// Where a surface gets its initial full view of the pool.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_tickets(&self) -> Result<TicketSnapshot, ApiError>;
}

/// HTTP client for the REST boundary of the ticket pool backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Make a GET request and decode the JSON response
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let text = read_body(resp).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make a body-less POST request and return the plain-text response
    pub async fn post_text(&self, path: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        read_body(resp).await
    }

    // --- Ticket pool ---

    /// Every ticket currently in the pool
    pub async fn all_tickets(&self) -> Result<TicketSnapshot, ApiError> {
        self.get_json("tickets/all").await
    }

    /// Available tickets per event, across all vendors
    pub async fn available_by_event(&self) -> Result<TicketCounts, ApiError> {
        self.get_json("ticket-pool/available-tickets/event").await
    }

    /// Available tickets per event for one vendor
    pub async fn available_by_vendor(&self, vendor_id: &str) -> Result<TicketCounts, ApiError> {
        self.get_json(&format!("ticket-pool/available-tickets/vendor/{}", segment(vendor_id)))
            .await
    }

    /// Booked tickets per event, across all customers
    pub async fn booked_by_event(&self) -> Result<TicketCounts, ApiError> {
        self.get_json("ticket-pool/booked-tickets/event").await
    }

    /// Booked tickets per event for one customer
    pub async fn booked_by_customer(&self, customer_id: &str) -> Result<TicketCounts, ApiError> {
        self.get_json(&format!("ticket-pool/booked-tickets/customer/{}", segment(customer_id)))
            .await
    }

    // --- Admin ---

    /// Pause every vendor and customer worker. Returns the server's confirmation.
    pub async fn stop_all_activity(&self) -> Result<String, ApiError> {
        self.post_text("admin/stop-all-activity").await
    }

    /// Resume every vendor and customer worker. Returns the server's confirmation.
    pub async fn resume_all_activity(&self) -> Result<String, ApiError> {
        self.post_text("admin/resume-all-activity").await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for ApiClient {
    async fn fetch_tickets(&self) -> Result<TicketSnapshot, ApiError> {
        self.all_tickets().await
    }
}

async fn read_body(resp: reqwest::Response) -> Result<String, ApiError> {
    let status = resp.status().as_u16();
    let is_success = resp.status().is_success();
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

    if !is_success {
        return Err(ApiError::Http { status, body: text });
    }
    Ok(text)
}

/// Percent-encode an id for use as a single path segment.
fn segment(id: &str) -> String {
    let Ok(mut url) = url::Url::parse("http://segment.invalid/") else {
        return id.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(id);
    }
    url.path().trim_start_matches('/').to_string()
}
