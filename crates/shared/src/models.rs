//! Ticket pool data models as they appear on the wire.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Tickets ---

/// Booking status of a ticket.
///
/// Known statuses are matched without regard to case (the backend writes
/// `Available` and `Booked`) and serialize in upper case. Values this client
/// does not know about are kept verbatim so a new server-side status never
/// breaks snapshot parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    Available,
    Booked,
    Other(String),
}

impl TicketStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TicketStatus::Available => "AVAILABLE",
            TicketStatus::Booked => "BOOKED",
            TicketStatus::Other(raw) => raw,
        }
    }

    pub fn is_booked(&self) -> bool {
        matches!(self, TicketStatus::Booked)
    }
}

impl From<String> for TicketStatus {
    fn from(raw: String) -> Self {
        if raw.eq_ignore_ascii_case("AVAILABLE") {
            TicketStatus::Available
        } else if raw.eq_ignore_ascii_case("BOOKED") {
            TicketStatus::Booked
        } else {
            TicketStatus::Other(raw)
        }
    }
}

impl From<TicketStatus> for String {
    fn from(status: TicketStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned ticket identity.
///
/// The backend issues string ids such as `VEND001-1`; numeric ids are accepted
/// too and kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "WireTicketId", into = "String")]
pub struct TicketId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTicketId {
    Text(String),
    Number(i64),
}

impl TicketId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<WireTicketId> for TicketId {
    fn from(wire: WireTicketId) -> Self {
        match wire {
            WireTicketId::Text(id) => TicketId(id),
            WireTicketId::Number(id) => TicketId(id.to_string()),
        }
    }
}

impl From<String> for TicketId {
    fn from(id: String) -> Self {
        TicketId(id)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        TicketId(id.to_string())
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.0
    }
}

impl PartialEq<str> for TicketId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TicketId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub event_name: String,
    pub price: f64,
    #[serde(default)]
    pub time_duration: String,
    /// Event date as sent by the server (normally `YYYY-MM-DD`).
    #[serde(default)]
    pub date: String,
    pub vendor_id: String,
    pub ticket_status: TicketStatus,
    /// Set once the ticket has been booked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

impl Ticket {
    /// Parse the event date, accepting either a bare date or an ISO timestamp.
    pub fn event_date(&self) -> Option<NaiveDate> {
        let day = self.date.get(..10).unwrap_or(&self.date);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

/// A complete, authoritative view of every ticket in the pool at one moment.
///
/// Each snapshot supersedes the previous one in full. There is no delta form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TicketSnapshot(Vec<Ticket>);

impl TicketSnapshot {
    pub fn new(tickets: Vec<Ticket>) -> Self {
        Self(tickets)
    }

    /// Parse a snapshot from a JSON array body.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Ticket>> for TicketSnapshot {
    fn from(tickets: Vec<Ticket>) -> Self {
        Self(tickets)
    }
}

impl FromIterator<Ticket> for TicketSnapshot {
    fn from_iter<I: IntoIterator<Item = Ticket>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// --- Aggregates ---

/// Ticket counts keyed by event name, as returned by the ticket-pool endpoints.
pub type TicketCounts = BTreeMap<String, u64>;
