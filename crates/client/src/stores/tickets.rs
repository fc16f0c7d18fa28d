//! Local copy of the ticket pool held by one surface.
//!
//! The board only ever holds the most recent snapshot. Updates replace it in
//! full; there is no merging.

use ticketpool_shared::{Ticket, TicketCounts, TicketSnapshot, TicketStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketBoard {
    snapshot: TicketSnapshot,
    /// Number of snapshots applied since the board was created.
    revision: u64,
}

impl TicketBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole board with `snapshot`.
    pub fn replace(&mut self, snapshot: TicketSnapshot) {
        self.snapshot = snapshot;
        self.revision += 1;
    }

    pub fn snapshot(&self) -> &TicketSnapshot {
        &self.snapshot
    }

    pub fn tickets(&self) -> &[Ticket] {
        self.snapshot.tickets()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Tickets released by `vendor_id`, in snapshot order.
    pub fn for_vendor<'a>(&'a self, vendor_id: &'a str) -> impl Iterator<Item = &'a Ticket> + 'a {
        self.tickets().iter().filter(move |t| t.vendor_id == vendor_id)
    }

    /// Tickets booked by `customer_id`, in snapshot order.
    pub fn for_customer<'a>(
        &'a self,
        customer_id: &'a str,
    ) -> impl Iterator<Item = &'a Ticket> + 'a {
        self.tickets()
            .iter()
            .filter(move |t| t.customer_id.as_deref() == Some(customer_id))
    }

    /// Number of tickets per event name with the given status.
    pub fn counts_by_event(&self, status: &TicketStatus) -> TicketCounts {
        let mut counts = TicketCounts::new();
        for ticket in self.tickets().iter().filter(|t| &t.ticket_status == status) {
            *counts.entry(ticket.event_name.clone()).or_default() += 1;
        }
        counts
    }
}
