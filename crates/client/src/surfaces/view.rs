//! State a surface publishes to whatever renders it.

use std::fmt;

use chrono::{DateTime, Utc};
use ticketpool_shared::Ticket;

use crate::stores::{LogHistory, TicketBoard};

/// Which screen a surface backs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Dashboard,
    VendorConsole { vendor_id: String },
    CustomerConsole { customer_id: String },
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceKind::Dashboard => f.write_str("dashboard"),
            SurfaceKind::VendorConsole { vendor_id } => write!(f, "vendor console ({vendor_id})"),
            SurfaceKind::CustomerConsole { customer_id } => {
                write!(f, "customer console ({customer_id})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurfaceStatus {
    #[default]
    Unmounted,
    FetchingInitial,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient message for the user, shown once and then drained.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Everything one surface shows. Surfaces never share an instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceView {
    pub status: SurfaceStatus,
    pub board: TicketBoard,
    pub logs: LogHistory,
    pub notices: Vec<Notice>,
    /// Mount this state belongs to. Callbacks carrying another epoch are stale.
    pub epoch: u64,
}

impl SurfaceView {
    pub(crate) fn mounted(epoch: u64) -> Self {
        Self {
            status: SurfaceStatus::FetchingInitial,
            epoch,
            ..Self::default()
        }
    }

    /// Whether a callback from mount `epoch` may still change this state.
    pub(crate) fn accepts(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.status != SurfaceStatus::Unmounted
    }

    /// The tickets this kind of surface lists: the whole pool for the
    /// dashboard, otherwise only the console owner's tickets.
    pub fn relevant_tickets(&self, kind: &SurfaceKind) -> Vec<Ticket> {
        match kind {
            SurfaceKind::Dashboard => self.board.tickets().to_vec(),
            SurfaceKind::VendorConsole { vendor_id } => {
                self.board.for_vendor(vendor_id).cloned().collect()
            }
            SurfaceKind::CustomerConsole { customer_id } => {
                self.board.for_customer(customer_id).cloned().collect()
            }
        }
    }
}
