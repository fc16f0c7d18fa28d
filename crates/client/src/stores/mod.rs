//! View-local stores. Each surface owns its own instances; nothing here is global.

pub mod logs;
pub mod tickets;

pub use logs::LogHistory;
pub use tickets::TicketBoard;
