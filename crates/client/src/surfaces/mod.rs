//! Surfaces: the dashboard and the vendor and customer consoles.
//!
//! Each surface owns its state and its live session. Nothing is shared between
//! surfaces beyond the session factory that opens their connections.

mod live;
mod view;

pub use live::{LiveSurface, EMPTY_POOL_NOTICE, FETCH_FAILED_NOTICE};
pub use view::{Notice, NoticeLevel, SurfaceKind, SurfaceStatus, SurfaceView};
