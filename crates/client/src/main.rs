//! Ticket pool client - headless live monitor
//!
//! Mounts one surface against the backend and logs its state as it changes.
//!
//! Usage: `ticketpool-client [dashboard | vendor <id> | customer <id>]`

use std::sync::Arc;

use anyhow::{bail, Context};
use ticketpool_client::{
    logging, ApiClient, ClientConfig, LiveSurface, NoticeLevel, SessionFactory, SurfaceKind,
};
use ticketpool_shared::TicketStatus;

fn surface_kind(mut args: impl Iterator<Item = String>) -> anyhow::Result<SurfaceKind> {
    let kind = match args.next().as_deref() {
        None | Some("dashboard") => SurfaceKind::Dashboard,
        Some("vendor") => SurfaceKind::VendorConsole {
            vendor_id: args.next().context("vendor console needs a vendor id")?,
        },
        Some("customer") => SurfaceKind::CustomerConsole {
            customer_id: args.next().context("customer console needs a customer id")?,
        },
        Some(other) => bail!("unknown surface {other:?}; expected dashboard, vendor or customer"),
    };
    Ok(kind)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let kind = surface_kind(std::env::args().skip(1))?;
    let config = ClientConfig::from_env();
    tracing::info!(
        ws = %config.ws_endpoint,
        api = %config.api_base_url,
        "Starting ticket pool client"
    );

    let api = ApiClient::new().with_base_url(config.api_base_url.clone());
    let factory = Arc::new(SessionFactory::new(&config));
    let mut surface = LiveSurface::new(kind, factory, Arc::new(api));
    let mut updates = surface.subscribe();
    surface.mount();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = surface.next_update(&mut updates) => {
                let Some((view, notices)) = update else {
                    break;
                };
                tracing::info!(
                    status = ?view.status,
                    tickets = view.board.len(),
                    listed = view.relevant_tickets(surface.kind()).len(),
                    available = ?view.board.counts_by_event(&TicketStatus::Available),
                    "{} updated",
                    surface.kind()
                );
                if let Some(line) = view.logs.entries().last() {
                    tracing::info!("latest activity: {}", line);
                }
                for notice in notices {
                    match notice.level {
                        NoticeLevel::Info => tracing::info!("{}", notice.message),
                        NoticeLevel::Error => tracing::error!("{}", notice.message),
                    }
                }
            }
        }
    }

    surface.unmount();
    tracing::info!("Shut down");
    Ok(())
}
