use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use shared::types::ServiceRecord;
use crate::session::SessionNotice;

/// Log the service list whenever it changes, and session outcomes as they happen.
pub async fn present(
    mut snapshots: watch::Receiver<Vec<ServiceRecord>>,
    mut notices: mpsc::UnboundedReceiver<SessionNotice>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let services = snapshots.borrow_and_update().clone();
                render(&services);
            }
            Some(notice) = notices.recv() => report(notice),
            _ = cancel.cancelled() => break,
        }
    }
}

fn render(services: &[ServiceRecord]) {
    if services.is_empty() {
        tracing::info!("No services");
        return;
    }
    tracing::info!("{} service(s):", services.len());
    for record in services {
        tracing::info!("  {}", render_line(record));
    }
}

fn report(notice: SessionNotice) {
    match notice {
        SessionNotice::Registered(record) => tracing::info!("Registered {}", record.identity.name),
        SessionNotice::RegistrationFailed(reason) => tracing::error!("Registration failed: {}", reason),
        SessionNotice::BrowseFailed(reason) => {
            tracing::error!("Browse failed: {} (use `browse` to restart)", reason)
        }
        SessionNotice::Ended(kind) => tracing::warn!("{} session ended", kind),
    }
}

/// One list row: `name  type  host:port  [addresses]`
pub fn render_line(record: &ServiceRecord) -> String {
    let addresses = record
        .addresses
        .iter()
        .map(|addr| addr.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{}  {}  {}:{}  [{}]",
        record.identity.name,
        record.identity.service_type,
        record.hostname.as_deref().unwrap_or("?"),
        record.port,
        addresses
    )
}
