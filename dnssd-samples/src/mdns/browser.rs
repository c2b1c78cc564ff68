use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use chrono::Utc;
use shared::protocol::ty_domain;
use shared::types::{ServiceIdentity, ServiceRecord};
use crate::error::ProviderError;
use crate::provider::{BrowseEvent, Subscription};

/// Browse `service_type` in `domain` and yield resolved records.
///
/// Only services whose SRV, TXT and address records have all arrived are
/// reported; bare PTR hits are held back until the daemon resolves them.
/// Releasing the subscription stops the daemon-side query.
pub fn browse(
    daemon: &ServiceDaemon,
    service_type: &str,
    domain: &str,
) -> Result<Subscription<BrowseEvent>, ProviderError> {
    let ty_domain = ty_domain(service_type, domain);
    let receiver: flume::Receiver<ServiceEvent> = daemon
        .browse(&ty_domain)
        .map_err(|e| ProviderError::BrowseFailed {
            service: ty_domain.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!("Browsing for {}", ty_domain);

    let events = browse_events(receiver.into_stream(), service_type, domain);
    let daemon = daemon.clone();
    Ok(Subscription::new(events, CancellationToken::new()).on_release(move || {
        match daemon.stop_browse(&ty_domain) {
            Ok(()) => tracing::debug!("Stopped browsing {}", ty_domain),
            Err(e) => tracing::warn!("Failed to stop browsing {}: {}", ty_domain, e),
        }
    }))
}

/// Resolve raw daemon events into browse events.
///
/// The daemon ends a query with `SearchStopped`. If the event feed dries up
/// without one, the daemon went away underneath us and that is reported as
/// a failure.
fn browse_events<S>(raw: S, service_type: &str, domain: &str) -> BoxStream<'static, BrowseEvent>
where
    S: Stream<Item = ServiceEvent> + Send + 'static,
{
    let stopped = Arc::new(AtomicBool::new(false));
    let saw_stop = stopped.clone();
    let ty_domain = ty_domain(service_type, domain);
    let service_type = service_type.to_string();
    let domain = domain.to_string();

    let resolved = raw
        .take_while(move |event| {
            let stop = matches!(event, ServiceEvent::SearchStopped(_));
            if stop {
                saw_stop.store(true, Ordering::Release);
            }
            future::ready(!stop)
        })
        .filter_map(move |event| future::ready(resolve_event(event, &service_type, &domain)));

    let tail = stream::once(async move {
        if stopped.load(Ordering::Acquire) {
            None
        } else {
            Some(Err(ProviderError::Unavailable(format!(
                "mDNS daemon stopped while browsing {}",
                ty_domain
            ))))
        }
    })
    .filter_map(future::ready);

    resolved.chain(tail).boxed()
}

/// Turn a daemon event into a presence/loss record, if it is one.
fn resolve_event(event: ServiceEvent, service_type: &str, domain: &str) -> Option<BrowseEvent> {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            convert_service_info(&info, service_type, domain).map(Ok)
        }
        ServiceEvent::ServiceRemoved(_ty, fullname) => {
            match ServiceIdentity::from_fullname(&fullname, service_type, domain) {
                Some(identity) => Some(Ok(ServiceRecord::lost(identity))),
                None => {
                    tracing::debug!("Ignoring removal of foreign service {}", fullname);
                    None
                }
            }
        }
        ServiceEvent::ServiceFound(_ty, fullname) => {
            tracing::debug!("Found {}, waiting for resolution", fullname);
            None
        }
        _ => None,
    }
}

/// Convert an mdns-sd ServiceInfo to our ServiceRecord
fn convert_service_info(info: &ServiceInfo, service_type: &str, domain: &str) -> Option<ServiceRecord> {
    let Some(identity) = ServiceIdentity::from_fullname(info.get_fullname(), service_type, domain) else {
        tracing::debug!("Skipping service {} - not a {} instance", info.get_fullname(), service_type);
        return None;
    };

    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    if addresses.is_empty() {
        tracing::debug!("Skipping service {} - no addresses yet", info.get_fullname());
        return None;
    }
    addresses.sort();

    // Extract TXT records
    let txt: HashMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| {
            let key = prop.key().to_string();
            let value = prop.val_str().to_string();
            (key, value)
        })
        .collect();

    Some(ServiceRecord {
        identity,
        hostname: Some(info.get_hostname().to_string()),
        port: info.get_port(),
        addresses,
        txt,
        last_seen: Utc::now(),
        lost: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_info(ip: &str) -> ServiceInfo {
        ServiceInfo::new(
            "_rxdnssd._tcp.local.",
            "pixel",
            "pixel.local.",
            ip,
            8080,
            HashMap::from([("path".to_string(), "/api".to_string())]),
        )
        .unwrap()
    }

    #[test]
    fn test_convert_resolved_service() {
        let record = convert_service_info(&service_info("192.168.1.12"), "_rxdnssd._tcp", "local.").unwrap();

        assert_eq!(record.identity, ServiceIdentity::new("pixel", "_rxdnssd._tcp", "local."));
        assert_eq!(record.hostname.as_deref(), Some("pixel.local."));
        assert_eq!(record.port, 8080);
        assert_eq!(record.addresses, vec!["192.168.1.12".parse::<IpAddr>().unwrap()]);
        assert_eq!(record.txt.get("path").map(String::as_str), Some("/api"));
        assert!(!record.lost);
    }

    #[test]
    fn test_convert_skips_foreign_type() {
        assert!(convert_service_info(&service_info("192.168.1.12"), "_http._tcp", "local.").is_none());
    }

    #[test]
    fn test_removed_event_is_loss() {
        let event = ServiceEvent::ServiceRemoved(
            "_rxdnssd._tcp.local.".to_string(),
            "pixel._rxdnssd._tcp.local.".to_string(),
        );

        let record = resolve_event(event, "_rxdnssd._tcp", "local.").unwrap().unwrap();

        assert!(record.lost);
        assert_eq!(record.identity.name, "pixel");
    }

    #[tokio::test]
    async fn test_feed_closing_without_stop_is_failure() {
        let raw = stream::iter(vec![ServiceEvent::ServiceResolved(service_info("192.168.1.12"))]);

        let events: Vec<BrowseEvent> = browse_events(raw, "_rxdnssd._tcp", "local.").collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(record) if record.identity.name == "pixel"));
        assert!(matches!(&events[1], Err(ProviderError::Unavailable(reason)) if reason.contains("_rxdnssd._tcp.local.")));
    }

    #[tokio::test]
    async fn test_search_stopped_ends_quietly() {
        let raw = stream::iter(vec![
            ServiceEvent::ServiceResolved(service_info("192.168.1.12")),
            ServiceEvent::SearchStopped("_rxdnssd._tcp.local.".to_string()),
        ]);

        let events: Vec<BrowseEvent> = browse_events(raw, "_rxdnssd._tcp", "local.").collect().await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[test]
    fn test_found_event_waits_for_resolution() {
        let event = ServiceEvent::ServiceFound(
            "_rxdnssd._tcp.local.".to_string(),
            "pixel._rxdnssd._tcp.local.".to_string(),
        );

        assert!(resolve_event(event, "_rxdnssd._tcp", "local.").is_none());
    }
}
