use futures::future;
use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;
use mdns_sd::{DaemonEvent, ServiceDaemon, ServiceInfo};
use shared::types::{RegistrationDescriptor, ServiceRecord};
use crate::error::ProviderError;
use crate::provider::{RegistrationEvent, Subscription};

/// Register `descriptor` with the daemon and report when it is announced.
///
/// Addresses are picked up from the host's interfaces. Releasing the
/// subscription unregisters the service.
pub fn register(
    daemon: &ServiceDaemon,
    descriptor: &RegistrationDescriptor,
) -> Result<Subscription<RegistrationEvent>, ProviderError> {
    let ty_domain = descriptor.ty_domain();
    let failed = |reason: String| ProviderError::RegisterFailed {
        service: ty_domain.clone(),
        reason,
    };

    let hostname = hostname::get()
        .map_err(|e| failed(format!("Failed to get system hostname: {}", e)))?
        .to_string_lossy()
        .to_string();
    let host_name = host_name(&hostname, &descriptor.domain);

    let service_info = ServiceInfo::new(
        &ty_domain,
        &descriptor.name,
        &host_name,
        (),
        descriptor.port,
        descriptor.txt.clone(),
    )
    .map_err(|e| failed(e.to_string()))?
    .enable_addr_auto();
    let fullname = service_info.get_fullname().to_string();

    // Subscribe before registering so the first announcement is not missed
    let monitor: flume::Receiver<DaemonEvent> = daemon.monitor().map_err(|e| failed(e.to_string()))?;
    daemon
        .register(service_info)
        .map_err(|e| failed(e.to_string()))?;

    tracing::info!(
        "Registering {} as {} on port {}",
        ty_domain,
        descriptor.name,
        descriptor.port
    );

    let mut confirmed = ServiceRecord::found(descriptor.identity());
    confirmed.hostname = Some(host_name);
    confirmed.port = descriptor.port;
    confirmed.txt = descriptor.txt.clone();

    let announced_name = fullname.clone();
    let events = monitor
        .into_stream()
        .filter_map(move |event| future::ready(announce_event(event, &announced_name, &confirmed)))
        .boxed();

    // The goodbye is queued on the daemon before release returns, so a
    // daemon shutdown issued afterwards cannot overtake it.
    let daemon = daemon.clone();
    Ok(Subscription::new(events, CancellationToken::new()).on_release(move || {
        match daemon.unregister(&fullname) {
            Ok(_) => tracing::info!("Unregistered {}", fullname),
            Err(e) => tracing::error!("Failed to unregister {}: {}", fullname, e),
        }
    }))
}

/// SRV target for this host: the first label of the system hostname in `domain`.
fn host_name(hostname: &str, domain: &str) -> String {
    let label = hostname.split('.').next().unwrap_or(hostname);
    format!("{}.{}.", label, domain.trim_matches('.'))
}

/// Map daemon activity to registration progress for `fullname`.
fn announce_event(event: DaemonEvent, fullname: &str, confirmed: &ServiceRecord) -> Option<RegistrationEvent> {
    match event {
        DaemonEvent::Announce(announced, addresses) if announced == fullname => {
            tracing::debug!("Announced {} on {}", announced, addresses);
            Some(RegistrationEvent::Registered(confirmed.clone()))
        }
        DaemonEvent::Error(e) => Some(RegistrationEvent::Failed(e.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use shared::types::ServiceIdentity;
    use super::*;

    fn confirmed() -> ServiceRecord {
        ServiceRecord::found(ServiceIdentity::new("pixel", "_rxdnssd._tcp", "local."))
    }

    #[test]
    fn test_announce_of_our_service_confirms() {
        let event = DaemonEvent::Announce(
            "pixel._rxdnssd._tcp.local.".to_string(),
            "192.168.1.12".to_string(),
        );

        let result = announce_event(event, "pixel._rxdnssd._tcp.local.", &confirmed());

        assert!(matches!(result, Some(RegistrationEvent::Registered(r)) if r.identity.name == "pixel"));
    }

    #[test]
    fn test_announce_of_other_service_ignored() {
        let event = DaemonEvent::Announce(
            "other._rxdnssd._tcp.local.".to_string(),
            "192.168.1.13".to_string(),
        );

        assert!(announce_event(event, "pixel._rxdnssd._tcp.local.", &confirmed()).is_none());
    }

    #[test]
    fn test_daemon_error_fails_registration() {
        let event = DaemonEvent::Error(mdns_sd::Error::Msg("socket closed".to_string()));

        let result = announce_event(event, "pixel._rxdnssd._tcp.local.", &confirmed());

        assert!(matches!(result, Some(RegistrationEvent::Failed(reason)) if reason.contains("socket closed")));
    }

    #[test]
    fn test_host_name_uses_first_label() {
        assert_eq!(host_name("box.lan", "local."), "box.local.");
        assert_eq!(host_name("pixel", "local"), "pixel.local.");
        assert_eq!(host_name("pixel", "example.com."), "pixel.example.com.");
    }

    #[test]
    fn test_descriptor_fullname_matches_identity() {
        let descriptor = RegistrationDescriptor {
            service_type: "_rxdnssd._tcp".to_string(),
            name: "pixel".to_string(),
            domain: "local.".to_string(),
            port: 123,
            txt: HashMap::from([("model".to_string(), "sample".to_string())]),
        };
        let info = ServiceInfo::new(
            &descriptor.ty_domain(),
            &descriptor.name,
            "pixel.local.",
            (),
            descriptor.port,
            descriptor.txt.clone(),
        )
        .unwrap();

        assert_eq!(info.get_fullname(), descriptor.identity().fullname());
    }
}
