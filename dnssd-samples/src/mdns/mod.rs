//! Discovery provider backed by the `mdns-sd` daemon.

pub mod advertise;
pub mod browser;

use mdns_sd::ServiceDaemon;
use shared::types::RegistrationDescriptor;
use crate::error::ProviderError;
use crate::provider::{BrowseEvent, DiscoveryProvider, RegistrationEvent, Subscription};

/// Drives a shared [`ServiceDaemon`]. Must be used from within a tokio runtime.
pub struct MdnsProvider {
    daemon: ServiceDaemon,
}

impl MdnsProvider {
    pub fn new(daemon: ServiceDaemon) -> Self {
        Self { daemon }
    }
}

impl DiscoveryProvider for MdnsProvider {
    fn browse(
        &self,
        service_type: &str,
        domain: &str,
    ) -> Result<Subscription<BrowseEvent>, ProviderError> {
        browser::browse(&self.daemon, service_type, domain)
    }

    fn register(
        &self,
        descriptor: &RegistrationDescriptor,
    ) -> Result<Subscription<RegistrationEvent>, ProviderError> {
        advertise::register(&self.daemon, descriptor)
    }
}
