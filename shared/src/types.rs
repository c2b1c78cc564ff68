use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::protocol::ty_domain;

/// Identity of a DNS-SD service instance.
/// Two events refer to the same service exactly when their identities are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// Instance name, e.g. "printer"
    pub name: String,

    /// Service type, e.g. "_http._tcp"
    pub service_type: String,

    /// Domain with a trailing dot, e.g. "local."
    pub domain: String,
}

impl ServiceIdentity {
    pub fn new(name: impl Into<String>, service_type: &str, domain: &str) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.trim_end_matches('.').to_string(),
            domain: format!("{}.", domain.trim_matches('.')),
        }
    }

    /// Full DNS-SD instance name, e.g. "printer._http._tcp.local."
    pub fn fullname(&self) -> String {
        format!("{}.{}", self.name, ty_domain(&self.service_type, &self.domain))
    }

    /// Recover the identity from a full instance name reported by the daemon.
    /// Returns `None` if the name does not belong to `service_type` in `domain`.
    pub fn from_fullname(fullname: &str, service_type: &str, domain: &str) -> Option<Self> {
        let suffix = ty_domain(service_type, domain);
        let name = fullname.strip_suffix(suffix.as_str())?.strip_suffix('.')?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, service_type, domain))
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

/// A service presence or loss notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub identity: ServiceIdentity,

    /// Target host, e.g. "nas.local."
    pub hostname: Option<String>,

    pub port: u16,

    pub addresses: Vec<IpAddr>,

    /// TXT record key-value pairs
    pub txt: HashMap<String, String>,

    /// When this event was produced
    pub last_seen: DateTime<Utc>,

    /// True when the service went away
    pub lost: bool,
}

impl ServiceRecord {
    /// A presence record with no resolved attributes yet.
    pub fn found(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            hostname: None,
            port: 0,
            addresses: Vec::new(),
            txt: HashMap::new(),
            last_seen: Utc::now(),
            lost: false,
        }
    }

    /// A loss notification for `identity`.
    pub fn lost(identity: ServiceIdentity) -> Self {
        Self {
            lost: true,
            ..Self::found(identity)
        }
    }
}

/// What to advertise when registering a local service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDescriptor {
    pub service_type: String,
    pub name: String,
    pub domain: String,
    pub port: u16,
    #[serde(default)]
    pub txt: HashMap<String, String>,
}

impl RegistrationDescriptor {
    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity::new(self.name.clone(), &self.service_type, &self.domain)
    }

    pub fn ty_domain(&self) -> String {
        ty_domain(&self.service_type, &self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_normalizes_domain() {
        let a = ServiceIdentity::new("printer", "_ipp._tcp", "local");
        let b = ServiceIdentity::new("printer", "_ipp._tcp.", "local.");
        assert_eq!(a, b);
        assert_eq!(a.fullname(), "printer._ipp._tcp.local.");
    }

    #[test]
    fn test_identity_from_fullname() {
        let identity = ServiceIdentity::from_fullname(
            "living room._rxdnssd._tcp.local.",
            "_rxdnssd._tcp",
            "local.",
        )
        .unwrap();
        assert_eq!(identity.name, "living room");
        assert_eq!(identity.service_type, "_rxdnssd._tcp");
        assert_eq!(identity.domain, "local.");
    }

    #[test]
    fn test_identity_from_foreign_fullname() {
        assert!(ServiceIdentity::from_fullname("nas._smb._tcp.local.", "_http._tcp", "local.").is_none());
        assert!(ServiceIdentity::from_fullname("_http._tcp.local.", "_http._tcp", "local.").is_none());
        assert!(ServiceIdentity::from_fullname("._http._tcp.local.", "_http._tcp", "local.").is_none());
    }

    #[test]
    fn test_lost_record_keeps_identity() {
        let identity = ServiceIdentity::new("x", "_test._tcp", "local.");
        let record = ServiceRecord::lost(identity.clone());
        assert!(record.lost);
        assert_eq!(record.identity, identity);
    }

    #[test]
    fn test_descriptor_identity() {
        let descriptor = RegistrationDescriptor {
            service_type: "_rxdnssd._tcp".to_string(),
            name: "pixel".to_string(),
            domain: "local.".to_string(),
            port: 123,
            txt: HashMap::new(),
        };
        assert_eq!(descriptor.ty_domain(), "_rxdnssd._tcp.local.");
        assert_eq!(descriptor.identity().fullname(), "pixel._rxdnssd._tcp.local.");
    }
}
