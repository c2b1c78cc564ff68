/// Service type browsed and advertised by the sample
pub const DEFAULT_SERVICE_TYPE: &str = "_rxdnssd._tcp";

/// Domain used for multicast DNS-SD
pub const DEFAULT_DOMAIN: &str = "local.";

/// Port advertised by the sample registration
pub const DEFAULT_REGISTER_PORT: u16 = 123;

/// Join a service type and domain into the `<type>.<domain>.` form used by
/// the mDNS daemon, e.g. `_http._tcp` + `local` -> `_http._tcp.local.`
pub fn ty_domain(service_type: &str, domain: &str) -> String {
    let service_type = service_type.trim_end_matches('.');
    let domain = domain.trim_matches('.');
    format!("{}.{}.", service_type, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ty_domain_normalizes_dots() {
        assert_eq!(ty_domain("_test._tcp", "local."), "_test._tcp.local.");
        assert_eq!(ty_domain("_test._tcp.", "local"), "_test._tcp.local.");
        assert_eq!(ty_domain(DEFAULT_SERVICE_TYPE, DEFAULT_DOMAIN), "_rxdnssd._tcp.local.");
    }
}
