use std::collections::HashSet;
use std::net::IpAddr;

use ingestlake_common::IngestError;

/// Egress guard for connector HTTP calls.
///
/// A connector's `baseUrl` is tenant-supplied config, not a developer-typed
/// constant, so the validator's primary mode is pinning: once built
/// `for_endpoint`, every request must target that exact host, and the
/// pinned host itself still runs through the private/loopback/link-local
/// checks below rather than bypassing them — a malicious `baseUrl`
/// pointing at an internal service is exactly the case this guards
/// against. `new()` without pinning is for connectors that legitimately
/// need to reach more than one host per run (e.g. a paginated API that
/// redirects across a CDN).
#[derive(Debug, Clone)]
pub struct UrlValidator {
    pinned_host: Option<String>,
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_ranges: Vec<BlockedRange>,
}

#[derive(Debug, Clone)]
struct BlockedRange {
    reason: &'static str,
    cidr: ipnet::IpNet,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            pinned_host: None,
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_ranges: vec![
                BlockedRange { reason: "loopback", cidr: "127.0.0.0/8".parse().unwrap() },
                BlockedRange { reason: "loopback", cidr: "::1/128".parse().unwrap() },
                BlockedRange { reason: "rfc1918 private", cidr: "10.0.0.0/8".parse().unwrap() },
                BlockedRange { reason: "rfc1918 private", cidr: "172.16.0.0/12".parse().unwrap() },
                BlockedRange { reason: "rfc1918 private", cidr: "192.168.0.0/16".parse().unwrap() },
                BlockedRange { reason: "unique-local", cidr: "fc00::/7".parse().unwrap() },
                BlockedRange { reason: "link-local / cloud metadata", cidr: "169.254.0.0/16".parse().unwrap() },
                BlockedRange { reason: "link-local / cloud metadata", cidr: "fe80::/10".parse().unwrap() },
            ],
        }
    }

    /// Pins egress to the host of `base_url` (a connector's configured
    /// endpoint). The host still runs through every range/host check in
    /// `validate`; pinning narrows, it never widens, what's reachable.
    pub fn for_endpoint(base_url: &str) -> Result<Self, IngestError> {
        let parsed = url::Url::parse(base_url).map_err(|e| IngestError::ConfigInvalid(e.to_string()))?;
        let host = parsed.host_str().ok_or_else(|| IngestError::ConfigInvalid("endpoint url has no host".into()))?.to_string();
        Ok(Self { pinned_host: Some(host), ..Self::new() })
    }

    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    pub fn block_range(mut self, reason: &'static str, cidr: ipnet::IpNet) -> Self {
        self.blocked_ranges.push(BlockedRange { reason, cidr });
        self
    }

    fn check_host(&self, host: &str) -> Result<(), IngestError> {
        if let Some(pinned) = &self.pinned_host {
            if pinned != host {
                return Err(IngestError::ConfigInvalid(format!(
                    "host '{host}' does not match this connector's configured endpoint '{pinned}'"
                )));
            }
        }
        if self.blocked_hosts.contains(host) {
            return Err(IngestError::ConfigInvalid(format!("host '{host}' is blocked")));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            self.check_ip(ip)?;
        }
        Ok(())
    }

    fn check_ip(&self, ip: IpAddr) -> Result<(), IngestError> {
        for range in &self.blocked_ranges {
            if range.cidr.contains(&ip) {
                return Err(IngestError::ConfigInvalid(format!("ip '{ip}' falls in a blocked range ({})", range.reason)));
            }
        }
        Ok(())
    }

    pub fn validate(&self, url: &str) -> Result<(), IngestError> {
        let parsed = url::Url::parse(url).map_err(|e| IngestError::ConfigInvalid(e.to_string()))?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(IngestError::ConfigInvalid(format!("scheme '{}' is not allowed", parsed.scheme())));
        }

        let host = parsed.host_str().ok_or_else(|| IngestError::ConfigInvalid("url has no host".into()))?;
        self.check_host(host)
    }

    /// Resolves DNS and checks the resolved IPs, catching DNS-rebinding
    /// attacks where a permitted hostname now points at an internal
    /// address. Pinning a host does not exempt it from this check.
    pub async fn validate_with_dns(&self, url: &str) -> Result<(), IngestError> {
        self.validate(url)?;

        let parsed = url::Url::parse(url).map_err(|e| IngestError::ConfigInvalid(e.to_string()))?;
        let host = parsed.host_str().ok_or_else(|| IngestError::ConfigInvalid("url has no host".into()))?;

        if host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let port = parsed.port().unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| IngestError::TransportTransient(e.to_string()))?;

        for addr in addrs {
            self.check_ip(addr.ip())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        let v = UrlValidator::new();
        assert!(v.validate("file:///etc/passwd").is_err());
    }

    #[test]
    fn rejects_loopback_and_link_local() {
        let v = UrlValidator::new();
        assert!(v.validate("http://127.0.0.1/admin").is_err());
        assert!(v.validate("http://169.254.169.254/latest/meta-data").is_err());
    }

    #[test]
    fn rejects_private_cidr_ip() {
        let v = UrlValidator::new();
        assert!(v.validate("http://10.1.2.3/").is_err());
    }

    #[test]
    fn accepts_ordinary_public_url() {
        let v = UrlValidator::new();
        assert!(v.validate("https://api.example.com/v1/issues").is_ok());
    }

    #[test]
    fn pinned_endpoint_rejects_any_other_host() {
        let v = UrlValidator::for_endpoint("https://acme.atlassian.net").unwrap();
        assert!(v.validate("https://acme.atlassian.net/rest/api/2/search").is_ok());
        assert!(v.validate("https://evil.example.com/").is_err());
    }

    #[test]
    fn pinning_does_not_exempt_an_internal_host_from_range_checks() {
        // A malicious tenant-supplied baseUrl pointing straight at an
        // internal IP must still be rejected, not merely pinned.
        let v = UrlValidator::for_endpoint("http://169.254.169.254/").unwrap();
        assert!(v.validate("http://169.254.169.254/").is_err());
    }

    #[test]
    fn block_range_extends_the_default_set() {
        let v = UrlValidator::new().block_range("corp vpn range", "100.64.0.0/10".parse().unwrap());
        assert!(v.validate("http://100.64.1.1/").is_err());
    }
}
