//! SSRF-blocking access policy.
//!
//! Subscription sources are user-controlled URLs, so by default the
//! fetcher refuses to connect to anything that is not publicly routable:
//! loopback, RFC 1918 private ranges, link-local, carrier-grade NAT,
//! IPv6 unique-local and link-local ranges, IPv4-mapped/compatible IPv6
//! encodings of any of those, and `localhost`/`*.local` hostnames.
//!
//! Hostname targets are resolved and every resolved address is checked,
//! so a public-looking name pointing at 127.0.0.1 is still refused.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::debug;
use url::{Host, Url};

use crate::error::{FetchError, FetchResult};

/// Decides whether an outbound request target is acceptable.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    allow_local: bool,
}

impl AccessPolicy {
    /// Creates a policy. `allow_local` disables all blocking and is the
    /// injected value of the `webcalAllowLocalAccess` configuration key.
    pub fn new(allow_local: bool) -> Self {
        Self { allow_local }
    }

    /// Returns true if local targets are allowed.
    pub fn allows_local(&self) -> bool {
        self.allow_local
    }

    /// Checks the URL's host without any network activity.
    ///
    /// Catches literal IP targets and blocked hostname patterns. Used on
    /// every redirect hop; the initial request additionally resolves the
    /// hostname via [`AccessPolicy::check`].
    pub fn check_host(&self, url: &Url) -> FetchResult<()> {
        if self.allow_local {
            return Ok(());
        }

        match url.host() {
            None => Err(FetchError::invalid_url(format!(
                "URL has no host: {}",
                url
            ))),
            Some(Host::Ipv4(addr)) => self.check_ip(IpAddr::V4(addr), url),
            Some(Host::Ipv6(addr)) => self.check_ip(IpAddr::V6(addr), url),
            Some(Host::Domain(domain)) => {
                if is_blocked_hostname(domain) {
                    Err(FetchError::local_address(format!(
                        "host {:?} is a local hostname",
                        domain
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Fully checks a URL: host patterns, literal IPs, and for hostname
    /// targets every address the name resolves to.
    ///
    /// The verdict applies to the addresses seen at check time. The
    /// HTTP client resolves the name again when connecting, so a record
    /// that changes in between can point the connection elsewhere;
    /// embedders needing a hard guarantee must pin connections to the
    /// checked addresses.
    ///
    /// # Errors
    ///
    /// Returns a `LocalAddress` error on policy refusal and a `Network`
    /// error when resolution fails.
    pub async fn check(&self, url: &Url) -> FetchResult<()> {
        self.check_host(url)?;

        if self.allow_local {
            return Ok(());
        }

        // Literal IPs were already checked above.
        let domain = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            _ => return Ok(()),
        };

        let port = url.port_or_known_default().unwrap_or(443);
        let addrs = tokio::net::lookup_host((domain.as_str(), port))
            .await
            .map_err(|e| {
                FetchError::network(format!("failed to resolve host {:?}", domain)).with_source(e)
            })?;

        for addr in addrs {
            debug!(host = %domain, addr = %addr.ip(), "Checking resolved address");
            self.check_ip(addr.ip(), url)?;
        }

        Ok(())
    }

    fn check_ip(&self, ip: IpAddr, url: &Url) -> FetchResult<()> {
        if is_blocked_ip(ip) {
            Err(FetchError::local_address(format!(
                "address {} for {} is not publicly routable",
                ip, url
            )))
        } else {
            Ok(())
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Returns true for hostnames that always refer to the local machine or
/// the local network: `localhost` (any case, optional trailing dot) and
/// mDNS `*.local` names.
pub fn is_blocked_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost"
        || host == "localhost.localdomain"
        || host == "local"
        || host.ends_with(".local")
        || host.ends_with(".localhost")
}

/// Returns true for addresses outside the publicly routable space.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    // 100.64.0.0/10, carrier-grade NAT.
    let octets = ip.octets();
    let shared = octets[0] == 100 && (64..128).contains(&octets[1]);

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || shared
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }

    let segments = ip.segments();
    // fc00::/7 unique-local, fe80::/10 link-local.
    if segments[0] & 0xfe00 == 0xfc00 || segments[0] & 0xffc0 == 0xfe80 {
        return true;
    }

    // IPv4-mapped (::ffff:a.b.c.d) and IPv4-compatible (::a.b.c.d)
    // encodings inherit the verdict of the embedded IPv4 address.
    if let Some(v4) = ip.to_ipv4() {
        return is_blocked_ipv4(v4);
    }

    false
}
