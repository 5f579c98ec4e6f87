//! Webhook target validation.
//!
//! Rejects destinations that would allow SSRF into private networks or
//! deliver payloads in cleartext outside of local development.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("webhook URL is empty")]
    Empty,

    #[error("invalid webhook URL '{url}': {reason}")]
    Invalid { url: String, reason: String },

    #[error("unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("webhook URL has no host")]
    MissingHost,

    #[error("webhook URL must use HTTPS")]
    HttpsRequired,

    #[error("localhost webhook URLs are not allowed in production")]
    LocalhostNotAllowed,

    #[error("webhook URL points to a private or internal address: {0}")]
    PrivateAddress(String),
}

/// Validates a webhook destination.
///
/// With `allow_local` set (development), plain HTTP and localhost targets
/// are accepted; private network literals are still rejected.
pub fn validate_webhook_url(raw: &str, allow_local: bool) -> Result<Url, UrlValidationError> {
    if raw.trim().is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let parsed = Url::parse(raw).map_err(|e| UrlValidationError::Invalid {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }

    let host = match parsed.host() {
        Some(Host::Domain(domain)) if domain.is_empty() => {
            return Err(UrlValidationError::MissingHost)
        }
        Some(host) => host.to_owned(),
        None => return Err(UrlValidationError::MissingHost),
    };

    let local = is_localhost(&host);

    if !allow_local {
        if parsed.scheme() != "https" {
            if local {
                return Err(UrlValidationError::LocalhostNotAllowed);
            }
            return Err(UrlValidationError::HttpsRequired);
        }
        if local {
            return Err(UrlValidationError::LocalhostNotAllowed);
        }
    }

    let ip = match &host {
        Host::Ipv4(v4) => Some(IpAddr::V4(*v4)),
        Host::Ipv6(v6) => Some(IpAddr::V6(*v6)),
        Host::Domain(_) => None,
    };

    if let Some(ip) = ip {
        if is_private_ip(&ip) && !(allow_local && local) {
            return Err(UrlValidationError::PrivateAddress(ip.to_string()));
        }
    }

    Ok(parsed)
}

/// Check if a host names the local machine
fn is_localhost(host: &Host<String>) -> bool {
    match host {
        Host::Domain(domain) => {
            matches!(domain.to_ascii_lowercase().as_str(), "localhost" | "127.0.0.1" | "::1" | "0.0.0.0")
        }
        Host::Ipv4(v4) => is_local_v4(v4),
        Host::Ipv6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_v4(&v4),
            None => v6.is_loopback(),
        },
    }
}

fn is_local_v4(v4: &Ipv4Addr) -> bool {
    v4.is_loopback() || *v4 == Ipv4Addr::UNSPECIFIED
}

/// Private, loopback and link-local ranges. IPv4-mapped IPv6 addresses
/// (`::ffff:a.b.c.d`) are classified by their IPv4 form.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || is_ipv6_link_local(&v6),
    }
}

/// fe80::/10
fn is_ipv6_link_local(v6: &Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}
