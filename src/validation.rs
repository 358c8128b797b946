//! Input validation for submitted URLs and short codes
//!
//! Submitted URLs must be absolute http(s) URLs of at most 2048 characters,
//! free of script-injection payloads, and must not point at loopback,
//! private or link-local hosts (server-side request forgery).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

use crate::models::SHORT_CODE_LENGTH;

pub const MAX_URL_LENGTH: usize = 2048;

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Matched case-insensitively anywhere in the raw URL.
const XSS_PATTERNS: &[&str] = &[
    "<script",
    "</script",
    "javascript:",
    "vbscript:",
    "data:text/html",
    "onerror=",
    "onload=",
    "<iframe",
    "<object",
    "<embed",
    "<svg",
];

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("URL exceeds the maximum length of {MAX_URL_LENGTH} characters")]
    TooLong(usize),
    #[error("URL contains disallowed content")]
    UnsafeContent,
    #[error("Invalid URL format: {0}")]
    Malformed(String),
    #[error("Unsupported URL scheme '{0}', only http and https are allowed")]
    UnsupportedScheme(String),
    #[error("URL must include a host")]
    MissingHost,
    #[error("URL host '{0}' is not allowed")]
    BlockedHost(String),
    #[error("Short code must be exactly {SHORT_CODE_LENGTH} URL-safe characters")]
    InvalidShortCode,
}

/// Validate a submitted URL and return its normalized form.
pub fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    if raw.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong(raw.len()));
    }

    let lowered = raw.to_lowercase();
    if XSS_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
        return Err(ValidationError::UnsafeContent);
    }

    let url = Url::parse(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(ValidationError::UnsupportedScheme(url.scheme().to_string()));
    }

    match url.host() {
        None => return Err(ValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            if domain.is_empty() {
                return Err(ValidationError::MissingHost);
            }
            if is_blocked_hostname(&domain) {
                return Err(ValidationError::BlockedHost(domain));
            }
        }
        Some(Host::Ipv4(addr)) => {
            if is_internal_ip(IpAddr::V4(addr)) {
                return Err(ValidationError::BlockedHost(addr.to_string()));
            }
        }
        Some(Host::Ipv6(addr)) => {
            if is_internal_ip(IpAddr::V6(addr)) {
                return Err(ValidationError::BlockedHost(addr.to_string()));
            }
        }
    }

    let normalized = url.to_string();
    if normalized.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong(normalized.len()));
    }

    Ok(normalized)
}

/// Short codes are exactly eight characters of the base64url alphabet.
pub fn validate_short_code(code: &str) -> Result<(), ValidationError> {
    let valid = code.len() == SHORT_CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidShortCode)
    }
}

fn is_blocked_hostname(domain: &str) -> bool {
    BLOCKED_HOSTNAMES.contains(&domain) || domain.ends_with(".localhost")
}

/// Loopback, private, link-local, unspecified and broadcast addresses.
pub fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_internal_ipv4(v4),
            None => is_internal_ipv6(v6),
        },
    }
}

fn is_internal_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 0.0.0.0/8 "this network"
        || ip.octets()[0] == 0
}

fn is_internal_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}
