//! Client IP extraction from HTTP headers with trust validation
//!
//! Forwarding headers are only honoured when the direct peer is one of the
//! configured trusted proxies. From those headers the first public address
//! wins, checked in this order:
//! - `X-Forwarded-For` (left to right)
//! - `X-Real-IP`
//! - `CF-Connecting-IP`
//!
//! Otherwise the socket address is used.

use anyhow::Context;
use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;

use crate::validation::is_internal_ip;

#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNet>,
}

impl TrustedProxies {
    /// Accepts CIDR ranges and bare addresses.
    pub fn parse<I, S>(entries: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = entries
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry
                    .parse::<IpNet>()
                    .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                    .with_context(|| format!("invalid trusted proxy range '{entry}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { networks })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = canonical(ip);
        self.networks.iter().any(|net| net.contains(&ip))
    }
}

/// Resolve the client address of a request. `None` only when the socket
/// address is unknown and no trusted header applies.
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted: &TrustedProxies,
) -> Option<IpAddr> {
    let direct = peer.map(canonical)?;

    if !trusted.contains(direct) {
        return Some(direct);
    }

    forwarded_ips(headers)
        .into_iter()
        .find(|ip| is_public_ip(*ip))
        .or(Some(direct))
}

fn forwarded_ips(headers: &HeaderMap) -> Vec<IpAddr> {
    let mut ips = Vec::new();

    if let Some(xff) = header_str(headers, "x-forwarded-for") {
        ips.extend(xff.split(',').filter_map(parse_ip));
    }
    for name in ["x-real-ip", "cf-connecting-ip"] {
        if let Some(ip) = header_str(headers, name).and_then(parse_ip) {
            ips.push(ip);
        }
    }

    ips
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.trim().parse::<IpAddr>().ok().map(canonical)
}

/// IPv4-mapped IPv6 addresses are treated as the IPv4 address
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    if is_internal_ip(ip) || ip.is_multicast() {
        return false;
    }
    match ip {
        // 240.0.0.0/4 reserved
        IpAddr::V4(v4) => v4.octets()[0] < 240,
        IpAddr::V6(_) => true,
    }
}
