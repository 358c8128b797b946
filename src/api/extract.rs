use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use super::handlers::AppState;
use super::ip_extractor::extract_client_ip;
use crate::models::{ClickInfo, UNKNOWN, UNKNOWN_IP};

pub const GEOIP_CITY_HEADER: &str = "x-geoip-city";
pub const GEOIP_COUNTRY_HEADER: &str = "x-geoip-country";

/// Who clicked a link, as far as the request tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickContext(pub ClickInfo);

impl ClickContext {
    pub fn into_inner(self) -> ClickInfo {
        self.0
    }
}

impl FromRequestParts<Arc<AppState>> for ClickContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let ip = extract_client_ip(&parts.headers, peer, &state.trusted_proxies)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_IP.to_string());

        Ok(ClickContext(ClickInfo::new(
            ip,
            geo_header(&parts.headers, GEOIP_CITY_HEADER),
            geo_header(&parts.headers, GEOIP_COUNTRY_HEADER),
        )))
    }
}

fn geo_header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_geo_header_defaults_to_unknown() {
        let mut headers = HeaderMap::new();
        assert_eq!(geo_header(&headers, GEOIP_CITY_HEADER), "unknown");

        headers.insert(GEOIP_CITY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(geo_header(&headers, GEOIP_CITY_HEADER), "unknown");

        headers.insert(GEOIP_COUNTRY_HEADER, HeaderValue::from_static("PT"));
        assert_eq!(geo_header(&headers, GEOIP_COUNTRY_HEADER), "PT");
    }
}
