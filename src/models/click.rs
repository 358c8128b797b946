use serde::{Deserialize, Serialize};

/// Placeholder for click attributes the request did not carry.
pub const UNKNOWN: &str = "unknown";

/// Reported when the client address cannot be determined
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Who followed a short link, as reported to the analytics service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickInfo {
    pub ip: String,
    pub city: String,
    pub country: String,
}

impl ClickInfo {
    pub fn new(
        ip: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            city: city.into(),
            country: country.into(),
        }
    }
}

impl Default for ClickInfo {
    fn default() -> Self {
        Self::new(UNKNOWN_IP, UNKNOWN, UNKNOWN)
    }
}
