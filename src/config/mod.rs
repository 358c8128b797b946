use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Shortener service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub cache: CacheConfig,
    pub analytics_client: AnalyticsClientConfig,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
}

/// Analytics service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsServiceConfig {
    pub database: DatabaseConfig,
    pub http_server: ServerConfig,
    pub grpc_server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: u64,
    /// Interval of the background sweep of expired entries; 0 disables it
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsClientConfig {
    /// gRPC endpoint of the analytics service, always with a scheme
    pub endpoint: String,
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub half_open_max_calls: u32,
    pub probe_interval_secs: u64,
}

impl Default for AnalyticsClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://analytics:50051".to_string(),
            timeout_ms: 2_000,
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_max_calls: 3,
            probe_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub create_per_minute: usize,
    pub access_per_minute: usize,
    pub general_per_minute: usize,
    /// CIDR ranges whose forwarding headers are trusted
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            create_per_minute: 10,
            access_per_minute: 50,
            general_per_minute: 100,
            trusted_proxies: default_trusted_proxies(),
        }
    }
}

pub fn default_trusted_proxies() -> Vec<String> {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database = DatabaseConfig {
            backend: parse_backend(std::env::var("DATABASE_BACKEND").ok()),
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./linkpulse.db?mode=rwc".to_string()),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5)?,
        };

        let api_server = ServerConfig {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("SERVICE_PORT", 8000)?,
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            enabled: env_flag("CACHE_ENABLED", cache_defaults.enabled),
            max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries)?,
            ttl_secs: env_or("CACHE_TTL_SECONDS", cache_defaults.ttl_secs)?,
            sweep_interval_secs: env_or(
                "CACHE_SWEEP_INTERVAL_SECONDS",
                cache_defaults.sweep_interval_secs,
            )?,
        };

        let client_defaults = AnalyticsClientConfig::default();
        let analytics_client = AnalyticsClientConfig {
            endpoint: std::env::var("ANALYTICS_SERVICE_GRPC")
                .map(|target| normalize_grpc_endpoint(&target))
                .unwrap_or(client_defaults.endpoint),
            timeout_ms: env_or("ANALYTICS_TIMEOUT_MS", client_defaults.timeout_ms)?,
            failure_threshold: env_or(
                "ANALYTICS_FAILURE_THRESHOLD",
                client_defaults.failure_threshold,
            )?,
            recovery_timeout_secs: env_or(
                "ANALYTICS_RECOVERY_TIMEOUT_SECONDS",
                client_defaults.recovery_timeout_secs,
            )?,
            half_open_max_calls: env_or(
                "ANALYTICS_HALF_OPEN_MAX_CALLS",
                client_defaults.half_open_max_calls,
            )?,
            probe_interval_secs: env_or(
                "ANALYTICS_PROBE_INTERVAL_SECONDS",
                client_defaults.probe_interval_secs,
            )?,
        };

        let limit_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: env_flag("RATE_LIMIT_ENABLED", limit_defaults.enabled),
            create_per_minute: env_or(
                "RATE_LIMIT_CREATE_PER_MINUTE",
                limit_defaults.create_per_minute,
            )?,
            access_per_minute: env_or(
                "RATE_LIMIT_ACCESS_PER_MINUTE",
                limit_defaults.access_per_minute,
            )?,
            general_per_minute: env_or(
                "RATE_LIMIT_GENERAL_PER_MINUTE",
                limit_defaults.general_per_minute,
            )?,
            trusted_proxies: std::env::var("TRUSTED_PROXIES")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(limit_defaults.trusted_proxies),
        };

        Ok(Config {
            database,
            api_server,
            cache,
            analytics_client,
            rate_limit,
            log: LogConfig::from_env(),
        })
    }
}

impl AnalyticsServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = parse_backend(
            std::env::var("ANALYTICS_DATABASE_BACKEND")
                .or_else(|_| std::env::var("DATABASE_BACKEND"))
                .ok(),
        );

        let url = std::env::var("ANALYTICS_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "sqlite://./linkpulse-analytics.db?mode=rwc".to_string());

        let host = std::env::var("SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(AnalyticsServiceConfig {
            database: DatabaseConfig {
                backend,
                url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            http_server: ServerConfig {
                host: host.clone(),
                port: env_or("SERVICE_PORT", 8001)?,
            },
            grpc_server: ServerConfig {
                host,
                port: env_or("GRPC_PORT", 50051)?,
            },
            log: LogConfig::from_env(),
        })
    }
}

impl LogConfig {
    fn from_env() -> Self {
        let level = std::env::var("LOG_LEVEL")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let format = match std::env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self { level, format }
    }
}

fn parse_backend(value: Option<String>) -> DatabaseBackend {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        Some("postgres") | Some("postgresql") => DatabaseBackend::Postgres,
        Some("sqlite") | None => DatabaseBackend::Sqlite,
        Some(other) => {
            tracing::warn!(
                "Unknown database backend '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
            );
            DatabaseBackend::Sqlite
        }
    }
}

/// tonic needs a scheme; bare `host:port` targets are plain-text HTTP/2.
pub fn normalize_grpc_endpoint(target: &str) -> String {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{target}")
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_grpc_endpoint_adds_scheme() {
        assert_eq!(
            normalize_grpc_endpoint("analytics:50051"),
            "http://analytics:50051"
        );
        assert_eq!(
            normalize_grpc_endpoint("https://analytics.internal:443"),
            "https://analytics.internal:443"
        );
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend(None), DatabaseBackend::Sqlite);
        assert_eq!(
            parse_backend(Some("PostgreSQL".to_string())),
            DatabaseBackend::Postgres
        );
        assert_eq!(
            parse_backend(Some("oracle".to_string())),
            DatabaseBackend::Sqlite
        );
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let cache = CacheConfig::default();
        assert_eq!(cache.ttl(), Duration::from_secs(300));

        let client = AnalyticsClientConfig::default();
        assert_eq!(client.failure_threshold, 5);
        assert_eq!(client.recovery_timeout_secs, 30);
        assert_eq!(client.half_open_max_calls, 3);
        assert_eq!(client.timeout_ms, 2_000);
    }
}
