pub mod extract;
pub mod handlers;
pub mod health;
pub mod ip_extractor;
pub mod rate_limit;
pub mod routes;

pub use extract::ClickContext;
pub use handlers::AppState;
pub use ip_extractor::{extract_client_ip, TrustedProxies};
pub use rate_limit::{spawn_cleanup, RateLimiter};
pub use routes::{cors_layer, create_router, API_PREFIX};
