pub mod analytics;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod rpc;
pub mod shortener;
pub mod shutdown;
pub mod storage;
pub mod telemetry;
pub mod validation;
