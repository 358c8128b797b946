//! Click reporting between the shortener and the analytics service
//!
//! The shortener side is a [`ResilientAnalyticsClient`]: every call passes a
//! shared [`CircuitBreaker`] and runs its own retry loop. The analytics side
//! is the tonic service in [`server`].

pub mod circuit_breaker;
pub mod client;
pub mod proto;
pub mod server;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState};
pub use client::{
    spawn_click_report, spawn_reconnect_monitor, AnalyticsClientError, ClickRecorder,
    ClickTransport, DisabledRecorder, GrpcTransport, ResilientAnalyticsClient,
};
pub use server::{analytics_grpc_service, AnalyticsGrpcService};
