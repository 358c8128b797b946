use crate::config::AnalyticsClientConfig;
use crate::models::ClickInfo;
use crate::retry::{with_retry, RetryPolicy};
use crate::rpc::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState};
use crate::rpc::proto::analytics_service_client::AnalyticsServiceClient;
use crate::rpc::proto::{RecordClickRequest, RecordClickResponse};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AnalyticsClientError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),
    #[error("analytics rpc failed with {code:?}: {message}")]
    Rpc { code: Code, message: String },
    #[error("analytics rpc timed out")]
    Timeout,
    #[error("analytics service did not record the click")]
    Rejected,
}

impl From<tonic::Status> for AnalyticsClientError {
    fn from(status: tonic::Status) -> Self {
        AnalyticsClientError::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl AnalyticsClientError {
    /// Transport failures and timeouts are retried; request-level
    /// rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalyticsClientError::Rpc { code, .. } => !matches!(
                code,
                Code::InvalidArgument | Code::NotFound | Code::PermissionDenied | Code::Unauthenticated
            ),
            AnalyticsClientError::Timeout => true,
            AnalyticsClientError::CircuitOpen(_) | AnalyticsClientError::Rejected => false,
        }
    }
}

/// Sink for click reports. Failures are for logging only.
#[async_trait]
pub trait ClickRecorder: Send + Sync {
    async fn record_click(&self, short_link: &str, click: ClickInfo) -> Result<(), AnalyticsClientError>;
}

/// Recorder used where no analytics service is configured.
pub struct DisabledRecorder;

#[async_trait]
impl ClickRecorder for DisabledRecorder {
    async fn record_click(&self, _short_link: &str, _click: ClickInfo) -> Result<(), AnalyticsClientError> {
        Ok(())
    }
}

/// A single `RecordClick` attempt over some connection.
#[async_trait]
pub trait ClickTransport: Send + Sync {
    async fn record_click(&self, request: RecordClickRequest) -> Result<RecordClickResponse, tonic::Status>;

    /// Whether the last attempt failed at connection level. Application
    /// errors from a reachable server leave this false.
    fn link_down(&self) -> bool;

    /// Dial a fresh connection and swap it in
    async fn reconnect(&self) -> anyhow::Result<()>;
}

pub struct GrpcTransport {
    endpoint: Endpoint,
    client: RwLock<AnalyticsServiceClient<Channel>>,
    link_down: AtomicBool,
}

/// tonic reports refused, reset and failed connections as `Unavailable`.
pub fn is_connection_failure(status: &tonic::Status) -> bool {
    status.code() == Code::Unavailable
}

impl GrpcTransport {
    /// The channel connects lazily, so a missing analytics service does not
    /// prevent startup.
    pub fn new(config: &AnalyticsClientConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let endpoint = Endpoint::from_shared(config.endpoint.clone())
            .with_context(|| format!("invalid analytics endpoint '{}'", config.endpoint))?
            .timeout(timeout)
            .connect_timeout(timeout);

        let client = AnalyticsServiceClient::new(endpoint.connect_lazy());

        Ok(Self {
            endpoint,
            client: RwLock::new(client),
            link_down: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ClickTransport for GrpcTransport {
    async fn record_click(&self, request: RecordClickRequest) -> Result<RecordClickResponse, tonic::Status> {
        // Clients share the channel; cloning releases the lock before the call
        let mut client = self.client.read().clone();
        match client.record_click(request).await {
            Ok(response) => {
                self.link_down.store(false, Ordering::Relaxed);
                Ok(response.into_inner())
            }
            Err(status) => {
                self.link_down
                    .store(is_connection_failure(&status), Ordering::Relaxed);
                Err(status)
            }
        }
    }

    fn link_down(&self) -> bool {
        self.link_down.load(Ordering::Relaxed)
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        let channel = self
            .endpoint
            .connect()
            .await
            .with_context(|| format!("failed to connect to {}", self.endpoint.uri()))?;
        *self.client.write() = AnalyticsServiceClient::new(channel);
        self.link_down.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Analytics RPC client combining per-call retry, a per-attempt timeout and
/// a circuit breaker shared by every caller.
pub struct ResilientAnalyticsClient {
    transport: Arc<dyn ClickTransport>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ResilientAnalyticsClient {
    pub fn new(transport: Arc<dyn ClickTransport>, breaker: CircuitBreakerConfig, timeout: Duration) -> Self {
        Self {
            transport,
            breaker: CircuitBreaker::new("analytics", breaker),
            retry: RetryPolicy::rpc(),
            timeout,
        }
    }

    pub fn from_config(config: &AnalyticsClientConfig) -> anyhow::Result<Self> {
        let transport = GrpcTransport::new(config)?;
        info!(endpoint = %config.endpoint, "analytics client configured");
        Ok(Self::new(
            Arc::new(transport),
            CircuitBreakerConfig::from(config),
            Duration::from_millis(config.timeout_ms),
        ))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Whether the transport's last attempt failed to reach the service
    pub fn link_down(&self) -> bool {
        self.transport.link_down()
    }

    /// Re-dial the analytics service. A successful dial is a reconnection
    /// event and closes the circuit.
    pub async fn reconnect(&self) -> anyhow::Result<()> {
        self.transport.reconnect().await?;
        self.breaker.reset();
        info!("analytics transport reconnected");
        Ok(())
    }

    async fn attempt(&self, request: RecordClickRequest) -> Result<RecordClickResponse, AnalyticsClientError> {
        match time::timeout(self.timeout, self.transport.record_click(request)).await {
            Ok(result) => result.map_err(AnalyticsClientError::from),
            Err(_) => Err(AnalyticsClientError::Timeout),
        }
    }
}

#[async_trait]
impl ClickRecorder for ResilientAnalyticsClient {
    async fn record_click(&self, short_link: &str, click: ClickInfo) -> Result<(), AnalyticsClientError> {
        if let Err(open) = self.breaker.try_acquire() {
            debug!(short_link, "circuit open, click not reported");
            return Err(open.into());
        }

        let request = RecordClickRequest {
            short_link: short_link.to_string(),
            click: Some(click.into()),
        };

        let outcome = with_retry(
            "record click",
            &self.retry,
            AnalyticsClientError::is_retryable,
            || self.attempt(request.clone()),
        )
        .await;

        match outcome {
            Ok(response) if response.success => {
                self.breaker.record_success();
                Ok(())
            }
            Ok(_) => {
                self.breaker.record_failure();
                Err(AnalyticsClientError::Rejected)
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }
}

/// While the circuit is not CLOSED and the link itself is down, periodically
/// re-dial the analytics service until a connection succeeds. Circuits opened
/// by application errors from a reachable server are left to the breaker's
/// own recovery timeout.
pub fn spawn_reconnect_monitor(
    client: Arc<ResilientAnalyticsClient>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period.max(Duration::from_millis(10)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if client.circuit_state() == CircuitState::Closed || !client.link_down() {
                        continue;
                    }
                    if let Err(err) = client.reconnect().await {
                        debug!(error = %err, "analytics service still unreachable");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Analytics reconnect monitor stopped");
                        break;
                    }
                }
            }
        }
    })
}

/// Report a click in the background. The caller never waits for it and
/// failures are only logged.
pub fn spawn_click_report(recorder: Arc<dyn ClickRecorder>, short_link: String, click: ClickInfo) {
    tokio::spawn(async move {
        match recorder.record_click(&short_link, click).await {
            Ok(()) => debug!(short_link = %short_link, "click recorded"),
            Err(AnalyticsClientError::CircuitOpen(_)) => {
                debug!(short_link = %short_link, "click dropped, analytics circuit open")
            }
            Err(err) => warn!(short_link = %short_link, error = %err, "failed to record click"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: Code) -> AnalyticsClientError {
        AnalyticsClientError::from(tonic::Status::new(code, "boom"))
    }

    #[test]
    fn test_request_level_errors_are_not_retryable() {
        for code in [
            Code::InvalidArgument,
            Code::NotFound,
            Code::PermissionDenied,
            Code::Unauthenticated,
        ] {
            assert!(!rpc_error(code).is_retryable(), "{code:?}");
        }
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        for code in [Code::Unavailable, Code::DeadlineExceeded, Code::Internal, Code::Unknown] {
            assert!(rpc_error(code).is_retryable(), "{code:?}");
        }
        assert!(AnalyticsClientError::Timeout.is_retryable());
        assert!(!AnalyticsClientError::Rejected.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_rejects_invalid_endpoint() {
        let config = AnalyticsClientConfig {
            endpoint: "not a uri".to_string(),
            ..AnalyticsClientConfig::default()
        };
        assert!(GrpcTransport::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_marks_link_down() {
        let config = AnalyticsClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            ..AnalyticsClientConfig::default()
        };
        let transport = GrpcTransport::new(&config).unwrap();
        assert!(!transport.link_down());

        let status = transport
            .record_click(RecordClickRequest::default())
            .await
            .unwrap_err();
        assert!(is_connection_failure(&status), "{status:?}");
        assert!(transport.link_down());
    }

    #[test]
    fn test_only_unavailable_is_a_connection_failure() {
        assert!(is_connection_failure(&tonic::Status::unavailable("refused")));
        for code in [Code::Internal, Code::Unknown, Code::DeadlineExceeded, Code::InvalidArgument] {
            assert!(!is_connection_failure(&tonic::Status::new(code, "boom")), "{code:?}");
        }
    }
}
