//! Circuit breaker and retry behaviour of the analytics RPC client
//!
//! A scripted transport stands in for the network; the clock is paused so
//! backoff and recovery timeouts elapse instantly.

use async_trait::async_trait;
use linkpulse::models::ClickInfo;
use linkpulse::rpc::proto::{RecordClickRequest, RecordClickResponse};
use linkpulse::rpc::{
    spawn_reconnect_monitor, AnalyticsClientError, CircuitBreakerConfig, CircuitState,
    ClickRecorder, ClickTransport, ResilientAnalyticsClient,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tonic::{Code, Status};

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail(Code),
    Reject,
    Hang,
}

struct ScriptedTransport {
    behaviour: Mutex<Behaviour>,
    calls: AtomicU32,
    reconnects: AtomicU32,
    reconnect_ok: Mutex<bool>,
}

impl ScriptedTransport {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Mutex::new(behaviour),
            calls: AtomicU32::new(0),
            reconnects: AtomicU32::new(0),
            reconnect_ok: Mutex::new(true),
        })
    }

    fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock() = behaviour;
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClickTransport for ScriptedTransport {
    async fn record_click(&self, _request: RecordClickRequest) -> Result<RecordClickResponse, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.behaviour.lock();
        match behaviour {
            Behaviour::Succeed => Ok(RecordClickResponse { success: true }),
            Behaviour::Reject => Ok(RecordClickResponse { success: false }),
            Behaviour::Fail(code) => Err(Status::new(code, "scripted failure")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(RecordClickResponse { success: true })
            }
        }
    }

    fn link_down(&self) -> bool {
        matches!(*self.behaviour.lock(), Behaviour::Fail(Code::Unavailable))
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if *self.reconnect_ok.lock() {
            Ok(())
        } else {
            anyhow::bail!("connection refused")
        }
    }
}

fn client(transport: &Arc<ScriptedTransport>) -> ResilientAnalyticsClient {
    ResilientAnalyticsClient::new(
        Arc::clone(transport) as Arc<dyn ClickTransport>,
        CircuitBreakerConfig::default(),
        Duration::from_secs(2),
    )
}

async fn report(client: &ResilientAnalyticsClient) -> Result<(), AnalyticsClientError> {
    client.record_click("AbCd1234", ClickInfo::default()).await
}

async fn open_circuit(client: &ResilientAnalyticsClient) {
    for _ in 0..5 {
        assert!(report(client).await.is_err());
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_is_attempted_three_times() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = client(&transport);

    let err = report(&client).await.unwrap_err();
    assert!(matches!(err, AnalyticsClientError::Rpc { code: Code::Unavailable, .. }));
    assert_eq!(transport.calls(), 3);
    assert_eq!(client.breaker().failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_opens_after_five_failures_and_fails_fast() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = client(&transport);

    open_circuit(&client).await;
    let calls = transport.calls();

    let err = report(&client).await.unwrap_err();
    assert!(matches!(err, AnalyticsClientError::CircuitOpen(_)));
    assert_eq!(transport.calls(), calls, "open circuit must not touch the network");
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probes_close_the_circuit() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = client(&transport);
    open_circuit(&client).await;

    transport.set(Behaviour::Succeed);
    tokio::time::advance(Duration::from_secs(31)).await;

    report(&client).await.unwrap();
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);
    report(&client).await.unwrap();
    report(&client).await.unwrap();
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    assert_eq!(client.breaker().failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = client(&transport);
    open_circuit(&client).await;

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(report(&client).await.is_err());
    assert_eq!(client.circuit_state(), CircuitState::Open);

    // The recovery timeout starts over
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(matches!(
        report(&client).await,
        Err(AnalyticsClientError::CircuitOpen(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_count() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = client(&transport);

    for _ in 0..4 {
        assert!(report(&client).await.is_err());
    }
    transport.set(Behaviour::Succeed);
    report(&client).await.unwrap();
    assert_eq!(client.breaker().failure_count(), 0);

    transport.set(Behaviour::Fail(Code::Unavailable));
    for _ in 0..4 {
        assert!(report(&client).await.is_err());
    }
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_codes_are_attempted_once() {
    for code in [
        Code::InvalidArgument,
        Code::NotFound,
        Code::PermissionDenied,
        Code::Unauthenticated,
    ] {
        let transport = ScriptedTransport::new(Behaviour::Fail(code));
        let client = client(&transport);

        assert!(report(&client).await.is_err());
        assert_eq!(transport.calls(), 1, "{code:?}");
        assert_eq!(client.breaker().failure_count(), 1, "{code:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_unsuccessful_response_counts_as_failure() {
    let transport = ScriptedTransport::new(Behaviour::Reject);
    let client = client(&transport);

    let err = report(&client).await.unwrap_err();
    assert!(matches!(err, AnalyticsClientError::Rejected));
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.breaker().failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_each_attempt_is_bounded_by_the_timeout() {
    let transport = ScriptedTransport::new(Behaviour::Hang);
    let client = client(&transport);

    let started = tokio::time::Instant::now();
    let err = report(&client).await.unwrap_err();
    assert!(matches!(err, AnalyticsClientError::Timeout));
    assert_eq!(transport.calls(), 3);

    // Three 2s attempts plus 0.1s and 0.2s of backoff
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(6300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(6400), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resets_circuit() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = client(&transport);
    open_circuit(&client).await;

    client.reconnect().await.unwrap();
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    assert_eq!(client.breaker().failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reconnect_keeps_circuit_open() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    *transport.reconnect_ok.lock() = false;
    let client = client(&transport);
    open_circuit(&client).await;

    assert!(client.reconnect().await.is_err());
    assert_eq!(client.circuit_state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_redials_while_link_is_down() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Unavailable));
    let client = Arc::new(client(&transport));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = spawn_reconnect_monitor(Arc::clone(&client), Duration::from_secs(5), shutdown_rx);

    // Nothing to do while the circuit is closed
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(transport.reconnects.load(Ordering::SeqCst), 0);

    open_circuit(&client).await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(transport.reconnects.load(Ordering::SeqCst) >= 1);
    assert_eq!(client.circuit_state(), CircuitState::Closed);

    shutdown_tx.send(true).unwrap();
    monitor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_monitor_leaves_application_errors_to_recovery_timeout() {
    let transport = ScriptedTransport::new(Behaviour::Fail(Code::Internal));
    let client = Arc::new(client(&transport));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = spawn_reconnect_monitor(Arc::clone(&client), Duration::from_secs(5), shutdown_rx);

    open_circuit(&client).await;
    let calls = transport.calls();

    // The server is reachable, so the breaker must hold for its full 30s
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(transport.reconnects.load(Ordering::SeqCst), 0);
    assert_eq!(client.circuit_state(), CircuitState::Open);
    assert!(matches!(
        report(&client).await,
        Err(AnalyticsClientError::CircuitOpen(_))
    ));
    assert_eq!(transport.calls(), calls);

    // Past the recovery timeout one trial call is admitted
    tokio::time::sleep(Duration::from_secs(6)).await;
    transport.set(Behaviour::Succeed);
    report(&client).await.unwrap();
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);
    assert_eq!(transport.reconnects.load(Ordering::SeqCst), 0);

    shutdown_tx.send(true).unwrap();
    monitor.await.unwrap();
}
