//! Failure-counting circuit breaker guarding the analytics RPC.
//!
//! ```text
//!   CLOSED --(failure_threshold failures)--> OPEN
//!   OPEN --(recovery_timeout elapsed)--> HALF_OPEN
//!   HALF_OPEN --(half_open_max_calls successes)--> CLOSED
//!   HALF_OPEN --(any failure)--> OPEN
//!   any --(reset)--> CLOSED
//! ```

use crate::config::AnalyticsClientConfig;
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

impl From<&AnalyticsClientConfig> for CircuitBreakerConfig {
    fn from(config: &AnalyticsClientConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            half_open_max_calls: config.half_open_max_calls.max(1),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("circuit breaker is open")]
pub struct CircuitOpen;

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    /// Trial calls admitted since entering HALF_OPEN
    half_open_calls: u32,
    half_open_successes: u32,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            half_open_calls: 0,
            half_open_successes: 0,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_calls = 0;
        self.half_open_successes = 0;
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Ask to place one call. An OPEN circuit whose recovery timeout has
    /// elapsed moves to HALF_OPEN and admits the caller as a trial call.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened| opened.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed < self.config.recovery_timeout {
                    return Err(CircuitOpen);
                }
                inner.state = CircuitState::HalfOpen;
                inner.half_open_calls = 1;
                inner.half_open_successes = 0;
                info!(breaker = %self.name, "circuit half-open, probing");
                Ok(())
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    return Err(CircuitOpen);
                }
                inner.half_open_calls += 1;
                Ok(())
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    *inner = BreakerState::closed();
                    info!(breaker = %self.name, "circuit closed after successful probes");
                }
            }
            // A call admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.open();
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.open();
                warn!(breaker = %self.name, "probe failed, circuit reopened");
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    /// Force the circuit CLOSED, clearing all counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        *inner = BreakerState::closed();
        if previous != CircuitState::Closed {
            info!(breaker = %self.name, from = %previous, "circuit reset");
        }
    }
}
