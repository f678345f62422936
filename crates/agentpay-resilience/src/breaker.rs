//! Circuit breaker for external calls
//!
//! States: CLOSED (normal), OPEN (fail fast), HALF_OPEN (trial). The state
//! lock is never held across an await; at most one trial call is in flight
//! while half-open.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long to fail fast before allowing a trial call
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes required to close
    pub success_threshold: u32,
    /// Deadline for each wrapped call
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Error from a breaker-wrapped call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open; the wrapped function was not invoked
    #[error("circuit breaker {name} is open")]
    Open { name: String },

    /// The wrapped call exceeded the breaker's deadline
    #[error("circuit breaker {name}: call timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The wrapped call itself failed
    #[error("{0}")]
    Inner(E),
}

/// Serializable view of a breaker's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    /// A half-open trial call is currently in flight
    probe_in_flight: bool,
}

/// A circuit breaker for one named external dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given name and tuning
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_failure_at: None,
                last_success_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// The dependency this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Serializable view of counters and timestamps
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_at: inner.last_failure_at,
            last_success_at: inner.last_success_at,
        }
    }

    /// Force CLOSED with zeroed counters. Administrative override only.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.probe_in_flight = false;
        warn!(breaker = %self.name, "circuit breaker manually reset");
    }

    /// Run `op` under this breaker's deadline and state machine
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.before_call()?;

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Err(_) => {
                self.on_failure();
                Err(CircuitBreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: self.config.call_timeout,
                })
            }
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure();
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    fn before_call<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if !cooled_down {
                    return Err(CircuitBreakerError::Open {
                        name: self.name.clone(),
                    });
                }
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.probe_in_flight = true;
                debug!(breaker = %self.name, "circuit breaker half-open, allowing trial call");
                Ok(())
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(CircuitBreakerError::Open {
                        name: self.name.clone(),
                    });
                }
                inner.probe_in_flight = true;
                Ok(())
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.probe_in_flight = false;
        inner.last_success_at = Some(Utc::now());
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    debug!(breaker = %self.name, "circuit breaker closed after recovery");
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.probe_in_flight = false;
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        let trip = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;
        if trip && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "circuit breaker opened"
            );
        }
    }
}
