//! AgentPay Resilience - circuit breaker and bounded backoff
//!
//! One [`CircuitBreaker`] wraps one logical external dependency. Breakers
//! for different dependencies never share state or locks. Retries are NOT
//! the breaker's job - a single failure counts toward the threshold;
//! [`retry::with_backoff`] exists only for dependency initialization.

pub mod breaker;
pub mod retry;

pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerSnapshot,
    CircuitState,
};
pub use retry::with_backoff;
