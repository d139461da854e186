//! Per-service circuit breaker.
//!
//! Each service name gets one breaker guarding its dispatches. The breaker
//! counts consecutive transport failures, fast-fails while open, and allows a
//! single trial call once the reset timeout elapses. Operations are closures
//! producing futures, so a fast-fail never even constructs the call.
use std::{
    fmt,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use thiserror::Error;

use crate::{
    config::CircuitBreakerConfig,
    metrics::{record_circuit_breaker_transition, set_circuit_breaker_state},
};

/// Lifecycle state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; consecutive failures are counted
    Closed,
    /// Calls fast-fail without reaching the backend
    Open,
    /// One trial call is probing the backend; everyone else fast-fails
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Errors surfaced by [`CircuitBreaker::execute`]
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit was open (or a half-open trial was already in flight)
    /// and the call was rejected without running
    #[error("Circuit open for service [{service}]")]
    Open { service: String },

    /// The operation ran longer than the configured call timeout
    #[error("Call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The operation itself failed
    #[error("{0}")]
    Operation(E),
}

/// Called after the breaker transitions to open, outside the state lock.
type OpenListener = Box<dyn Fn(&str) + Send + Sync>;

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for one service name.
///
/// State transitions follow the classic three-state model:
/// CLOSED -> OPEN after `max_failures` consecutive failures, OPEN ->
/// HALF_OPEN once `reset_timeout` has elapsed (the transitioning call becomes
/// the single trial), HALF_OPEN -> CLOSED on trial success or back to OPEN on
/// trial failure. Successes reset the failure count; a timeout counts as a
/// failure.
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    open_listener: Option<OpenListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker for `service` with the given settings.
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let service = service.into();
        set_circuit_breaker_state(&service, CircuitState::Closed);
        Self {
            service,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            open_listener: None,
        }
    }

    /// Attach a listener fired on every transition to open.
    ///
    /// The gateway uses this to drop the cached endpoint for the service so
    /// a later trial resolves a fresh one.
    pub fn with_open_listener(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.open_listener = Some(Box::new(listener));
        self
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Run `operation` under the breaker.
    ///
    /// While the circuit is open (or a half-open trial is already running)
    /// the operation closure is never invoked and the call fails immediately
    /// with [`CircuitBreakerError::Open`]. Otherwise the produced future is
    /// raced against the call timeout; exceeding it drops the future, so a
    /// late completion cannot surface a second outcome. The caller receives
    /// exactly one result either way.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match tokio::time::timeout(self.config.call_timeout(), operation()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(error))
            }
            Err(_) => {
                self.record_failure();
                Err(CircuitBreakerError::Timeout {
                    timeout_ms: self.config.call_timeout_ms,
                })
            }
        }
    }

    /// Run `operation` under the breaker, mapping failures through `fallback`.
    ///
    /// The fallback is invoked with the error, and its value becomes the
    /// overall result, whenever the call was rejected on an open circuit, or
    /// for any failure when `fallback_on_failure` is configured. Other
    /// failures surface unchanged.
    pub async fn execute_with_fallback<T, E, F, Fut, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(error) => {
                let rejected = matches!(error, CircuitBreakerError::Open { .. });
                if rejected || self.config.fallback_on_failure {
                    Ok(fallback(error))
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Admit a call, or reject it while the circuit is open.
    ///
    /// When the reset timeout has elapsed this moves the breaker to
    /// HALF_OPEN and admits the caller as the single trial.
    fn try_acquire<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(self.rejected()),
            CircuitState::Open => {
                let reset_elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout())
                    .unwrap_or(true);
                if reset_elapsed {
                    inner.state = CircuitState::HalfOpen;
                    self.transitioned(CircuitState::HalfOpen);
                    tracing::info!(
                        service = %self.service,
                        "Circuit half-open, admitting one trial call"
                    );
                    Ok(())
                } else {
                    Err(self.rejected())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            self.transitioned(CircuitState::Closed);
            tracing::info!(service = %self.service, "Circuit closed after successful trial");
        }
    }

    fn record_failure(&self) {
        let opened = {
            let mut inner = self.lock();
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            match inner.state {
                CircuitState::Closed if inner.consecutive_failures >= self.config.max_failures => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    self.transitioned(CircuitState::Open);
                    tracing::warn!(
                        service = %self.service,
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                    true
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    self.transitioned(CircuitState::Open);
                    tracing::warn!(service = %self.service, "Trial call failed, circuit reopened");
                    true
                }
                // Late outcome of a call admitted before the trip; counted, no transition
                _ => false,
            }
        };

        if opened {
            if let Some(listener) = &self.open_listener {
                listener(&self.service);
            }
        }
    }

    fn rejected<E>(&self) -> CircuitBreakerError<E> {
        CircuitBreakerError::Open {
            service: self.service.clone(),
        }
    }

    fn transitioned(&self, to: CircuitState) {
        set_circuit_breaker_state(&self.service, to);
        record_circuit_breaker_transition(&self.service, to);
    }

    // No caller-supplied code runs under the lock, so a poisoned guard still
    // holds consistent state and can be reused.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
