//! Circuit breaker guarding calls to a flaky dependency.
//!
//! ```text
//! Closed --[failure_threshold consecutive failures]--> Open
//! Open --[cooldown elapsed]--> HalfOpen
//! HalfOpen --[probe succeeds]--> Closed
//! HalfOpen --[probe fails]--> Open
//! ```
//!
//! Every transition starts a new generation. Outcomes of calls admitted under an older
//! generation are discarded.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            cooldown: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker {0} is open")]
    Open(&'static str),
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    generation: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Runs `call` if the breaker admits it and records the outcome.
    ///
    /// While open, or while a half-open probe is already in flight, `call` is not invoked and
    /// `BreakerError::Open` is returned. Rejections do not count as failures.
    pub async fn execute<F, Fut, T, E>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(generation) = self.admit() else {
            return Err(BreakerError::Open(self.name()));
        };
        let mut guard = CallGuard {
            breaker: self,
            generation,
            settled: false,
        };

        let result = call().await;
        guard.settle(result.is_ok());

        result.map_err(BreakerError::Inner)
    }

    /// Returns the generation the admitted call belongs to, or `None` when rejected.
    fn admit(&self) -> Option<u64> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Closed => Some(inner.generation),
            CircuitState::Open => None,
            CircuitState::HalfOpen if inner.probe_in_flight => None,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Some(inner.generation)
            }
        }
    }

    fn record(&self, generation: u64, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        if inner.generation != generation {
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.consecutive_failures = 0,
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = self.name,
                        consecutive_failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, true) => {
                info!(breaker = self.name, "Circuit breaker closed after successful probe");
                self.transition(&mut inner, CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, false) => {
                warn!(breaker = self.name, "Circuit breaker probe failed, reopening");
                self.transition(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::Open, _) => {}
        }
    }

    fn refresh(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }

        let cooled_down = inner
            .opened_at
            .map(|opened_at| now.duration_since(opened_at) >= self.config.cooldown)
            .unwrap_or(true);

        if cooled_down {
            info!(breaker = self.name, "Circuit breaker half-open, allowing one probe");
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, state: CircuitState, now: Instant) {
        inner.state = state;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        inner.generation += 1;
        inner.opened_at = (state == CircuitState::Open).then_some(now);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counts an abandoned call (its future dropped mid-flight) as a failure so a half-open
/// probe can never stay in flight forever.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.generation, success);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.generation, false);
        }
    }
}
