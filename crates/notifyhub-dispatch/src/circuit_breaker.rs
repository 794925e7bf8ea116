//! Per-sender circuit breaker. The dispatcher keeps one breaker per
//! registered sender name so a failing provider doesn't get hammered
//! while others keep flowing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_failure_time: RwLock<Option<Instant>>,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_failure_time: RwLock::new(None),
            failure_threshold,
            success_threshold,
            reset_timeout,
        }
    }

    pub fn allow_request(&self) -> bool {
        let state = *self.state.read();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = *self.last_failure_time.read() {
                    if last_failure.elapsed() >= self.reset_timeout {
                        *self.state.write() = CircuitState::HalfOpen;
                        self.success_count.store(0, Ordering::SeqCst);
                        tracing::debug!("circuit breaker transitioning to half-open");
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let state = *self.state.read();
        match state {
            CircuitState::HalfOpen => {
                let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.success_threshold {
                    *self.state.write() = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::SeqCst);
                    tracing::info!(successes = count, "circuit breaker closed");
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let state = *self.state.read();
        match state {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.failure_threshold {
                    *self.state.write() = CircuitState::Open;
                    *self.last_failure_time.write() = Some(Instant::now());
                    tracing::warn!(failures = count, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                *self.state.write() = CircuitState::Open;
                *self.last_failure_time.write() = Some(Instant::now());
                self.success_count.store(0, Ordering::SeqCst);
                tracing::warn!("circuit breaker re-opened on failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(10, 5, Duration::from_secs(5))
    }
}

/// One breaker per sender name, created lazily on first use.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, sender_name: &str) -> bool {
        self.breakers
            .entry(sender_name.to_string())
            .or_insert_with(CircuitBreaker::default)
            .allow_request()
    }

    pub fn record_success(&self, sender_name: &str) {
        self.breakers
            .entry(sender_name.to_string())
            .or_insert_with(CircuitBreaker::default)
            .record_success();
    }

    pub fn record_failure(&self, sender_name: &str) {
        self.breakers
            .entry(sender_name.to_string())
            .or_insert_with(CircuitBreaker::default)
            .record_failure();
    }

    pub fn state_of(&self, sender_name: &str) -> Option<CircuitState> {
        self.breakers.get(sender_name).map(|b| b.state())
    }
}
