//! Circuit breaker guarding outbound provider calls.
//!
//! Three states. Closed counts consecutive trippable failures and opens at
//! the threshold. Open fails fast until the cooldown elapses, then the next
//! caller probes in Half-open: success closes the circuit and resets the
//! counter, failure re-opens it and restarts the cooldown. State is
//! per-process behind a mutex.

use crate::llm::LlmError;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Gate an outbound call. While Open and cooling down this fails fast
    /// with `CircuitOpen`; after the cooldown the caller becomes the
    /// Half-open probe.
    pub fn try_acquire(&self) -> Result<(), LlmError> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!("circuit breaker half-open; probing provider");
                    Ok(())
                } else {
                    Err(LlmError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.state != BreakerState::Closed {
            tracing::info!("circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("circuit breaker re-opened: probe failed");
            }
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(cooldown_ms))
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = breaker(3, 60_000);
        for _ in 0..2 {
            cb.try_acquire().unwrap();
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        // Next call fails fast without touching the network.
        assert!(matches!(cb.try_acquire(), Err(LlmError::CircuitOpen)));
    }

    #[test]
    fn success_resets_the_counter() {
        let cb = breaker(3, 60_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_closes_on_success_and_reopens_on_failure() {
        let cb = breaker(1, 0);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        // Cooldown of zero: the next acquire becomes the probe.
        cb.try_acquire().unwrap();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        cb.try_acquire().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
