//! Circuit breaker guarding the remote inference endpoint

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,   // Normal operation
    Open,     // Failing, skip the endpoint
    HalfOpen, // Next call probes for recovery
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: usize,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Consecutive-failure breaker for a single upstream
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                opened_at: None,
            }),
            config,
        }
    }

    /// Whether calls should be skipped right now
    ///
    /// An open breaker moves to half-open once the reset timeout elapses.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => false,
            BreakerState::Open => match inner.opened_at {
                Some(opened_at) if opened_at.elapsed() >= self.config.reset_timeout => {
                    inner.state = BreakerState::HalfOpen;
                    false
                }
                _ => true,
            },
        }
    }

    pub fn mark_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.opened_at = None;
    }

    pub fn mark_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        // A failed half-open probe reopens immediately
        if inner.state == BreakerState::HalfOpen || inner.failure_count >= self.config.failure_threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        BreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failure_count: usize,
    pub last_failure: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_by_default() {
        let breaker = CircuitBreaker::default();
        assert!(!breaker.is_open());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        });

        breaker.mark_failure();
        breaker.mark_failure();
        assert!(!breaker.is_open());

        breaker.mark_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.stats().failure_count, 3);
    }

    #[test]
    fn test_success_resets() {
        let breaker = CircuitBreaker::default();
        breaker.mark_failure();
        breaker.mark_failure();
        breaker.mark_success();

        let stats = breaker.stats();
        assert_eq!(stats.state, BreakerState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert!(stats.last_failure.is_none());
    }

    #[test]
    fn test_half_open_after_timeout_and_reopens_on_failure() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(50),
        });

        breaker.mark_failure();
        breaker.mark_failure();
        assert!(breaker.is_open());

        std::thread::sleep(Duration::from_millis(80));
        assert!(!breaker.is_open());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.mark_failure();
        assert!(breaker.is_open());
    }
}
