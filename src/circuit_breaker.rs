//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for language-model
//! backend calls. When completions fail repeatedly the breaker opens and
//! further calls fail fast until the reset window has elapsed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for backend completion calls
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold reached, requests fail fast
/// - **Half-Open**: Reset window elapsed, the next request is let through and
///   its outcome decides whether the breaker closes or re-opens
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Consecutive failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before a trial request (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tarot_chat_bot::config::RecoveryConfig;
    /// use tarot_chat_bot::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new(&RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: config.circuit_breaker_threshold.max(1),
            reset_after: Duration::from_secs(config.circuit_breaker_reset_secs),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if the breaker is open (blocking requests)
    ///
    /// Returns `false` once the reset window has elapsed so that a trial
    /// request can go through (half-open).
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        if state.consecutive_failures < self.threshold {
            return false;
        }
        match state.last_failure {
            Some(at) => at.elapsed() < self.reset_after,
            None => false,
        }
    }

    /// Record a failed backend call
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());
    }

    /// Record a successful backend call, closing the breaker
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.last_failure = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, reset_secs: u64) -> RecoveryConfig {
        RecoveryConfig {
            circuit_breaker_threshold: threshold,
            circuit_breaker_reset_secs: reset_secs,
            ..Default::default()
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(&config(2, 60));
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_closes() {
        let breaker = CircuitBreaker::new(&config(1, 60));
        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_after_reset_window() {
        let breaker = CircuitBreaker::new(&config(1, 0));
        breaker.record_failure();
        // Zero-second window: a trial request is allowed immediately
        assert!(!breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 1);
    }
}
