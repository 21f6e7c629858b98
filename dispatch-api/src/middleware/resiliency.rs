use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing fast
    HalfOpen, // Letting a trial call through
}

struct Inner {
    state: CircuitState,
    failures: usize,
    opened_at: Option<Instant>,
}

/// Guards an unreliable downstream (the push provider).
pub struct CircuitBreaker {
    pub name: String,
    failure_threshold: usize,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: threshold,
            reset_timeout: timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Whether a call may go through now.
    pub async fn check(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if expired {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                }
                expired
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen {
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failures += 1;
        if inner.failures >= self.failure_threshold || inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::error!(
                "Circuit Breaker [{}] tripped to Open after {} failures",
                self.name,
                inner.failures
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trips_after_threshold() {
        let cb = CircuitBreaker::new("push", 2, Duration::from_secs(30));
        cb.record_failure().await;
        assert!(cb.check().await);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.check().await);
    }

    #[tokio::test]
    async fn test_half_open_trial_call() {
        let cb = CircuitBreaker::new("push", 1, Duration::from_millis(0));
        cb.record_failure().await;
        assert!(cb.check().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        // A failed trial call reopens immediately.
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        assert!(cb.check().await);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
