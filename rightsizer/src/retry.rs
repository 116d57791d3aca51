use std::time::{Duration, Instant};

use backoff::{future::retry, Error as BackoffError, ExponentialBackoffBuilder};

use crate::applier::{ApplyOutcome, ApplyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    consecutive_failures: u32,
    state: CircuitState,
    opened_at: Option<Instant>,
}

/// Circuit breaker over the cluster-API surface (spec.md §4.10). Opens
/// after `failure_threshold` consecutive `Transient`/`Conflict` outcomes,
/// causing the caller to back off entirely; a half-open probe is allowed
/// once `open_duration` has elapsed.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: parking_lot::Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        CircuitBreaker {
            failure_threshold,
            open_duration,
            inner: parking_lot::Mutex::new(Inner {
                consecutive_failures: 0,
                state: CircuitState::Closed,
                opened_at: None,
            }),
        }
    }

    /// True when a call may proceed. `Open` becomes `HalfOpen` (permitting
    /// exactly the caller that observes this transition) once
    /// `open_duration` has elapsed since the trip.
    pub fn is_call_permitted(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.state == CircuitState::HalfOpen || inner.consecutive_failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().state, CircuitState::Open)
    }
}

/// `Transient` and `Conflict` outcomes retry; `Rejected` and `NotSupported`
/// do not (spec.md §4.10). `Applied`/`PartiallyApplied` are terminal
/// successes.
fn is_retryable(outcome: &ApplyOutcome) -> bool {
    matches!(outcome, ApplyOutcome::Transient(_) | ApplyOutcome::Conflict)
}

/// Retries a single container's apply with exponential backoff and jitter,
/// feeding outcomes to the circuit breaker and short-circuiting immediately
/// if the breaker is already open (spec.md §4.10 "the governor backs off
/// entirely for a cool-down").
pub async fn apply_with_retry<F, Fut>(
    breaker: &CircuitBreaker,
    initial_interval: Duration,
    max_elapsed: Duration,
    mut attempt: F,
) -> ApplyResult
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ApplyResult>,
{
    if !breaker.is_call_permitted() {
        return ApplyResult {
            outcome: ApplyOutcome::Transient("circuit_open".to_owned()),
            restarted: false,
        };
    }

    let backoff_policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(initial_interval)
        .with_max_elapsed_time(Some(max_elapsed))
        .build();

    let result = retry(backoff_policy, || {
        let fut = attempt();
        async {
            let result = fut.await;
            if is_retryable(&result.outcome) {
                breaker.record_failure();
                Err(BackoffError::transient(result))
            } else {
                breaker.record_success();
                Ok(result)
            }
        }
    })
    .await;

    match result {
        Ok(result) => result,
        Err(result) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(breaker.is_call_permitted());
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(!breaker.is_call_permitted());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn transient_outcome_eventually_exhausts_and_returns_last_result() {
        let breaker = CircuitBreaker::new(10, Duration::from_secs(60));
        let result = apply_with_retry(&breaker, Duration::from_millis(1), Duration::from_millis(20), || async {
            ApplyResult {
                outcome: ApplyOutcome::Transient("still down".to_owned()),
                restarted: false,
            }
        })
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Transient("still down".to_owned()));
    }

    #[tokio::test]
    async fn rejected_outcome_does_not_retry() {
        let breaker = CircuitBreaker::new(10, Duration::from_secs(60));
        let mut calls = 0;
        let result = apply_with_retry(&breaker, Duration::from_millis(1), Duration::from_millis(50), || {
            calls += 1;
            async move {
                ApplyResult {
                    outcome: ApplyOutcome::Rejected("bad request".to_owned()),
                    restarted: false,
                }
            }
        })
        .await;
        assert_eq!(result.outcome, ApplyOutcome::Rejected("bad request".to_owned()));
        assert_eq!(calls, 1);
    }
}
