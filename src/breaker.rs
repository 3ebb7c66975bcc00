//! Per-provider circuit breaker.
//!
//! CLOSED counts consecutive failures; at the threshold the circuit OPENs
//! and fast-rejects calls until the recovery window elapses, then HALF_OPEN
//! admits exactly one trial call. Success closes the circuit and resets the
//! count; failure re-opens it with a refreshed window.
//!
//! The check-then-mutate sequence is serialized behind a mutex. The lock is
//! never held across the awaited call, so concurrent requests to other
//! providers (or the OPEN fast-reject path) never block on an in-flight
//! provider call.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    next_attempt: Option<Instant>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_time: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_time,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                next_attempt: None,
            }),
        }
    }

    /// Current state, for response metadata. May be momentarily stale under
    /// concurrency; transitions themselves are never lost.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    #[cfg(test)]
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Run `call` under the breaker. While OPEN inside the recovery window
    /// the call is rejected without being invoked; otherwise the outcome is
    /// recorded against the failure tally.
    pub async fn execute<F, Fut, T>(&self, provider: &str, call: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.admit(provider)?;

        match call().await {
            Ok(value) => {
                self.on_success(provider);
                Ok(value)
            }
            Err(err) => {
                self.on_failure(provider);
                Err(err)
            }
        }
    }

    /// Decide whether a call may proceed, transitioning OPEN to HALF_OPEN
    /// once the recovery window has elapsed. HALF_OPEN admits a single
    /// trial, so a second caller arriving mid-trial is rejected.
    fn admit(&self, provider: &str) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(GatewayError::CircuitOpen {
                provider: provider.to_string(),
            }),
            CircuitState::Open => {
                let recovered = inner
                    .next_attempt
                    .map(|at| Instant::now() > at)
                    .unwrap_or(true);
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    warn!(provider, "circuit breaker HALF_OPEN, admitting trial call");
                    Ok(())
                } else {
                    Err(GatewayError::CircuitOpen {
                        provider: provider.to_string(),
                    })
                }
            }
        }
    }

    fn on_success(&self, provider: &str) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!(provider, "circuit breaker CLOSED after recovery");
        }
        inner.failure_count = 0;
        inner.state = CircuitState::Closed;
        inner.next_attempt = None;
    }

    fn on_failure(&self, provider: &str) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        warn!(
            provider,
            failure_count = inner.failure_count,
            "provider failure recorded"
        );

        let tripped = inner.failure_count >= self.failure_threshold
            || inner.state == CircuitState::HalfOpen;
        if tripped {
            inner.state = CircuitState::Open;
            inner.next_attempt = Some(Instant::now() + self.recovery_time);
            error!(
                provider,
                recovery_time_ms = self.recovery_time.as_millis() as u64,
                "circuit breaker OPENED"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Mutex poisoning only happens if a holder panicked; the guarded
        // state is still a valid breaker snapshot.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(recovery_ms))
    }

    async fn failing_call(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), GatewayError> {
        breaker
            .execute("mock", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GatewayError::Provider {
                    provider: "mock".to_string(),
                    message: "boom".to_string(),
                })
            })
            .await
    }

    #[tokio::test]
    async fn test_trips_after_threshold() {
        let breaker = breaker(3, 10_000);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(failing_call(&breaker, &calls).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Open circuit rejects without invoking the call.
        let err = failing_call(&breaker, &calls).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovery_admits_one_trial_then_closes() {
        let breaker = breaker(1, 20);
        let calls = AtomicU32::new(0);

        assert!(failing_call(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = breaker
            .execute("mock", || async { Ok::<_, GatewayError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(1, 20);
        let calls = AtomicU32::new(0);

        assert!(failing_call(&breaker, &calls).await.is_err());
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Trial call fails: straight back to OPEN with a fresh window.
        assert!(failing_call(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = failing_call(&breaker, &calls).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_concurrent_trial() {
        let breaker = Arc::new(breaker(1, 10));
        let calls = AtomicU32::new(0);
        assert!(failing_call(&breaker, &calls).await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = Arc::clone(&breaker);
        let trial = tokio::spawn(async move {
            trial_breaker
                .execute("mock", || async {
                    let _ = release_rx.await;
                    Ok::<_, GatewayError>("trial")
                })
                .await
        });

        // Give the trial a chance to be admitted, then race a second call.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = breaker
            .execute("mock", || async { Ok::<_, GatewayError>("second") })
            .await;
        assert!(matches!(second, Err(GatewayError::CircuitOpen { .. })));

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), "trial");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(5, 10_000);
        let calls = AtomicU32::new(0);

        for _ in 0..4 {
            assert!(failing_call(&breaker, &calls).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 4);

        breaker
            .execute("mock", || async { Ok::<_, GatewayError>(()) })
            .await
            .unwrap();
        assert_eq!(breaker.failure_count(), 0);
    }
}
