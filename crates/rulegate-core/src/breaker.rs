//! Circuit breaker guarding calls to the rule-store dependency.
//!
//! Closed passes calls through; Open rejects immediately; HalfOpen admits
//! exactly one trial call per Open period. The admission decision and the
//! state word live behind one async mutex, so two callers can never both
//! observe HalfOpen and both issue a trial. Every guarded call is bounded
//! by a hard timeout; a hung dependency counts as a failure.
//!
//! The breaker is an explicit object owned by the orchestrator and passed
//! to the stages that need it. There is no global instance.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::GateError;
use crate::violation::Stage;

/// Externally visible breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip Closed into Open.
    pub failure_threshold: u32,
    /// Cooldown before Open admits a half-open trial call.
    pub recovery_timeout: Duration,
    /// Hard timeout applied to every guarded call.
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: BreakerStatus,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
}

/// The breaker itself. Safe to share across concurrent pipeline runs.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

enum Admission {
    Normal,
    Trial,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                status: BreakerStatus::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Current status without mutating anything.
    pub async fn status(&self) -> BreakerStatus {
        self.state.lock().await.status
    }

    /// Explicit reset back to Closed. The only non-timeout path out of Open.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.status = BreakerStatus::Closed;
        state.consecutive_failures = 0;
        state.last_failure_time = None;
    }

    /// Run a guarded call under the breaker and the hard call timeout.
    pub async fn call<F, T, E>(&self, stage: Stage, fut: F) -> Result<T, GateError>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let admission = self.admit(stage).await?;

        let result = tokio::time::timeout(self.config.call_timeout, fut).await;
        match result {
            Err(_) => {
                self.record_failure(&admission).await;
                Err(GateError::GuardedCallTimeout {
                    stage,
                    timeout_ms: self.config.call_timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                self.record_failure(&admission).await;
                Err(GateError::DependencyUnavailable {
                    stage,
                    reason: e.to_string(),
                })
            }
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
        }
    }

    /// Decide whether this caller may proceed. Holds the state lock for the
    /// whole decision so only one caller can win the half-open trial slot.
    async fn admit(&self, stage: Stage) -> Result<Admission, GateError> {
        let mut state = self.state.lock().await;
        match state.status {
            BreakerStatus::Closed => Ok(Admission::Normal),
            BreakerStatus::HalfOpen => Err(GateError::DependencyUnavailable {
                stage,
                reason: "circuit breaker half-open, trial call already in flight".to_string(),
            }),
            BreakerStatus::Open => {
                let elapsed = state
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    state.status = BreakerStatus::HalfOpen;
                    debug!(stage = %stage, "circuit breaker admitting half-open trial");
                    Ok(Admission::Trial)
                } else {
                    Err(GateError::DependencyUnavailable {
                        stage,
                        reason: format!(
                            "circuit breaker open, {}ms until recovery window",
                            (self.config.recovery_timeout - elapsed).as_millis()
                        ),
                    })
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.status != BreakerStatus::Closed {
            debug!("circuit breaker closing after successful trial");
        }
        state.status = BreakerStatus::Closed;
        state.consecutive_failures = 0;
    }

    async fn record_failure(&self, admission: &Admission) {
        let mut state = self.state.lock().await;
        state.last_failure_time = Some(Instant::now());
        match admission {
            Admission::Trial => {
                state.status = BreakerStatus::Open;
                warn!("circuit breaker trial call failed, reopening");
            }
            Admission::Normal => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.status = BreakerStatus::Open;
                    warn!(
                        failures = state.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_millis(recovery_ms),
            call_timeout: Duration::from_millis(200),
        })
    }

    async fn failing_call(b: &CircuitBreaker) -> Result<(), GateError> {
        b.call(Stage::HealthCheck, async { Err::<(), _>("boom") })
            .await
    }

    async fn ok_call(b: &CircuitBreaker) -> Result<(), GateError> {
        b.call(Stage::HealthCheck, async { Ok::<(), String>(()) })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_exactly_threshold_failures() {
        let b = breaker(3, 60_000);
        for _ in 0..2 {
            failing_call(&b).await.unwrap_err();
            assert_eq!(b.status().await, BreakerStatus::Closed);
        }
        failing_call(&b).await.unwrap_err();
        assert_eq!(b.status().await, BreakerStatus::Open);
    }

    #[tokio::test]
    async fn test_open_rejects_without_calling() {
        let b = breaker(1, 60_000);
        failing_call(&b).await.unwrap_err();
        assert_eq!(b.status().await, BreakerStatus::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let result = b
            .call(Stage::HealthCheck, async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .await;
        assert!(matches!(result, Err(GateError::DependencyUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_half_open_after_recovery_then_close_on_success() {
        let b = breaker(1, 20);
        failing_call(&b).await.unwrap_err();
        assert_eq!(b.status().await, BreakerStatus::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        ok_call(&b).await.unwrap();
        assert_eq!(b.status().await, BreakerStatus::Closed);
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_trial_failure() {
        let b = breaker(1, 20);
        failing_call(&b).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(40)).await;
        failing_call(&b).await.unwrap_err();
        assert_eq!(b.status().await, BreakerStatus::Open);

        // The failed trial refreshed last_failure_time, so the very next
        // call is rejected again.
        let result = ok_call(&b).await;
        assert!(matches!(result, Err(GateError::DependencyUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_exactly_one_trial_call_per_open_period() {
        let b = Arc::new(breaker(1, 10));
        failing_call(&b).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let calls = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let b = Arc::clone(&b);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                b.call(Stage::HealthCheck, async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<(), String>(())
                })
                .await
                .is_ok()
            }));
        }

        let mut successes = 0;
        for h in handles {
            if h.await.unwrap() {
                successes += 1;
            }
        }
        // Only the winning trial ran; everyone else was rejected while
        // the trial was in flight.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let b = breaker(1, 60_000);
        let result = b
            .call(Stage::SourcingCheck, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), String>(())
            })
            .await;
        assert!(matches!(result, Err(GateError::GuardedCallTimeout { .. })));
        assert_eq!(b.status().await, BreakerStatus::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let b = breaker(3, 60_000);
        failing_call(&b).await.unwrap_err();
        failing_call(&b).await.unwrap_err();
        ok_call(&b).await.unwrap();
        failing_call(&b).await.unwrap_err();
        failing_call(&b).await.unwrap_err();
        assert_eq!(b.status().await, BreakerStatus::Closed);
    }

    #[tokio::test]
    async fn test_explicit_reset() {
        let b = breaker(1, 60_000);
        failing_call(&b).await.unwrap_err();
        assert_eq!(b.status().await, BreakerStatus::Open);
        b.reset().await;
        assert_eq!(b.status().await, BreakerStatus::Closed);
        ok_call(&b).await.unwrap();
    }
}
