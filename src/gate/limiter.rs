use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};

use super::clock::{Clock, TokioClock};

/// What a full window does to the next caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Suspend the caller until a slot frees up.
    #[default]
    Block,
    /// Refuse immediately with [`RelayError::RateLimited`].
    Reject,
}

/// Window policy: at most `max_calls` admissions in any trailing `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    max_calls: u32,
    period: Duration,
}

impl GatePolicy {
    /// Build a policy. Fails with `RelayError::Config` on zero calls or a zero period.
    pub fn new(max_calls: u32, period: Duration) -> Result<Self> {
        if max_calls == 0 {
            return Err(RelayError::Config(
                "rate limit max_calls must be greater than zero".into(),
            ));
        }
        if period.is_zero() {
            return Err(RelayError::Config(
                "rate limit period must be greater than zero".into(),
            ));
        }
        Ok(Self { max_calls, period })
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Sliding-window admission gate. Per-key call tracking.
///
/// Each key (one per remote resource) owns an ordered sequence of admission
/// instants. Check-and-append happens under a single mutex; the lock is
/// never held across an await.
pub struct RateGate {
    policy: GatePolicy,
    mode: GateMode,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .finish()
    }
}

impl RateGate {
    /// Gate on the tokio clock in blocking mode.
    pub fn new(policy: GatePolicy) -> Self {
        Self::with_clock(policy, Arc::new(TokioClock))
    }

    pub fn with_clock(policy: GatePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            mode: GateMode::Block,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_mode(mut self, mode: GateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        // Nothing in the critical section can leave the map half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One atomic admission attempt for `key`.
    ///
    /// On success a call record is written. On failure nothing is written and
    /// the error carries how long until the oldest record leaves the window.
    pub fn try_admit(&self, key: &str) -> std::result::Result<(), Duration> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();

        let timestamps = entries.entry(key.to_string()).or_default();

        prune(timestamps, now, self.policy.period);

        if timestamps.len() < self.policy.max_calls as usize {
            timestamps.push_back(now);
            return Ok(());
        }

        let oldest = timestamps.front().copied().unwrap_or(now);
        let wait = self
            .policy
            .period
            .saturating_sub(now.saturating_duration_since(oldest));
        Err(wait)
    }

    /// Wait (or, in reject mode, fail) until `key` has a free slot, then record the call.
    ///
    /// The loop re-checks after every sleep because other callers may take
    /// or free capacity meanwhile. Dropping the future while it sleeps leaves
    /// no record behind.
    pub async fn admit(&self, key: &str) -> Result<()> {
        loop {
            let wait = match self.try_admit(key) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            if self.mode == GateMode::Reject {
                warn!(
                    key = key,
                    retry_after_ms = wait.as_millis() as u64,
                    "Gate window full, rejecting call"
                );
                return Err(RelayError::RateLimited { retry_after: wait });
            }

            debug!(
                key = key,
                wait_ms = wait.as_millis() as u64,
                "Gate window full, waiting for admission"
            );
            self.clock.sleep(wait).await;
        }
    }

    /// Run `operation` once `key` admits it.
    ///
    /// The operation's own failure is returned untouched and never retried;
    /// only the admission decision is.
    pub async fn guard<F, Fut, T, E>(&self, key: &str, operation: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<RelayError>,
    {
        self.admit(key).await?;
        operation().await
    }

    /// Number of calls currently inside the window for `key`.
    pub fn in_window(&self, key: &str) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(timestamps) => {
                prune(timestamps, now, self.policy.period);
                timestamps.len()
            }
            None => 0,
        }
    }

    /// Remove keys with no active timestamps (call periodically).
    pub fn sweep(&self) {
        let now = self.clock.now();
        let period = self.policy.period;
        let mut entries = self.lock_entries();

        entries.retain(|_, timestamps| {
            prune(timestamps, now, period);
            !timestamps.is_empty()
        });
    }

    /// Number of tracked keys.
    pub fn key_count(&self) -> usize {
        self.lock_entries().len()
    }
}

/// Drop records that have aged a full period or more.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while timestamps
        .front()
        .is_some_and(|&t| now.saturating_duration_since(t) >= period)
    {
        timestamps.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::gate::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, task};

    fn policy(max_calls: u32, secs: u64) -> GatePolicy {
        GatePolicy::new(max_calls, Duration::from_secs(secs)).unwrap()
    }

    fn manual_gate(max_calls: u32, secs: u64) -> (RateGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::with_clock(policy(max_calls, secs), clock.clone());
        (gate, clock)
    }

    #[test]
    fn test_zero_calls_fails_fast() {
        let err = GatePolicy::new(0, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_zero_period_fails_fast() {
        let err = GatePolicy::new(3, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_allows_up_to_limit() {
        let (gate, _clock) = manual_gate(3, 60);
        assert!(gate.try_admit("scrape").is_ok());
        assert!(gate.try_admit("scrape").is_ok());
        assert!(gate.try_admit("scrape").is_ok());
        assert!(gate.try_admit("scrape").is_err()); // 4th should be denied
    }

    #[test]
    fn test_denied_attempt_reports_wait_and_writes_nothing() {
        let (gate, clock) = manual_gate(2, 60);
        assert!(gate.try_admit("k").is_ok());
        clock.advance(Duration::from_secs(10));
        assert!(gate.try_admit("k").is_ok());
        clock.advance(Duration::from_secs(5));

        // Oldest record is 15s old, so 45s until it leaves the window
        assert_eq!(gate.try_admit("k"), Err(Duration::from_secs(45)));
        assert_eq!(gate.in_window("k"), 2);
    }

    #[test]
    fn test_different_keys_independent() {
        let (gate, _clock) = manual_gate(1, 60);
        assert!(gate.try_admit("scrape").is_ok());
        assert!(gate.try_admit("completion").is_ok()); // different key, separate window
        assert!(gate.try_admit("scrape").is_err()); // same key, over limit
    }

    #[test]
    fn test_expired_entries_freed() {
        let (gate, clock) = manual_gate(1, 5);
        assert!(gate.try_admit("k").is_ok());
        clock.advance(Duration::from_millis(4_999));
        assert!(gate.try_admit("k").is_err()); // still within window
        clock.advance(Duration::from_millis(1));
        assert!(gate.try_admit("k").is_ok()); // window slid past the oldest call
    }

    #[test]
    fn test_sweep_clears_stale_keys() {
        let (gate, clock) = manual_gate(1, 1);
        assert!(gate.try_admit("a").is_ok());
        assert!(gate.try_admit("b").is_ok());
        clock.advance(Duration::from_secs(2));
        assert!(gate.try_admit("b").is_ok());
        gate.sweep();
        assert_eq!(gate.key_count(), 1);
        assert_eq!(gate.in_window("a"), 0);
    }

    #[test]
    fn test_window_never_exceeds_limit() {
        let (gate, clock) = manual_gate(3, 10);
        let mut admitted: Vec<Duration> = Vec::new();

        // Irregular arrival pattern, some bursts, some gaps
        let steps = [0u64, 1, 0, 0, 2, 3, 0, 4, 7, 0, 0, 0, 1, 9, 0, 2, 0, 0, 5, 11];
        for step in steps {
            clock.advance(Duration::from_secs(step));
            if gate.try_admit("k").is_ok() {
                admitted.push(clock.elapsed());
            }
        }

        assert!(admitted.len() > 3);
        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| **t - *start < Duration::from_secs(10))
                .count();
            assert!(in_window <= 3, "window starting at {:?} held {}", start, in_window);
        }
    }

    #[tokio::test]
    async fn test_fourth_call_admitted_exactly_when_window_slides() {
        let (gate, clock) = manual_gate(3, 60);
        for _ in 0..3 {
            gate.admit("scrape").await.unwrap();
        }
        assert_eq!(clock.elapsed(), Duration::ZERO);

        let value = gate
            .guard("scrape", || async { Ok::<_, RelayError>(clock.elapsed()) })
            .await
            .unwrap();

        // Not before t=60, and not later either
        assert_eq!(value, Duration::from_secs(60));
        assert_eq!(gate.in_window("scrape"), 1);
    }

    #[tokio::test]
    async fn test_waiter_rechecks_after_sleep() {
        let (gate, clock) = manual_gate(2, 60);
        gate.admit("k").await.unwrap();
        clock.advance(Duration::from_secs(30));
        gate.admit("k").await.unwrap();

        // First slot frees at t=60, the second at t=90
        gate.admit("k").await.unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
        gate.admit("k").await.unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_operation_error_propagates_without_retry() {
        let (gate, _clock) = manual_gate(5, 60);
        let calls = AtomicUsize::new(0);

        let result: Result<()> = gate
            .guard("completion", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RelayError::from(ProviderError::ServerError(
                    "upstream exploded".into(),
                )))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Provider(ProviderError::ServerError(ref msg)) if msg == "upstream exploded"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The failed call still consumed its admission
        assert_eq!(gate.in_window("completion"), 1);
    }

    #[tokio::test]
    async fn test_reject_mode_refuses_without_record() {
        let gate = RateGate::with_clock(policy(1, 60), Arc::new(ManualClock::new()))
            .with_mode(GateMode::Reject);
        gate.admit("crawl").await.unwrap();

        let called = AtomicUsize::new(0);
        let result: Result<()> = gate
            .guard("crawl", || async {
                called.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(RelayError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(60))
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(gate.in_window("crawl"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_leaves_no_record() {
        let gate = RateGate::new(policy(1, 60));
        gate.admit("k").await.unwrap();

        let mut waiter = task::spawn(gate.admit("k"));
        assert_pending!(waiter.poll());
        drop(waiter);

        assert_eq!(gate.in_window("k"), 1);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(gate.in_window("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_admission_wait() {
        let gate = RateGate::new(policy(1, 60));
        gate.admit("k").await.unwrap();

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), gate.guard("k", || async {
                Ok::<_, RelayError>(())
            }))
            .await;

        assert!(outcome.is_err());
        assert_eq!(gate.in_window("k"), 1);
    }
}
