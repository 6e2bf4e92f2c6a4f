/// Brute-force protection
///
/// Counts failed attempts per source key (client address for logins,
/// username for invite-token misuse) inside a sliding window and locks
/// the key out once the window fills up.
///
/// State lives in memory for the lifetime of the process and is never
/// persisted: a restart clears every counter and lockout.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::clock::Clock;

/// Failures within the window that trigger a lockout
pub const MAX_FAILED_ATTEMPTS: usize = 5;
/// Sliding window length in minutes
pub const ATTEMPT_WINDOW_MINUTES: i64 = 15;
/// Lockout length in minutes
pub const LOCKOUT_MINUTES: i64 = 30;

/// Above this many tracked keys, stale entries are swept on the next failure
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Blocked { retry_after_secs: u64 },
}

impl GuardDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GuardDecision::Blocked { .. })
    }
}

#[derive(Default)]
struct GuardState {
    attempts: HashMap<String, VecDeque<DateTime<Utc>>>,
    lockouts: HashMap<String, DateTime<Utc>>,
    /// Attempts admitted by `begin` that have not settled yet
    in_flight: HashMap<String, usize>,
}

impl GuardState {
    fn active_lockout(&self, key: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lockouts
            .get(key)
            .copied()
            .filter(|expires_at| now < *expires_at)
    }

    fn failures_in_window(&self, key: &str, now: DateTime<Utc>) -> usize {
        self.attempts
            .get(key)
            .map(|attempts| {
                attempts
                    .iter()
                    .filter(|at| now - **at < BruteForceGuard::window())
                    .count()
            })
            .unwrap_or(0)
    }
}

/// An admitted attempt for one key.
///
/// While a permit is alive it counts against the key's budget, so no more
/// than `MAX_FAILED_ATTEMPTS` attempts can be undecided at once. Settle it
/// with `fail` or `succeed`; dropping it unsettled just releases the slot.
pub struct AttemptPermit<'a> {
    guard: &'a BruteForceGuard,
    key: String,
}

impl AttemptPermit<'_> {
    /// Whether the key was locked out while this attempt was in flight
    pub fn recheck(&self) -> GuardDecision {
        let now = self.guard.clock.now();
        let state = self.guard.state.lock();
        match state.active_lockout(&self.key, now) {
            Some(expires_at) => GuardDecision::Blocked {
                retry_after_secs: seconds_until(now, expires_at),
            },
            None => GuardDecision::Allowed,
        }
    }

    /// Records the attempt as a failure. See `BruteForceGuard::record_failure`.
    pub fn fail(self) -> GuardDecision {
        self.guard.record_failure(&self.key)
    }

    /// Settles the attempt as a success and clears the failure history,
    /// unless the key was locked out in the meantime. A `Blocked` result
    /// means the success must not be honored.
    pub fn succeed(self) -> GuardDecision {
        let now = self.guard.clock.now();
        let mut state = self.guard.state.lock();
        if let Some(expires_at) = state.active_lockout(&self.key, now) {
            tracing::warn!(
                scope = self.guard.scope,
                key = %self.key,
                "Attempt succeeded after lockout, refusing"
            );
            return GuardDecision::Blocked {
                retry_after_secs: seconds_until(now, expires_at),
            };
        }
        state.attempts.remove(&self.key);
        GuardDecision::Allowed
    }
}

impl Drop for AttemptPermit<'_> {
    fn drop(&mut self) {
        let mut state = self.guard.state.lock();
        if let Some(count) = state.in_flight.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.in_flight.remove(&self.key);
            }
        }
    }
}

/// Per-key failed attempt tracker with timed lockout
pub struct BruteForceGuard {
    /// Label used in log lines ("login", "invite")
    scope: &'static str,
    clock: Arc<dyn Clock>,
    state: Mutex<GuardState>,
}

impl BruteForceGuard {
    pub fn new(scope: &'static str, clock: Arc<dyn Clock>) -> Self {
        Self {
            scope,
            clock,
            state: Mutex::new(GuardState::default()),
        }
    }

    fn window() -> Duration {
        Duration::minutes(ATTEMPT_WINDOW_MINUTES)
    }

    fn lockout() -> Duration {
        Duration::minutes(LOCKOUT_MINUTES)
    }

    /// Reports whether `key` is currently locked out.
    ///
    /// An expired lockout is cleared here and the key is allowed again.
    pub fn check(&self, key: &str) -> GuardDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.lockouts.get(key).copied() {
            Some(expires_at) if now < expires_at => GuardDecision::Blocked {
                retry_after_secs: seconds_until(now, expires_at),
            },
            Some(_) => {
                state.lockouts.remove(key);
                tracing::info!(scope = self.scope, key = %key, "Lockout expired");
                GuardDecision::Allowed
            }
            None => GuardDecision::Allowed,
        }
    }

    /// Admits one attempt for `key`, or returns the retry delay in seconds.
    ///
    /// Refused while the key is locked out, and while recorded failures
    /// plus undecided attempts already fill the budget, so parallel
    /// requests cannot exceed `MAX_FAILED_ATTEMPTS` guesses per window.
    pub fn begin(&self, key: &str) -> Result<AttemptPermit<'_>, u64> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.lockouts.get(key).copied() {
            Some(expires_at) if now < expires_at => {
                return Err(seconds_until(now, expires_at));
            }
            Some(_) => {
                state.lockouts.remove(key);
                tracing::info!(scope = self.scope, key = %key, "Lockout expired");
            }
            None => {}
        }

        let pending = state.in_flight.get(key).copied().unwrap_or(0);
        if state.failures_in_window(key, now) + pending >= MAX_FAILED_ATTEMPTS {
            tracing::warn!(
                scope = self.scope,
                key = %key,
                pending = pending,
                "Attempt budget exhausted by concurrent attempts"
            );
            return Err(1);
        }

        *state.in_flight.entry(key.to_string()).or_insert(0) += 1;
        Ok(AttemptPermit {
            guard: self,
            key: key.to_string(),
        })
    }

    /// Records a failed attempt for `key`.
    ///
    /// Returns `Blocked` when this failure puts the key into lockout.
    pub fn record_failure(&self, key: &str) -> GuardDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.attempts.len() > SWEEP_THRESHOLD {
            sweep(&mut state, now);
        }

        let attempts = state.attempts.entry(key.to_string()).or_default();
        while attempts
            .front()
            .is_some_and(|first| now - *first >= Self::window())
        {
            attempts.pop_front();
        }
        attempts.push_back(now);
        let count = attempts.len();

        tracing::warn!(
            scope = self.scope,
            key = %key,
            failures = count,
            "Failed attempt recorded"
        );

        if count >= MAX_FAILED_ATTEMPTS {
            // Never shorten a lockout set by a concurrent failure
            let lockout = state
                .lockouts
                .entry(key.to_string())
                .or_insert(now + Self::lockout());
            *lockout = (*lockout).max(now + Self::lockout());
            let expires_at = *lockout;

            tracing::warn!(
                scope = self.scope,
                key = %key,
                failures = count,
                lockout_minutes = LOCKOUT_MINUTES,
                "Too many failed attempts, key locked out"
            );

            return GuardDecision::Blocked {
                retry_after_secs: seconds_until(now, expires_at),
            };
        }

        GuardDecision::Allowed
    }

    /// Clears the failure history for `key`. An active lockout stays in
    /// place until it expires.
    pub fn record_success(&self, key: &str) {
        self.state.lock().attempts.remove(key);
    }

    /// Failures currently inside the window for `key`
    pub fn failure_count(&self, key: &str) -> usize {
        let now = self.clock.now();
        self.state.lock().failures_in_window(key, now)
    }
}

fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}

fn sweep(state: &mut GuardState, now: DateTime<Utc>) {
    let window = BruteForceGuard::window();
    state.attempts.retain(|_, attempts| {
        attempts.back().is_some_and(|last| now - *last < window)
    });
    state.lockouts.retain(|_, expires_at| now < *expires_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn guard() -> (BruteForceGuard, ManualClock) {
        let clock = ManualClock::default();
        (BruteForceGuard::new("test", Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_fresh_key_is_allowed() {
        let (guard, _) = guard();
        assert_eq!(guard.check("10.0.0.1"), GuardDecision::Allowed);
        assert_eq!(guard.failure_count("10.0.0.1"), 0);
    }

    #[test]
    fn test_fifth_failure_locks_out() {
        let (guard, _) = guard();
        for _ in 0..4 {
            assert_eq!(guard.record_failure("10.0.0.1"), GuardDecision::Allowed);
        }
        assert!(guard.record_failure("10.0.0.1").is_blocked());
        assert_eq!(
            guard.check("10.0.0.1"),
            GuardDecision::Blocked { retry_after_secs: 30 * 60 }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let (guard, _) = guard();
        for _ in 0..5 {
            guard.record_failure("10.0.0.1");
        }
        assert!(guard.check("10.0.0.1").is_blocked());
        assert_eq!(guard.check("10.0.0.2"), GuardDecision::Allowed);
    }

    #[test]
    fn test_old_failures_fall_out_of_window() {
        let (guard, clock) = guard();
        for _ in 0..4 {
            guard.record_failure("10.0.0.1");
        }
        clock.advance(Duration::minutes(15));

        assert_eq!(guard.record_failure("10.0.0.1"), GuardDecision::Allowed);
        assert_eq!(guard.failure_count("10.0.0.1"), 1);
        assert_eq!(guard.check("10.0.0.1"), GuardDecision::Allowed);
    }

    #[test]
    fn test_lockout_expires_after_thirty_minutes() {
        let (guard, clock) = guard();
        for _ in 0..5 {
            guard.record_failure("10.0.0.1");
        }

        clock.advance(Duration::minutes(29));
        assert_eq!(
            guard.check("10.0.0.1"),
            GuardDecision::Blocked { retry_after_secs: 60 }
        );

        clock.advance(Duration::minutes(1));
        assert_eq!(guard.check("10.0.0.1"), GuardDecision::Allowed);
    }

    #[test]
    fn test_success_clears_history_but_not_lockout() {
        let (guard, _) = guard();
        for _ in 0..5 {
            guard.record_failure("10.0.0.1");
        }
        guard.record_success("10.0.0.1");

        assert_eq!(guard.failure_count("10.0.0.1"), 0);
        assert!(guard.check("10.0.0.1").is_blocked());
    }

    #[test]
    fn test_success_resets_count_before_lockout() {
        let (guard, _) = guard();
        for _ in 0..4 {
            guard.record_failure("10.0.0.1");
        }
        guard.record_success("10.0.0.1");

        assert_eq!(guard.record_failure("10.0.0.1"), GuardDecision::Allowed);
        assert_eq!(guard.failure_count("10.0.0.1"), 1);
    }

    #[test]
    fn test_concurrent_failures_are_all_counted() {
        let (guard, _) = guard();
        let guard = Arc::new(guard);
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || {
                    guard.record_failure("10.0.0.9");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(guard.check("10.0.0.9").is_blocked());
    }

    #[test]
    fn test_begin_refused_during_lockout() {
        let (guard, _) = guard();
        for _ in 0..5 {
            guard.record_failure("10.0.0.1");
        }
        assert_eq!(guard.begin("10.0.0.1").err(), Some(30 * 60));
    }

    #[test]
    fn test_parallel_attempts_capped_by_budget() {
        let (guard, _) = guard();
        guard.record_failure("10.0.0.1");
        guard.record_failure("10.0.0.1");

        let permits: Vec<_> = (0..3).map(|_| guard.begin("10.0.0.1").unwrap()).collect();
        assert!(guard.begin("10.0.0.1").is_err());
        assert!(guard.begin("10.0.0.2").is_ok());

        drop(permits);
        assert!(guard.begin("10.0.0.1").is_ok());
    }

    #[test]
    fn test_success_refused_when_locked_mid_flight() {
        let (guard, _) = guard();
        let in_flight = guard.begin("10.0.0.1").unwrap();
        assert_eq!(in_flight.recheck(), GuardDecision::Allowed);

        for _ in 0..4 {
            guard.begin("10.0.0.1").unwrap().fail();
        }
        // Budget is full: four failures plus the attempt still in flight
        assert!(guard.begin("10.0.0.1").is_err());
        guard.record_failure("10.0.0.1");

        assert!(in_flight.recheck().is_blocked());
        assert!(in_flight.succeed().is_blocked());
        assert!(guard.check("10.0.0.1").is_blocked());
    }

    #[test]
    fn test_succeed_clears_history() {
        let (guard, _) = guard();
        guard.begin("10.0.0.1").unwrap().fail();
        guard.begin("10.0.0.1").unwrap().fail();

        assert_eq!(guard.begin("10.0.0.1").unwrap().succeed(), GuardDecision::Allowed);
        assert_eq!(guard.failure_count("10.0.0.1"), 0);
    }

    #[test]
    fn test_later_failure_never_shortens_lockout() {
        let (guard, clock) = guard();
        let start = clock.now();
        for _ in 0..5 {
            guard.record_failure("10.0.0.1");
        }

        // A failure stamped earlier (a racing request) would compute an
        // earlier expiry; the existing one wins
        clock.set(start - Duration::minutes(10));
        guard.record_failure("10.0.0.1");

        assert_eq!(
            guard.check("10.0.0.1"),
            GuardDecision::Blocked { retry_after_secs: 40 * 60 }
        );
    }
}
