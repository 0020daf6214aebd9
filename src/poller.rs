//! Bounded sleep-and-recheck polling.
//!
//! One primitive serves every wait in a provisioning run: probe
//! immediately, sleep a fixed interval between attempts, give up after
//! the attempt ceiling. No backoff.

use std::thread;
use std::time::Duration;

/// Outcome of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe succeeded on the recorded attempt
    Success { attempts: usize },
    /// All attempts were exhausted without a success
    TimedOut { attempts: usize },
}

/// Retry `probe` until it reports success or `max_attempts` are exhausted.
///
/// The probe runs immediately; the interval is slept only between
/// attempts, so a poll of N attempts sleeps N-1 times.
pub fn poll_bounded(
    max_attempts: usize,
    interval: Duration,
    mut probe: impl FnMut() -> bool,
) -> PollOutcome {
    let mut attempts = 0;
    while attempts < max_attempts {
        attempts += 1;
        if probe() {
            return PollOutcome::Success { attempts };
        }
        if attempts < max_attempts {
            thread::sleep(interval);
        }
    }
    PollOutcome::TimedOut { attempts }
}

/// Retry `probe` at a fixed interval until it succeeds.
///
/// Deliberately without an attempt ceiling: the power-off wait is the
/// one stage that blocks indefinitely, unlike every other wait in the
/// run. Returns the attempt count that succeeded.
pub fn poll_unbounded(interval: Duration, mut probe: impl FnMut() -> bool) -> usize {
    let mut attempts = 0;
    loop {
        attempts += 1;
        if probe() {
            return attempts;
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_always_failing_probe_exhausts_exactly_n_attempts() {
        let mut calls = 0;
        let outcome = poll_bounded(4, Duration::from_millis(10), || {
            calls += 1;
            false
        });

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 4 });
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_exhaustion_sleeps_between_attempts_only() {
        // N attempts, N-1 sleeps: elapsed ≈ (N-1) * interval
        let start = Instant::now();
        let outcome = poll_bounded(3, Duration::from_millis(40), || false);
        let elapsed = start.elapsed();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
        assert!(elapsed >= Duration::from_millis(80));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn test_succeeds_on_kth_attempt() {
        for k in 1..=5 {
            let mut calls = 0;
            let outcome = poll_bounded(5, Duration::from_millis(1), || {
                calls += 1;
                calls == k
            });

            assert_eq!(outcome, PollOutcome::Success { attempts: k });
            assert_eq!(calls, k);
        }
    }

    #[test]
    fn test_first_attempt_success_never_sleeps() {
        let start = Instant::now();
        let outcome = poll_bounded(5, Duration::from_secs(60), || true);

        assert_eq!(outcome, PollOutcome::Success { attempts: 1 });
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unbounded_returns_on_success() {
        let mut calls = 0;
        let attempts = poll_unbounded(Duration::from_millis(1), || {
            calls += 1;
            calls == 3
        });
        assert_eq!(attempts, 3);
    }
}
