use crate::error::{HarnessError, Result};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default deadline for a wait primitive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default delay between predicate evaluations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One evaluation of a wait predicate.
#[derive(Debug)]
pub enum Poll<T> {
    /// The condition holds; stop and hand the witness to the caller.
    Satisfied(T),
    /// Not there yet; carries a snapshot of what was observed so a
    /// later timeout can report the final state.
    NotYet(String),
    /// The environment is broken; stop immediately, no further polls.
    Fatal(HarnessError),
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Evaluates `poll` until it is satisfied, a deadline measured in
/// wall-clock time expires, or the predicate reports a fatal error.
///
/// A predicate satisfied on its first evaluation returns without ever
/// sleeping. On timeout the error carries the elapsed time and the
/// snapshot from the most recent evaluation, so the resulting test
/// failure is diagnosable without re-running.
pub fn wait_until<T, F>(what: &str, opts: WaitOptions, mut poll: F) -> Result<T>
where
    F: FnMut() -> Poll<T>,
{
    let started = Instant::now();
    let mut last_seen = String::from("(nothing observed)");

    loop {
        match poll() {
            Poll::Satisfied(value) => {
                debug!("{what}: satisfied after {:?}", started.elapsed());
                return Ok(value);
            }
            Poll::Fatal(err) => return Err(err),
            Poll::NotYet(seen) => {
                debug!("{what}: not yet ({seen})");
                last_seen = seen;
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= opts.timeout {
            return Err(HarnessError::WaitTimeout {
                what: what.to_string(),
                elapsed,
                last_seen,
            });
        }
        thread::sleep(opts.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_opts() -> WaitOptions {
        WaitOptions::with_timeout(Duration::from_millis(100))
            .poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_satisfied_on_first_poll_returns_without_sleeping() {
        let started = Instant::now();
        let value = wait_until("instant", fast_opts(), || Poll::Satisfied(7)).unwrap();
        assert_eq!(value, 7);
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn test_timeout_is_bounded_and_carries_last_snapshot() {
        let started = Instant::now();
        let err = wait_until::<(), _>("never", fast_opts(), || {
            Poll::NotYet("still two of three".to_string())
        })
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        // One poll interval of slack past the deadline, plus scheduling noise.
        assert!(elapsed < Duration::from_millis(100 + 20 + 80));

        match err {
            HarnessError::WaitTimeout {
                what, last_seen, ..
            } => {
                assert_eq!(what, "never");
                assert_eq!(last_seen, "still two of three");
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_fatal_on_nth_poll_stops_at_exactly_n_evaluations() {
        let mut evaluations = 0;
        let err = wait_until::<(), _>("fatal", fast_opts(), || {
            evaluations += 1;
            if evaluations == 3 {
                Poll::Fatal(HarnessError::parse("probe", "boom"))
            } else {
                Poll::NotYet("waiting".to_string())
            }
        })
        .unwrap_err();

        assert_eq!(evaluations, 3);
        assert!(matches!(err, HarnessError::Parse { .. }));
    }

    #[test]
    fn test_satisfied_after_retries_returns_witness() {
        let mut evaluations = 0;
        let value = wait_until("third time", fast_opts(), || {
            evaluations += 1;
            if evaluations == 3 {
                Poll::Satisfied("done")
            } else {
                Poll::NotYet(format!("evaluation {evaluations}"))
            }
        })
        .unwrap();

        assert_eq!(evaluations, 3);
        assert_eq!(value, "done");
    }
}
