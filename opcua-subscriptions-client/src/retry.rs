//! Reconnect backoff policy. Not present in the retrieval pack as a
//! standalone file; authored from its call sites in the teacher's
//! `session/event_loop.rs` (`retry.new_backoff()`, `backoff.next()`) and
//! `session/config.rs` (`SessionRetryPolicy::new(max, limit, initial)`).

use std::time::Duration;

/// Governs how many times, and how far apart, a session will attempt to
/// reconnect after losing its connection.
#[derive(Debug, Clone)]
pub struct SessionRetryPolicy {
    max_delay: Duration,
    retry_limit: Option<u32>,
    initial_delay: Duration,
}

impl SessionRetryPolicy {
    /// Default number of reconnect attempts when the caller does not specify
    /// a limit of their own.
    pub const DEFAULT_RETRY_LIMIT: u32 = 10;

    /// Construct a policy. `retry_limit` of `None` retries forever.
    pub fn new(max_delay: Duration, retry_limit: Option<u32>, initial_delay: Duration) -> Self {
        Self {
            max_delay,
            retry_limit,
            initial_delay,
        }
    }

    /// Start a fresh backoff sequence, e.g. at the start of a new reconnect
    /// attempt loop.
    pub fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.max_delay, self.retry_limit, self.initial_delay)
    }
}

impl Default for SessionRetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(30),
            Some(Self::DEFAULT_RETRY_LIMIT),
            Duration::from_secs(1),
        )
    }
}

/// An exponential backoff sequence: each call to [`next`](Self::next) doubles
/// the delay, capped at `max_delay`, until `retry_limit` attempts have been
/// handed out (if set), at which point it returns `None`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max_delay: Duration,
    remaining: Option<u32>,
}

impl ExponentialBackoff {
    /// Construct a new backoff sequence starting at `initial_delay`.
    pub fn new(max_delay: Duration, retry_limit: Option<u32>, initial_delay: Duration) -> Self {
        Self {
            current: initial_delay,
            max_delay,
            remaining: retry_limit,
        }
    }

    /// Return the next delay, advancing the sequence, or `None` if the
    /// retry limit has been exhausted.
    pub fn next(&mut self) -> Option<Duration> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let delay = self.current;
        self.current = (self.current * 2).min(self.max_delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(8), None, Duration::from_secs(1));
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(8)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(8)));
    }

    #[test]
    fn exhausts_after_retry_limit() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(8), Some(2), Duration::from_secs(1));
        assert!(backoff.next().is_some());
        assert!(backoff.next().is_some());
        assert_eq!(backoff.next(), None);
    }
}
