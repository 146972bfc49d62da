//! Client-side timing and retry configuration. PKI, endpoint selection and
//! security-policy negotiation belong to the transport layer and are out of
//! scope here (`spec.md` §1's security Non-goal); this is the subset of the
//! teacher's `ClientConfig` that actually governs the subscription state
//! machine.

use std::time::Duration;

use crate::retry::SessionRetryPolicy;

/// Timing and retry limits for one client connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientLimits {
    /// Timeout applied to ordinary (non-Publish) requests.
    pub request_timeout: Duration,
    /// Timeout applied to Publish requests specifically; usually generous
    /// since they are expected to sit outstanding for a while.
    pub publish_timeout: Duration,
    /// Floor under which consecutive publish requests are not issued, so
    /// that multiple subscriptions on one connection publish together.
    pub min_publish_interval: Duration,
    /// Maximum number of times to attempt to reconnect before giving up.
    /// `None` retries forever.
    pub session_retry_limit: Option<u32>,
    /// Initial delay for the reconnect exponential backoff.
    pub session_retry_initial: Duration,
    /// Maximum delay between reconnect attempts.
    pub session_retry_max: Duration,
    /// Maximum number of in-flight Publish requests the client will keep
    /// open for one session (`nTokenTarget`'s ceiling, spec §4.7).
    pub max_publish_tokens: u32,
}

impl ClientLimits {
    /// The configured reconnect backoff policy.
    pub fn session_retry_policy(&self) -> SessionRetryPolicy {
        SessionRetryPolicy::new(
            self.session_retry_max,
            self.session_retry_limit,
            self.session_retry_initial,
        )
    }
}

impl Default for ClientLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            publish_timeout: Duration::from_secs(60),
            min_publish_interval: Duration::from_millis(100),
            session_retry_limit: Some(SessionRetryPolicy::DEFAULT_RETRY_LIMIT),
            session_retry_initial: Duration::from_secs(1),
            session_retry_max: Duration::from_secs(30),
            max_publish_tokens: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_internally_consistent() {
        let limits = ClientLimits::default();
        assert!(limits.session_retry_initial <= limits.session_retry_max);
        assert!(limits.max_publish_tokens >= 1);
    }
}
