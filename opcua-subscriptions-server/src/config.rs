//! Server-side limits table, Part 4 §5.13 clamps and the queue/ring capacity
//! constants. Programmatically constructed only; no file format or CLI
//! loading, per the top-level Non-goals.

/// Clamp and capacity limits enforced by [`crate::ServerSubscriptionEngine`],
/// following the `SubscriptionLimits`-shaped config structs the teacher
/// carries on `ServerConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionLimits {
    /// Smallest publishing interval the server will revise a request down to, in milliseconds.
    pub min_subscription_interval_ms: f64,
    /// Largest publishing interval the server will revise a request up to, in milliseconds.
    pub max_subscription_interval_ms: f64,
    /// Smallest `maxKeepAliveCount` the server will accept.
    pub min_keep_alive_count: u32,
    /// Largest `maxKeepAliveCount` the server will accept.
    pub max_keep_alive_count: u32,
    /// Smallest `lifetimeCount` the server will accept.
    pub min_lifetime_count: u32,
    /// Largest `lifetimeCount` the server will accept.
    pub max_lifetime_count: u32,
    /// Cap on notifications placed in a single `NotificationMessage`.
    pub max_notifications_per_publish: u32,
    /// Capacity of a subscription's publish-request queue.
    pub max_publish_requests_per_sub: usize,
    /// Capacity of a subscription's republish queue.
    pub max_republish_notifs_per_sub: usize,
    /// Size of an alarm condition's recallable `EventId` ring.
    pub max_event_ids_recorded: usize,
    /// Cap on subscriptions the server will host at once.
    pub max_subscriptions: usize,
}

impl Default for SubscriptionLimits {
    fn default() -> Self {
        Self {
            min_subscription_interval_ms: 50.0,
            max_subscription_interval_ms: 24.0 * 60.0 * 60.0 * 1000.0,
            min_keep_alive_count: 1,
            max_keep_alive_count: 10_000,
            min_lifetime_count: 3,
            max_lifetime_count: 10_000,
            max_notifications_per_publish: 1_000,
            max_publish_requests_per_sub: 20,
            max_republish_notifs_per_sub: 100,
            max_event_ids_recorded: 100,
            max_subscriptions: 1_000,
        }
    }
}

impl SubscriptionLimits {
    /// Clamp a requested publishing interval, per Part 4 §5.13.2.2.
    pub fn clamp_interval(&self, requested: f64) -> f64 {
        requested.clamp(self.min_subscription_interval_ms, self.max_subscription_interval_ms)
    }

    /// Clamp a requested keep-alive count.
    pub fn clamp_keep_alive(&self, requested: u32) -> u32 {
        requested.clamp(self.min_keep_alive_count, self.max_keep_alive_count)
    }

    /// Clamp a requested lifetime count, enforcing invariant 7:
    /// `revisedLifetimeCount >= 3 * revisedMaxKeepAliveCount`, per spec §8.
    pub fn clamp_lifetime(&self, requested: u32, revised_keep_alive: u32) -> u32 {
        let floor = self.min_lifetime_count.max(3 * revised_keep_alive);
        requested.clamp(floor, self.max_lifetime_count)
    }

    /// Clamp a requested `maxNotificationsPerPublish`; 0 means "no limit"
    /// on the wire but is revised to the server's own cap.
    pub fn clamp_max_notifications(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.max_notifications_per_publish
        } else {
            requested.min(self.max_notifications_per_publish)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_floor_respects_keep_alive_multiple() {
        let limits = SubscriptionLimits::default();
        assert_eq!(limits.clamp_lifetime(1, 1), 3);
        assert_eq!(limits.clamp_lifetime(1, 5), 15);
    }

    #[test]
    fn zero_max_notifications_means_server_default() {
        let limits = SubscriptionLimits::default();
        assert_eq!(limits.clamp_max_notifications(0), limits.max_notifications_per_publish);
    }

    #[test]
    fn s2_scenario_clamps_low_request() {
        let limits = SubscriptionLimits::default();
        let interval = limits.clamp_interval(10.0);
        let keep_alive = limits.clamp_keep_alive(1);
        let lifetime = limits.clamp_lifetime(1, keep_alive);
        assert!(interval >= limits.min_subscription_interval_ms);
        assert_eq!(keep_alive, limits.min_keep_alive_count);
        assert_eq!(lifetime, limits.min_lifetime_count.max(3 * keep_alive));
    }
}
