//! The client's local mirror of its subscriptions and monitored items, and
//! the publish-token target derived from it. Grounded on the teacher's
//! `SubscriptionState`/`PublishLimits` (`async-opcua-client/src/session/
//! services/subscriptions/state.rs`, referenced from `session/mod.rs` as
//! `subscription_state: Mutex<SubscriptionState>` and `publish_limits_watch_*`).

use std::collections::HashMap;
use std::time::Duration;

use opcua_subscriptions_types::{NodeId, NotificationMessage, NotificationMessageBody, Variant};

/// Callback surface an application registers when creating a subscription.
/// Named after the teacher's `OnSubscriptionNotification`.
pub trait OnSubscriptionNotification: Send {
    /// A batch of data-change notifications arrived, keyed by client handle.
    fn on_data_change(&mut self, items: &[(u32, opcua_subscriptions_types::DataValue)]);
    /// A batch of event notifications arrived, keyed by client handle.
    fn on_event(&mut self, items: &[(u32, Vec<Variant>)]);
}

/// One monitored item as the client knows it: just enough to resolve
/// incoming notifications back to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMonitoredItem {
    /// Server-assigned monitored item id.
    pub id: u32,
    /// Client handle echoed in every notification for this item.
    pub client_handle: u32,
    /// The node this item targets.
    pub node_id: NodeId,
}

/// The client's local record of one subscription: its revised parameters
/// and the callback notifications are delivered to.
pub struct ClientSubscription {
    subscription_id: u32,
    publishing_interval: Duration,
    lifetime_count: u32,
    keep_alive_count: u32,
    callback: Box<dyn OnSubscriptionNotification>,
    monitored_items: HashMap<u32, ClientMonitoredItem>,
}

impl ClientSubscription {
    /// Construct a client-side record for a subscription the server just
    /// confirmed.
    pub fn new(
        subscription_id: u32,
        publishing_interval: Duration,
        lifetime_count: u32,
        keep_alive_count: u32,
        callback: Box<dyn OnSubscriptionNotification>,
    ) -> Self {
        Self {
            subscription_id,
            publishing_interval,
            lifetime_count,
            keep_alive_count,
            callback,
            monitored_items: HashMap::new(),
        }
    }

    /// This subscription's server-assigned id.
    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    /// Apply revised parameters from a successful `ModifySubscription`.
    pub fn apply_revision(&mut self, publishing_interval: Duration, lifetime_count: u32, keep_alive_count: u32) {
        self.publishing_interval = publishing_interval;
        self.lifetime_count = lifetime_count;
        self.keep_alive_count = keep_alive_count;
    }

    /// Record newly created monitored items.
    pub fn insert_monitored_items(&mut self, items: Vec<ClientMonitoredItem>) {
        for item in items {
            self.monitored_items.insert(item.id, item);
        }
    }

    /// Remove monitored items by id, e.g. after `DeleteMonitoredItems`.
    pub fn remove_monitored_items(&mut self, ids: &[u32]) {
        for id in ids {
            self.monitored_items.remove(id);
        }
    }

    /// Dispatch one `NotificationMessage`'s contents to this subscription's
    /// callback.
    pub fn dispatch(&mut self, message: &NotificationMessage) {
        for body in &message.notification_data {
            match body {
                NotificationMessageBody::DataChange(items) => {
                    let mapped: Vec<_> = items.iter().map(|n| (n.client_handle, n.value.clone())).collect();
                    self.callback.on_data_change(&mapped);
                }
                NotificationMessageBody::Event(lists) => {
                    let mapped: Vec<_> = lists.iter().map(|l| (l.client_handle, l.event_fields.clone())).collect();
                    self.callback.on_event(&mapped);
                }
            }
        }
    }
}

/// Derives the publish-token pool's target size from the set of active
/// subscriptions, per `spec.md` §4.7. One token per subscription, floored at
/// one whenever at least one subscription exists, matches the common
/// "always keep a spare Publish outstanding" policy without needing
/// round-trip latency measurements this crate has no transport to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishLimits {
    max_tokens: u32,
}

impl PublishLimits {
    /// Construct limits capping the token pool at `max_tokens`.
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    /// The token-pool target for `subscription_count` active subscriptions.
    pub fn target_for(&self, subscription_count: usize) -> u32 {
        if subscription_count == 0 {
            0
        } else {
            (subscription_count as u32).min(self.max_tokens)
        }
    }
}

/// The client's subscription cache: every subscription this connection has
/// created, keyed by server-assigned id.
pub struct SubscriptionState {
    subscriptions: HashMap<u32, ClientSubscription>,
    min_publish_interval: Duration,
    limits: PublishLimits,
}

impl SubscriptionState {
    /// Construct an empty cache.
    pub fn new(min_publish_interval: Duration, limits: PublishLimits) -> Self {
        Self {
            subscriptions: HashMap::new(),
            min_publish_interval,
            limits,
        }
    }

    /// The configured floor on the publish cadence.
    pub fn min_publish_interval(&self) -> Duration {
        self.min_publish_interval
    }

    /// Record a newly created subscription.
    pub fn add_subscription(&mut self, subscription: ClientSubscription) {
        self.subscriptions.insert(subscription.subscription_id(), subscription);
    }

    /// Apply a successful `ModifySubscription`'s revised parameters.
    pub fn modify_subscription(&mut self, id: u32, publishing_interval: Duration, lifetime_count: u32, keep_alive_count: u32) -> bool {
        let Some(sub) = self.subscriptions.get_mut(&id) else {
            return false;
        };
        sub.apply_revision(publishing_interval, lifetime_count, keep_alive_count);
        true
    }

    /// True if `id` names a subscription this cache knows about.
    pub fn subscription_exists(&self, id: u32) -> bool {
        self.subscriptions.contains_key(&id)
    }

    /// Record monitored items just created on `subscription_id`.
    pub fn insert_monitored_items(&mut self, subscription_id: u32, items: Vec<ClientMonitoredItem>) -> bool {
        let Some(sub) = self.subscriptions.get_mut(&subscription_id) else {
            return false;
        };
        sub.insert_monitored_items(items);
        true
    }

    /// Remove a subscription entirely, e.g. after `DeleteSubscriptions`.
    pub fn remove_subscription(&mut self, id: u32) -> Option<ClientSubscription> {
        self.subscriptions.remove(&id)
    }

    /// Remove specific monitored items from `subscription_id`'s cache, e.g.
    /// after `DeleteMonitoredItems`. No-op if the subscription is unknown.
    pub fn remove_monitored_items(&mut self, subscription_id: u32, ids: &[u32]) -> bool {
        let Some(sub) = self.subscriptions.get_mut(&subscription_id) else {
            return false;
        };
        sub.remove_monitored_items(ids);
        true
    }

    /// Number of subscriptions currently tracked, used to size the
    /// publish-token pool.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// The publish-token target for the current subscription count.
    pub fn publish_token_target(&self) -> u32 {
        self.limits.target_for(self.subscription_count())
    }

    /// Deliver a `PublishResponse`'s notification message to the owning
    /// subscription's callback. No-op if the subscription is unknown (it may
    /// have been deleted concurrently with an in-flight Publish).
    pub fn dispatch_notification(&mut self, subscription_id: u32, message: &NotificationMessage) {
        if let Some(sub) = self.subscriptions.get_mut(&subscription_id) {
            sub.dispatch(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_subscriptions_types::{DataValue, Identifier};

    struct Recorder {
        data_changes: usize,
    }

    impl OnSubscriptionNotification for Recorder {
        fn on_data_change(&mut self, items: &[(u32, DataValue)]) {
            self.data_changes += items.len();
        }
        fn on_event(&mut self, _items: &[(u32, Vec<Variant>)]) {}
    }

    fn node(n: u32) -> NodeId {
        NodeId {
            namespace: 1,
            identifier: Identifier::Numeric(n),
        }
    }

    #[test]
    fn publish_token_target_tracks_subscription_count() {
        let mut state = SubscriptionState::new(Duration::from_millis(100), PublishLimits::new(2));
        assert_eq!(state.publish_token_target(), 0);
        state.add_subscription(ClientSubscription::new(
            1,
            Duration::from_millis(500),
            60,
            20,
            Box::new(Recorder { data_changes: 0 }),
        ));
        assert_eq!(state.publish_token_target(), 1);
        state.add_subscription(ClientSubscription::new(
            2,
            Duration::from_millis(500),
            60,
            20,
            Box::new(Recorder { data_changes: 0 }),
        ));
        assert_eq!(state.publish_token_target(), 2);
        state.add_subscription(ClientSubscription::new(
            3,
            Duration::from_millis(500),
            60,
            20,
            Box::new(Recorder { data_changes: 0 }),
        ));
        assert_eq!(state.publish_token_target(), 2, "capped at max_tokens");
    }

    #[test]
    fn dispatch_routes_to_owning_subscription_only() {
        let mut state = SubscriptionState::new(Duration::from_millis(100), PublishLimits::new(4));
        state.add_subscription(ClientSubscription::new(
            1,
            Duration::from_millis(500),
            60,
            20,
            Box::new(Recorder { data_changes: 0 }),
        ));
        state.insert_monitored_items(
            1,
            vec![ClientMonitoredItem {
                id: 10,
                client_handle: 77,
                node_id: node(42),
            }],
        );
        let message = NotificationMessage {
            sequence_number: 1,
            publish_time: chrono::Utc::now(),
            notification_data: vec![NotificationMessageBody::DataChange(vec![
                opcua_subscriptions_types::MonitoredItemNotification {
                    client_handle: 77,
                    value: DataValue::new_now(Variant::Int64(9), chrono::Utc::now()),
                },
            ])],
        };
        state.dispatch_notification(1, &message);
        state.dispatch_notification(999, &message);
        assert!(state.subscription_exists(1));
    }
}
