//! The `Subscription` lifecycle state machine, Part 4 §5.13.1.2.
//!
//! Ported from the state table's reference implementation (the closest
//! available Rust rendition of the table row-for-row), generalized to carry
//! its own publish-request queue and republish queue rather than reaching
//! into an `AddressSpace`/`ServerDiagnostics` collaborator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use opcua_subscriptions_types::{
    MonitoredItemCreateRequest, MonitoredItemCreateResult, MonitoredItemModifyRequest,
    MonitoredItemModifyResult, MonitoringFilter, MonitoringMode, NotificationMessage,
    NotificationMessageBody, StatusCode, TimestampsToReturn,
};

use crate::config::SubscriptionLimits;
use crate::monitored_item::MonitoredItem;
use crate::queue::{PublishRequestQueue, QueuedPublishRequest, RepublishQueue};
use crate::{sub_debug, sub_trace};

/// State of a subscription, per Part 4 §5.13.1.2.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Torn down; no further ticks are processed.
    Closed,
    /// Just constructed; the next tick moves it straight to `Normal`.
    Creating,
    /// Steady state: publishing on schedule.
    Normal,
    /// Publish requests ran out while there was something to say.
    Late,
    /// Publishing is quiescent; emitting periodic keep-alives only.
    KeepAlive,
}

/// Inputs to [`Subscription::update_state`], collected by [`Subscription::tick`].
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionStateParams {
    /// At least one monitored item has a notification ready.
    pub notifications_available: bool,
    /// The last build did not drain every available notification.
    pub more_notifications: bool,
    /// A publish request is available to answer with.
    pub publishing_req_queued: bool,
    /// The publishing interval timer fired this tick.
    pub publishing_interval_elapsed: bool,
}

/// What `update_state` decided to do about the notification build `tick`
/// already performed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpdateStateAction {
    /// Nothing to send this tick.
    None,
    /// Send an empty keep-alive message.
    ReturnKeepAlive,
    /// Send the built notification message.
    ReturnNotifications,
}

/// Which row of the Part 4 §5.13.1.2 state table fired. Kept for tests and
/// debugging, mirroring the reference table's own numbering.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandledState {
    /// No row matched.
    None0,
    Closed1,
    Create3,
    Normal4,
    Normal5,
    IntervalElapsed6,
    IntervalElapsed7,
    IntervalElapsed8,
    IntervalElapsed9,
    Late10,
    Late11,
    Late12,
    KeepAlive13,
    KeepAlive14,
    KeepAlive15,
    KeepAlive16,
    KeepAlive17,
}

/// Result of a state-table evaluation.
#[derive(Debug, Copy, Clone)]
pub struct UpdateStateResult {
    /// The row that fired.
    pub handled_state: HandledState,
    /// The action to take.
    pub update_state_action: UpdateStateAction,
}

impl UpdateStateResult {
    fn new(handled_state: HandledState, update_state_action: UpdateStateAction) -> Self {
        Self {
            handled_state,
            update_state_action,
        }
    }
}

/// What provoked this tick: a fresh publish request, or the periodic timer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickReason {
    /// A `Publish` request just arrived.
    ReceivedPublishRequest,
    /// The subscription's publishing-interval timer fired.
    TickTimerFired,
}

/// Outcome of one [`Subscription::tick`] call: a message to send, matched
/// with the publish request it consumes.
pub struct TickOutcome {
    /// The request the message answers.
    pub request: QueuedPublishRequest,
    /// The message to send in that request's response.
    pub message: NotificationMessage,
}

/// A single subscription's full state: lifecycle, monitored items, publish
/// and republish queues.
pub struct Subscription {
    subscription_id: u32,
    session_id: u32,
    publishing_interval: f64,
    max_lifetime_count: u32,
    max_keep_alive_count: u32,
    max_notifications_per_publish: u32,
    priority: u8,
    monitored_items: HashMap<u32, MonitoredItem>,
    next_monitored_item_id: u32,
    state: SubscriptionState,
    current_lifetime_count: u32,
    current_keep_alive_count: u32,
    message_sent: bool,
    publishing_enabled: bool,
    next_sequence_number: u32,
    last_timer_expired_time: DateTime<Utc>,
    publish_queue: PublishRequestQueue,
    republish_queue: RepublishQueue,
    more_notifications: bool,
}

impl Subscription {
    /// Construct a new subscription in state `Creating`, per Part 4 §5.13.2.
    pub fn new(
        subscription_id: u32,
        session_id: u32,
        publishing_enabled: bool,
        publishing_interval: f64,
        lifetime_count: u32,
        keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
        limits: &SubscriptionLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            subscription_id,
            session_id,
            publishing_interval,
            max_lifetime_count: lifetime_count,
            max_keep_alive_count: keep_alive_count,
            max_notifications_per_publish,
            priority,
            monitored_items: HashMap::new(),
            next_monitored_item_id: 1,
            state: SubscriptionState::Creating,
            current_lifetime_count: lifetime_count,
            current_keep_alive_count: keep_alive_count,
            message_sent: false,
            publishing_enabled,
            next_sequence_number: 1,
            last_timer_expired_time: now,
            publish_queue: PublishRequestQueue::new(),
            republish_queue: RepublishQueue::new(limits.max_republish_notifs_per_sub),
            more_notifications: false,
        }
    }

    /// This subscription's id.
    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    /// The session that owns this subscription.
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Whether publishing is currently enabled.
    pub fn publishing_enabled(&self) -> bool {
        self.publishing_enabled
    }

    /// Change the publishing-enabled flag, per `SetPublishingMode`.
    pub fn set_publishing_enabled(&mut self, enabled: bool) {
        self.publishing_enabled = enabled;
    }

    /// Revised values as they'd be reported in a `Create`/`ModifySubscriptionResponse`.
    pub fn revised_params(&self) -> (f64, u32, u32) {
        (
            self.publishing_interval,
            self.max_lifetime_count,
            self.max_keep_alive_count,
        )
    }

    /// Apply `ModifySubscription` parameters, resetting both counters per
    /// Part 4 §5.13.3.
    pub fn modify(
        &mut self,
        publishing_interval: f64,
        lifetime_count: u32,
        keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
    ) {
        self.publishing_interval = publishing_interval;
        self.max_lifetime_count = lifetime_count;
        self.max_keep_alive_count = keep_alive_count;
        self.max_notifications_per_publish = max_notifications_per_publish;
        self.priority = priority;
        self.reset_lifetime_counter();
        self.reset_keep_alive_counter();
    }

    /// Queue a publish request, returning `Err(BadTooManyPublishRequests)`
    /// with the dropped (oldest-overflowing) request if the per-subscription
    /// cap is exceeded, per spec §4.1/scenario S4.
    pub fn enqueue_publish_request(
        &mut self,
        request: QueuedPublishRequest,
        max_publish_requests: usize,
    ) -> Option<QueuedPublishRequest> {
        self.publish_queue.append(request);
        if self.publish_queue.len() > max_publish_requests {
            self.publish_queue.pop_head()
        } else {
            None
        }
    }

    /// Drop publish requests whose deadline has passed, for the caller to
    /// complete with `BadTimeout`.
    pub fn expire_publish_requests(&mut self, now: DateTime<Utc>) -> Vec<QueuedPublishRequest> {
        self.publish_queue.drain_expired(now)
    }

    /// Tear down this subscription's queues for session close or explicit
    /// delete, returning every outstanding publish request to complete.
    pub fn close(&mut self) -> Vec<QueuedPublishRequest> {
        self.state = SubscriptionState::Closed;
        self.republish_queue.clear();
        self.publish_queue.drain_all()
    }

    /// Number of monitored items owned by this subscription.
    pub fn monitored_item_count(&self) -> usize {
        self.monitored_items.len()
    }

    /// Create monitored items, per Part 4 §5.12.2.
    pub fn create_monitored_items(
        &mut self,
        timestamps_to_return: TimestampsToReturn,
        items_to_create: &[MonitoredItemCreateRequest],
        limits: &SubscriptionLimits,
    ) -> Vec<MonitoredItemCreateResult> {
        self.reset_lifetime_counter();
        items_to_create
            .iter()
            .map(|req| {
                let id = self.next_monitored_item_id;
                let is_event = matches!(req.requested_parameters.filter, MonitoringFilter::Event(_));
                let sampling_interval = if req.requested_parameters.sampling_interval <= 0.0 {
                    self.publishing_interval
                } else {
                    req.requested_parameters.sampling_interval
                };
                let queue_size = req
                    .requested_parameters
                    .queue_size
                    .max(1)
                    .min(limits.max_notifications_per_publish);
                let item = MonitoredItem::new(
                    id,
                    self.subscription_id,
                    req.node_id.clone(),
                    req.attribute_id,
                    timestamps_to_return,
                    req.monitoring_mode,
                    req.requested_parameters.client_handle,
                    req.requested_parameters.filter.clone(),
                    sampling_interval,
                    queue_size,
                    req.requested_parameters.discard_oldest,
                    is_event,
                );
                self.monitored_items.insert(id, item);
                self.next_monitored_item_id = self.next_monitored_item_id.wrapping_add(1).max(1);
                MonitoredItemCreateResult {
                    status_code: StatusCode::Good,
                    monitored_item_id: id,
                    revised_sampling_interval: sampling_interval,
                    revised_queue_size: queue_size,
                }
            })
            .collect()
    }

    /// Modify monitored items, per Part 4 §5.12.3.
    pub fn modify_monitored_items(
        &mut self,
        timestamps_to_return: TimestampsToReturn,
        items_to_modify: &[MonitoredItemModifyRequest],
        limits: &SubscriptionLimits,
    ) -> Vec<MonitoredItemModifyResult> {
        self.reset_lifetime_counter();
        items_to_modify
            .iter()
            .map(|req| match self.monitored_items.get_mut(&req.monitored_item_id) {
                Some(item) => {
                    let sampling_interval = if req.requested_parameters.sampling_interval <= 0.0 {
                        self.publishing_interval
                    } else {
                        req.requested_parameters.sampling_interval
                    };
                    let queue_size = req
                        .requested_parameters
                        .queue_size
                        .max(1)
                        .min(limits.max_notifications_per_publish);
                    let (revised_sampling_interval, revised_queue_size) = item.modify(
                        timestamps_to_return,
                        req.requested_parameters.filter.clone(),
                        sampling_interval,
                        queue_size,
                        req.requested_parameters.discard_oldest,
                    );
                    MonitoredItemModifyResult {
                        status_code: StatusCode::Good,
                        revised_sampling_interval,
                        revised_queue_size,
                    }
                }
                None => MonitoredItemModifyResult {
                    status_code: StatusCode::BadMonitoredItemIdInvalid,
                    revised_sampling_interval: 0.0,
                    revised_queue_size: 0,
                },
            })
            .collect()
    }

    /// Delete monitored items by id, per Part 4 §5.12.4.
    pub fn delete_monitored_items(&mut self, ids: &[u32]) -> Vec<StatusCode> {
        self.reset_lifetime_counter();
        ids.iter()
            .map(|id| match self.monitored_items.remove(id) {
                Some(_) => StatusCode::Good,
                None => StatusCode::BadMonitoredItemIdInvalid,
            })
            .collect()
    }

    /// Change monitoring mode for the given items, per Part 4 §5.12.5.
    pub fn set_monitoring_mode(&mut self, mode: MonitoringMode, ids: &[u32]) -> Vec<StatusCode> {
        ids.iter()
            .map(|id| match self.monitored_items.get_mut(id) {
                Some(item) => {
                    item.set_monitoring_mode(mode);
                    StatusCode::Good
                }
                None => StatusCode::BadMonitoredItemIdInvalid,
            })
            .collect()
    }

    /// Add/remove `SetTriggering` links on a triggering item, per
    /// `SPEC_FULL.md` §F.5.
    pub fn set_triggering(
        &mut self,
        triggering_item_id: u32,
        links_to_add: &[u32],
        links_to_remove: &[u32],
    ) -> (StatusCode, Vec<StatusCode>, Vec<StatusCode>) {
        let Some(item) = self.monitored_items.get_mut(&triggering_item_id) else {
            return (StatusCode::BadMonitoredItemIdInvalid, vec![], vec![]);
        };
        let known_ids: Vec<u32> = self.monitored_items.keys().copied().collect();
        let add_results: Vec<StatusCode> = links_to_add
            .iter()
            .map(|id| {
                if known_ids.contains(id) {
                    StatusCode::Good
                } else {
                    StatusCode::BadMonitoredItemIdInvalid
                }
            })
            .collect();
        let remove_results: Vec<StatusCode> = links_to_remove
            .iter()
            .map(|id| {
                if known_ids.contains(id) {
                    StatusCode::Good
                } else {
                    StatusCode::BadMonitoredItemIdInvalid
                }
            })
            .collect();
        let valid_add: Vec<u32> = links_to_add
            .iter()
            .zip(add_results.iter())
            .filter(|(_, r)| r.is_good())
            .map(|(id, _)| *id)
            .collect();
        item.add_triggering_links(&valid_add);
        item.remove_triggering_links(links_to_remove);
        (StatusCode::Good, add_results, remove_results)
    }

    /// Look up a monitored item by target node, applying an externally
    /// pushed value update from `engine.write`. See `SPEC_FULL.md`: the
    /// address space is an external collaborator, so the engine routes
    /// `(node_id, attribute_id)` to items itself and calls this per item.
    pub fn item_mut(&mut self, id: u32) -> Option<&mut MonitoredItem> {
        self.monitored_items.get_mut(&id)
    }

    /// Iterate over this subscription's monitored item ids.
    pub fn monitored_item_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.monitored_items.keys().copied()
    }

    /// Look up a previously sent message for `Republish`, Part 4 §5.14.6.
    pub fn republish(&self, seq: u32) -> Result<NotificationMessage, StatusCode> {
        self.republish_queue
            .find(seq)
            .cloned()
            .ok_or(StatusCode::BadMessageNotAvailable)
    }

    /// Acknowledge a previously sent sequence number, removing it from the
    /// republish queue. Returns `false` if it was not found (protocol allows
    /// this to be reported per-ack in the `PublishResponse.results`).
    pub fn acknowledge(&mut self, seq: u32) -> bool {
        let found = self.republish_queue.find(seq).is_some();
        self.republish_queue.remove(seq);
        found
    }

    fn reset_keep_alive_counter(&mut self) {
        self.current_keep_alive_count = self.max_keep_alive_count;
    }

    fn reset_lifetime_counter(&mut self) {
        self.current_lifetime_count = self.max_lifetime_count;
    }

    fn start_publishing_timer(&mut self) {
        self.current_lifetime_count = self.current_lifetime_count.saturating_sub(1);
    }

    fn next_sequence_number(&mut self) -> u32 {
        let n = self.next_sequence_number;
        self.next_sequence_number = if n == u32::MAX { 1 } else { n + 1 };
        n
    }

    /// Ids of items that contribute to this tick's notification message:
    /// every item in `Reporting` mode, plus any `Sampling` item linked as a
    /// "triggered" item by a `Reporting` item that currently has something
    /// queued — `SetTriggering` forcing a triggered item to report, per
    /// `SPEC_FULL.md` §F.5.
    fn effective_reporting_ids(&self) -> std::collections::HashSet<u32> {
        let mut ids: std::collections::HashSet<u32> = self
            .monitored_items
            .values()
            .filter(|i| i.is_reporting())
            .map(|i| i.id())
            .collect();
        for item in self.monitored_items.values() {
            if !item.is_reporting() || item.queued_count() == 0 {
                continue;
            }
            for &triggered_id in item.triggered_items() {
                if let Some(target) = self.monitored_items.get(&triggered_id) {
                    if target.monitoring_mode() == MonitoringMode::Sampling {
                        ids.insert(triggered_id);
                    }
                }
            }
        }
        ids
    }

    /// Count queued data-change and event notifications across every
    /// effectively-reporting item (see [`Self::effective_reporting_ids`]),
    /// without draining anything. Used both to decide `notifications_available`
    /// ahead of [`Self::update_state`] and, once the action is known, to
    /// size the actual build.
    fn available_counts(&self) -> (usize, usize) {
        let reporting = self.effective_reporting_ids();
        let data_avail: usize = self
            .monitored_items
            .values()
            .filter(|i| reporting.contains(&i.id()) && !i.is_event_kind())
            .map(|i| i.queued_count())
            .sum();
        let event_avail: usize = self
            .monitored_items
            .values()
            .filter(|i| reporting.contains(&i.id()) && i.is_event_kind())
            .map(|i| i.queued_count())
            .sum();
        (data_avail, event_avail)
    }

    /// Whether any reporting item has something queued, per Part 4's
    /// `notifications available` predicate. Non-destructive: callers use
    /// this to decide the state-table action before committing to a drain.
    fn has_notifications_available(&self) -> bool {
        let (data_avail, event_avail) = self.available_counts();
        data_avail > 0 || event_avail > 0
    }

    /// Assemble a `NotificationMessage` from every reporting monitored
    /// item's queue, capped by `max_notifications_per_publish` and applying
    /// the data/event balancing rule of spec §4.5. Returns `None` if there
    /// is nothing to send. Also returns whether more notifications remain
    /// queued after this build (`MoreNotifications`).
    ///
    /// Destructive: drains item queues and consumes a sequence number. Only
    /// call once [`Self::update_state`] has chosen `ReturnNotifications`.
    fn build_notification_message(&mut self, now: DateTime<Utc>) -> (Option<NotificationMessage>, bool) {
        let (data_avail, event_avail) = self.available_counts();
        if data_avail == 0 && event_avail == 0 {
            return (None, false);
        }

        let cap = self.max_notifications_per_publish.max(1) as usize;
        let (mut data_budget, mut event_budget) = split_budget(data_avail, event_avail, cap);

        let reporting = self.effective_reporting_ids();
        let mut data_changes = Vec::new();
        let mut events = Vec::new();
        for item in self.monitored_items.values_mut() {
            if !reporting.contains(&item.id()) {
                continue;
            }
            if item.is_event_kind() {
                if event_budget == 0 {
                    continue;
                }
                let take = item.queued_count().min(event_budget);
                let drained = item.drain_events(take);
                event_budget -= drained.len();
                events.extend(drained);
            } else {
                if data_budget == 0 {
                    continue;
                }
                let take = item.queued_count().min(data_budget);
                let drained = item.drain_data_change(take, now);
                data_budget -= drained.len();
                data_changes.extend(drained);
            }
        }

        let mut body = Vec::new();
        if !data_changes.is_empty() {
            body.push(NotificationMessageBody::DataChange(data_changes));
        }
        if !events.is_empty() {
            body.push(NotificationMessageBody::Event(events));
        }
        if body.is_empty() {
            return (None, false);
        }

        let remaining: usize = self
            .monitored_items
            .values()
            .filter(|i| i.is_reporting())
            .map(|i| i.queued_count())
            .sum();
        let more = remaining > 0;

        let seq = self.next_sequence_number();
        let msg = NotificationMessage {
            sequence_number: seq,
            publish_time: now,
            notification_data: body,
        };
        (Some(msg), more)
    }

    /// Check for a tick and advance the state machine, per Part 4 §5.13.1.2.
    ///
    /// `publishing_req_queued` tells the state machine whether a publish
    /// request is currently available; the caller is responsible for having
    /// already popped one (or not) from [`Self::publish_queue`] before
    /// calling this — see [`crate::ServerSubscriptionEngine::tick`].
    pub fn tick(
        &mut self,
        tick_reason: TickReason,
        publishing_req_queued: bool,
        now: DateTime<Utc>,
    ) -> Option<NotificationMessage> {
        let publishing_interval_elapsed = match tick_reason {
            TickReason::ReceivedPublishRequest => false,
            TickReason::TickTimerFired => {
                if self.state == SubscriptionState::Creating {
                    true
                } else {
                    let interval = chrono::Duration::milliseconds(self.publishing_interval.max(1.0) as i64);
                    if now.signed_duration_since(self.last_timer_expired_time) >= interval {
                        self.last_timer_expired_time = now;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        let notifications_available = match self.state {
            SubscriptionState::Closed | SubscriptionState::Creating => false,
            _ => self.has_notifications_available(),
        };

        let result = if notifications_available || publishing_interval_elapsed || publishing_req_queued {
            let update = self.update_state(
                tick_reason,
                SubscriptionStateParams {
                    publishing_req_queued,
                    notifications_available,
                    more_notifications: self.more_notifications,
                    publishing_interval_elapsed,
                },
            );
            sub_trace!(self.subscription_id, "update_state -> {:?}", update);
            match update.update_state_action {
                UpdateStateAction::None => None,
                UpdateStateAction::ReturnKeepAlive => {
                    let seq = self.next_sequence_number;
                    sub_debug!(self.subscription_id, "sending keep-alive");
                    Some(NotificationMessage::keep_alive(seq, now))
                }
                UpdateStateAction::ReturnNotifications => {
                    sub_debug!(self.subscription_id, "sending notifications");
                    let (message, more) = self.build_notification_message(now);
                    self.more_notifications = more;
                    message
                }
            }
        } else {
            None
        };

        if let Some(msg) = &result {
            if !msg.is_keep_alive() {
                self.republish_queue.add(msg.clone());
            }
        }

        if self.current_lifetime_count == 1 && !publishing_req_queued {
            sub_debug!(self.subscription_id, "lifetime expired, closing");
            self.state = SubscriptionState::Closed;
        }

        result
    }

    /// Pop the next queued publish request, if any — used by the engine
    /// immediately before calling [`Self::tick`] so its `publishing_req_queued`
    /// input reflects the request this call will (or won't) consume.
    pub fn pop_publish_request(&mut self) -> Option<QueuedPublishRequest> {
        self.publish_queue.pop_head()
    }

    /// Put an unused publish request back at the head of the queue (used
    /// when the state machine decides not to consume it after all).
    pub fn return_publish_request(&mut self, request: QueuedPublishRequest) {
        self.publish_queue.prepend_head(request);
    }

    // See OPC UA Part 4 §5.13.1.2 State Table.
    fn update_state(&mut self, tick_reason: TickReason, p: SubscriptionStateParams) -> UpdateStateResult {
        assert!(
            !(tick_reason == TickReason::ReceivedPublishRequest && p.publishing_interval_elapsed),
            "timer and publish request cannot both fire in one tick"
        );

        match self.state {
            SubscriptionState::Closed => UpdateStateResult::new(HandledState::Closed1, UpdateStateAction::None),
            SubscriptionState::Creating => {
                self.state = SubscriptionState::Normal;
                self.message_sent = false;
                UpdateStateResult::new(HandledState::Create3, UpdateStateAction::None)
            }
            SubscriptionState::Normal => {
                if tick_reason == TickReason::ReceivedPublishRequest {
                    if !self.publishing_enabled || !p.more_notifications {
                        UpdateStateResult::new(HandledState::Normal4, UpdateStateAction::None)
                    } else {
                        self.reset_lifetime_counter();
                        self.message_sent = true;
                        UpdateStateResult::new(HandledState::Normal5, UpdateStateAction::ReturnNotifications)
                    }
                } else if p.publishing_interval_elapsed {
                    if p.publishing_req_queued && self.publishing_enabled && p.notifications_available {
                        self.reset_lifetime_counter();
                        self.start_publishing_timer();
                        self.message_sent = true;
                        UpdateStateResult::new(HandledState::IntervalElapsed6, UpdateStateAction::ReturnNotifications)
                    } else if p.publishing_req_queued
                        && !self.message_sent
                        && (!self.publishing_enabled || !p.notifications_available)
                    {
                        self.reset_lifetime_counter();
                        self.start_publishing_timer();
                        self.message_sent = true;
                        UpdateStateResult::new(HandledState::IntervalElapsed7, UpdateStateAction::ReturnKeepAlive)
                    } else if !p.publishing_req_queued
                        && (!self.message_sent || (self.publishing_enabled && p.notifications_available))
                    {
                        self.start_publishing_timer();
                        self.state = SubscriptionState::Late;
                        UpdateStateResult::new(HandledState::IntervalElapsed8, UpdateStateAction::None)
                    } else if self.message_sent && (!self.publishing_enabled || !p.notifications_available) {
                        self.start_publishing_timer();
                        self.reset_keep_alive_counter();
                        self.state = SubscriptionState::KeepAlive;
                        UpdateStateResult::new(HandledState::IntervalElapsed9, UpdateStateAction::None)
                    } else {
                        UpdateStateResult::new(HandledState::None0, UpdateStateAction::None)
                    }
                } else {
                    UpdateStateResult::new(HandledState::None0, UpdateStateAction::None)
                }
            }
            SubscriptionState::Late => {
                if tick_reason == TickReason::ReceivedPublishRequest {
                    if self.publishing_enabled && (p.notifications_available || p.more_notifications) {
                        self.reset_lifetime_counter();
                        self.state = SubscriptionState::Normal;
                        self.message_sent = true;
                        UpdateStateResult::new(HandledState::Late10, UpdateStateAction::ReturnNotifications)
                    } else {
                        self.reset_lifetime_counter();
                        self.state = SubscriptionState::KeepAlive;
                        self.message_sent = true;
                        UpdateStateResult::new(HandledState::Late11, UpdateStateAction::ReturnKeepAlive)
                    }
                } else if p.publishing_interval_elapsed {
                    self.start_publishing_timer();
                    UpdateStateResult::new(HandledState::Late12, UpdateStateAction::None)
                } else {
                    UpdateStateResult::new(HandledState::None0, UpdateStateAction::None)
                }
            }
            SubscriptionState::KeepAlive => {
                if tick_reason == TickReason::ReceivedPublishRequest {
                    UpdateStateResult::new(HandledState::KeepAlive13, UpdateStateAction::None)
                } else if p.publishing_interval_elapsed {
                    if self.publishing_enabled && p.notifications_available && p.publishing_req_queued {
                        self.message_sent = true;
                        self.state = SubscriptionState::Normal;
                        UpdateStateResult::new(HandledState::KeepAlive14, UpdateStateAction::ReturnNotifications)
                    } else if p.publishing_req_queued
                        && self.current_keep_alive_count == 1
                        && (!self.publishing_enabled || p.notifications_available)
                    {
                        self.start_publishing_timer();
                        self.reset_keep_alive_counter();
                        UpdateStateResult::new(HandledState::KeepAlive15, UpdateStateAction::ReturnKeepAlive)
                    } else if self.current_keep_alive_count > 1
                        && (!self.publishing_enabled || !p.notifications_available)
                    {
                        self.start_publishing_timer();
                        self.current_keep_alive_count -= 1;
                        UpdateStateResult::new(HandledState::KeepAlive16, UpdateStateAction::None)
                    } else if !p.publishing_req_queued
                        && (self.current_keep_alive_count == 1
                            || (self.current_keep_alive_count > 1
                                && self.publishing_enabled
                                && p.notifications_available))
                    {
                        self.start_publishing_timer();
                        self.state = SubscriptionState::Late;
                        UpdateStateResult::new(HandledState::KeepAlive17, UpdateStateAction::None)
                    } else {
                        UpdateStateResult::new(HandledState::None0, UpdateStateAction::None)
                    }
                } else {
                    UpdateStateResult::new(HandledState::None0, UpdateStateAction::None)
                }
            }
        }
    }
}

/// Split `cap` notifications between data and event availability, per spec
/// §4.5: when both must be truncated, the overflow relative to the smaller
/// side is halved and applied evenly, with any remaining overflow split
/// alternately between the two sides.
fn split_budget(data_avail: usize, event_avail: usize, cap: usize) -> (usize, usize) {
    let total = data_avail + event_avail;
    if total <= cap {
        return (data_avail, event_avail);
    }
    let overflow = total - cap;
    let m = data_avail.min(event_avail);
    let even_cut = (overflow.min(2 * m)) / 2;
    let mut data_take = data_avail - even_cut;
    let mut event_take = event_avail - even_cut;
    let mut remaining = overflow - even_cut * 2;
    let mut take_from_data = data_take >= event_take;
    while remaining > 0 {
        if take_from_data && data_take > 0 {
            data_take -= 1;
        } else if event_take > 0 {
            event_take -= 1;
        } else if data_take > 0 {
            data_take -= 1;
        }
        take_from_data = !take_from_data;
        remaining -= 1;
    }
    (data_take, event_take)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_subscriptions_types::{Identifier, MonitoringParameters, NodeId};

    fn make_sub(limits: &SubscriptionLimits, now: DateTime<Utc>) -> Subscription {
        Subscription::new(1, 1, true, 500.0, 9, 3, 0, 0, limits, now)
    }

    fn data_item_request(client_handle: u32, queue_size: u32) -> MonitoredItemCreateRequest {
        MonitoredItemCreateRequest {
            node_id: NodeId {
                namespace: 1,
                identifier: Identifier::Numeric(100),
            },
            attribute_id: 13,
            index_range: Default::default(),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle,
                sampling_interval: 0.0,
                filter: MonitoringFilter::None,
                queue_size,
                discard_oldest: true,
            },
        }
    }

    #[test]
    fn s1_scenario_revises_params_within_bounds() {
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let sub = Subscription::new(1, 1, true, 500.0, 9, 3, 0, 0, &limits, now);
        let (interval, lifetime, keep_alive) = sub.revised_params();
        assert_eq!(interval, 500.0);
        assert_eq!(lifetime, 9);
        assert_eq!(keep_alive, 3);
    }

    #[test]
    fn creating_state_moves_to_normal_on_first_tick() {
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let mut sub = make_sub(&limits, now);
        sub.tick(TickReason::TickTimerFired, false, now);
        assert_eq!(sub.state(), SubscriptionState::Normal);
    }

    #[test]
    fn no_publish_request_and_no_data_goes_late() {
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let mut sub = make_sub(&limits, now);
        sub.tick(TickReason::TickTimerFired, false, now); // Creating -> Normal
        let later = now + chrono::Duration::milliseconds(600);
        sub.tick(TickReason::TickTimerFired, false, later);
        assert_eq!(sub.state(), SubscriptionState::Late);
    }

    #[test]
    fn s3_scenario_delivers_overflow_marked_batch_then_keep_alive() {
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let mut sub = make_sub(&limits, now);
        sub.tick(TickReason::TickTimerFired, false, now);
        sub.create_monitored_items(TimestampsToReturn::Both, &[data_item_request(7, 4)], &limits);
        for v in 1..=6i64 {
            if let Some(item) = sub.monitored_items.values_mut().next() {
                item.on_value_change(opcua_subscriptions_types::DataValue::new_now(
                    opcua_subscriptions_types::Variant::Int64(v),
                    now,
                ));
            }
        }
        let req = QueuedPublishRequest {
            session_id: 1,
            request_handle: 1,
            context: 0,
            deadline: now + chrono::Duration::seconds(30),
        };
        sub.enqueue_publish_request(req, 20);
        sub.pop_publish_request();
        let later = now + chrono::Duration::milliseconds(600);
        let msg = sub.tick(TickReason::TickTimerFired, true, later).expect("message");
        assert_eq!(msg.notification_count(), 4);
    }

    #[test]
    fn s3_scenario_no_publish_request_keeps_notifications_queued() {
        // Writes land with nothing queued to answer them: the table picks
        // Normal8 (None), and the queued notifications must survive for the
        // later Late->Normal send rather than being drained and discarded.
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let mut sub = Subscription::new(1, 1, true, 500.0, 9, 3, 20, 0, &limits, now);
        sub.tick(TickReason::TickTimerFired, false, now);
        sub.create_monitored_items(TimestampsToReturn::Both, &[data_item_request(7, 4)], &limits);
        for v in 1..=6i64 {
            if let Some(item) = sub.monitored_items.values_mut().next() {
                item.on_value_change(opcua_subscriptions_types::DataValue::new_now(
                    opcua_subscriptions_types::Variant::Int64(v),
                    now,
                ));
            }
        }
        let before = sub.monitored_items.values().next().unwrap().queued_count();
        assert_eq!(before, 4);

        let later = now + chrono::Duration::milliseconds(600);
        let msg = sub.tick(TickReason::TickTimerFired, false, later);
        assert!(msg.is_none());
        assert_eq!(sub.state(), SubscriptionState::Late);
        let after = sub.monitored_items.values().next().unwrap().queued_count();
        assert_eq!(after, before, "notifications must stay queued, not be drained and dropped");

        let req = QueuedPublishRequest {
            session_id: 1,
            request_handle: 1,
            context: 0,
            deadline: now + chrono::Duration::seconds(30),
        };
        sub.enqueue_publish_request(req, 20);
        sub.pop_publish_request();
        let latest = later + chrono::Duration::milliseconds(600);
        let msg = sub.tick(TickReason::ReceivedPublishRequest, true, latest).expect("message");
        assert_eq!(msg.notification_count(), 4);
        assert_eq!(sub.state(), SubscriptionState::Normal);
    }

    #[test]
    fn set_triggering_forces_sampling_item_to_report() {
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let mut sub = Subscription::new(1, 1, true, 500.0, 9, 3, 20, 0, &limits, now);
        sub.tick(TickReason::TickTimerFired, false, now);
        let results = sub.create_monitored_items(
            TimestampsToReturn::Both,
            &[data_item_request(1, 10), data_item_request(2, 10)],
            &limits,
        );
        let triggering_id = results[0].monitored_item_id;
        let triggered_id = results[1].monitored_item_id;
        sub.item_mut(triggered_id)
            .unwrap()
            .set_monitoring_mode(MonitoringMode::Sampling);
        let (status, add_results, _) = sub.set_triggering(triggering_id, &[triggered_id], &[]);
        assert_eq!(status, StatusCode::Good);
        assert_eq!(add_results, vec![StatusCode::Good]);

        sub.item_mut(triggering_id).unwrap().on_value_change(
            opcua_subscriptions_types::DataValue::new_now(opcua_subscriptions_types::Variant::Int64(1), now),
        );
        sub.item_mut(triggered_id).unwrap().on_value_change(
            opcua_subscriptions_types::DataValue::new_now(opcua_subscriptions_types::Variant::Int64(2), now),
        );
        assert_eq!(sub.item_mut(triggered_id).unwrap().queued_count(), 1, "Sampling still accumulates");

        let req = QueuedPublishRequest {
            session_id: 1,
            request_handle: 1,
            context: 0,
            deadline: now + chrono::Duration::seconds(30),
        };
        sub.enqueue_publish_request(req, 20);
        sub.pop_publish_request();
        let later = now + chrono::Duration::milliseconds(600);
        let msg = sub.tick(TickReason::TickTimerFired, true, later).expect("message");
        assert_eq!(msg.notification_count(), 2, "the triggered Sampling item's value must ride along");
    }

    #[test]
    fn republish_of_acked_sequence_is_unavailable() {
        let limits = SubscriptionLimits::default();
        let now = Utc::now();
        let mut sub = make_sub(&limits, now);
        sub.republish_queue.add(NotificationMessage::keep_alive(1, now));
        assert!(sub.republish(1).is_ok());
        sub.acknowledge(1);
        assert_eq!(sub.republish(1), Err(StatusCode::BadMessageNotAvailable));
    }

    #[test]
    fn split_budget_caps_total_and_balances() {
        assert_eq!(split_budget(3, 2, 10), (3, 2));
        assert_eq!(split_budget(10, 10, 10), (5, 5));
        let (data, event) = split_budget(8, 2, 6);
        assert_eq!(data + event, 6);
        assert!(event <= 2);
    }
}
