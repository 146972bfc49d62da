//! `ServerSubscriptionEngine`, hosting every subscription a server is
//! currently serving. Field-named `SubscriptionCache` internally, following
//! the teacher's `async-opcua-server` naming for this component
//! (`RequestContext::subscriptions: Arc<SubscriptionCache>`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use opcua_subscriptions_core::sync::RwLock;
use opcua_subscriptions_types::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DataValue, DeleteMonitoredItemsRequest,
    DeleteMonitoredItemsResponse, DeleteSubscriptionsRequest, DeleteSubscriptionsResponse,
    ModifyMonitoredItemsRequest, ModifyMonitoredItemsResponse, ModifySubscriptionRequest,
    ModifySubscriptionResponse, MonitoringMode, NodeId, NotificationMessage,
    QualifiedName, RepublishRequest, RepublishResponse, ResponseHeader,
    SetMonitoringModeRequest, SetMonitoringModeResponse, SetPublishingModeRequest,
    SetPublishingModeResponse, SetTriggeringRequest, SetTriggeringResponse, StatusCode,
    SubscriptionAcknowledgement, TransferSubscriptionsRequest, TransferSubscriptionsResponse,
    Variant,
};

use crate::alarm::AlarmConditionInstance;
use crate::config::SubscriptionLimits;
use crate::queue::QueuedPublishRequest;
use crate::subscription::{Subscription, TickReason};

/// One notification ready to be handed to the transport after a tick, keyed
/// by the publish request it answers.
pub struct EngineEvent {
    /// Session the response must be sent on.
    pub session_id: u32,
    /// Original request's context, echoed back to the transport.
    pub context: u64,
    /// Subscription id the message belongs to.
    pub subscription_id: u32,
    /// The notification message (or keep-alive) to send.
    pub message: NotificationMessage,
    /// Sequence numbers still retained for republish after this send.
    pub available_sequence_numbers: Vec<u32>,
    /// Whether the subscription has more notifications ready immediately.
    pub more_notifications: bool,
    /// Per-ack result for the acknowledgements carried on the request.
    pub ack_results: Vec<StatusCode>,
}

/// Hosts every subscription known to the server, dispatching the 11
/// Subscription/MonitoredItem services plus the `Write`/`Event` fan-out and
/// periodic `Tick`, per spec §4.6.
pub struct SubscriptionCache {
    subscriptions: RwLock<HashMap<u32, Subscription>>,
    node_index: RwLock<HashMap<(NodeId, u32), Vec<(u32, u32)>>>,
    next_subscription_id: std::sync::atomic::AtomicU32,
    limits: SubscriptionLimits,
}

/// Public alias, matching `SPEC_FULL.md` §A's naming note.
pub type ServerSubscriptionEngine = SubscriptionCache;

impl SubscriptionCache {
    /// Construct an empty engine with the given limits.
    pub fn new(limits: SubscriptionLimits) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            node_index: RwLock::new(HashMap::new()),
            next_subscription_id: std::sync::atomic::AtomicU32::new(1),
            limits,
        }
    }

    fn allocate_subscription_id(&self) -> u32 {
        use std::sync::atomic::Ordering;
        loop {
            let current = self.next_subscription_id.load(Ordering::Relaxed);
            let next = if current == u32::MAX { 1 } else { current + 1 };
            if self
                .next_subscription_id
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current;
            }
        }
    }

    /// Number of subscriptions currently hosted.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Handle `CreateSubscription`, Part 4 §5.13.2.
    pub fn create_subscription(
        &self,
        session_id: u32,
        req: &CreateSubscriptionRequest,
        now: DateTime<Utc>,
    ) -> CreateSubscriptionResponse {
        let mut subs = self.subscriptions.write();
        if subs.len() >= self.limits.max_subscriptions {
            return CreateSubscriptionResponse {
                response_header: ResponseHeader::new(
                    req.request_header.request_handle,
                    StatusCode::BadTooManySubscriptions,
                    now,
                ),
                subscription_id: 0,
                revised_publishing_interval: 0.0,
                revised_lifetime_count: 0,
                revised_max_keep_alive_count: 0,
            };
        }

        let revised_interval = self.limits.clamp_interval(req.requested_publishing_interval);
        let revised_keep_alive = self.limits.clamp_keep_alive(req.requested_max_keep_alive_count);
        let revised_lifetime = self
            .limits
            .clamp_lifetime(req.requested_lifetime_count, revised_keep_alive);
        let max_notifications = self.limits.clamp_max_notifications(req.max_notifications_per_publish);

        let id = self.allocate_subscription_id();
        let mut sub = Subscription::new(
            id,
            session_id,
            req.publishing_enabled,
            revised_interval,
            revised_lifetime,
            revised_keep_alive,
            max_notifications,
            req.priority,
            &self.limits,
            now,
        );
        sub.tick(TickReason::TickTimerFired, false, now); // Creating -> Normal, per state table row #3
        subs.insert(id, sub);

        CreateSubscriptionResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            subscription_id: id,
            revised_publishing_interval: revised_interval,
            revised_lifetime_count: revised_lifetime,
            revised_max_keep_alive_count: revised_keep_alive,
        }
    }

    /// Handle `ModifySubscription`, Part 4 §5.13.3.
    pub fn modify_subscription(
        &self,
        req: &ModifySubscriptionRequest,
        now: DateTime<Utc>,
    ) -> ModifySubscriptionResponse {
        let mut subs = self.subscriptions.write();
        let Some(sub) = subs.get_mut(&req.subscription_id) else {
            return ModifySubscriptionResponse {
                response_header: ResponseHeader::new(
                    req.request_header.request_handle,
                    StatusCode::BadSubscriptionIdInvalid,
                    now,
                ),
                revised_publishing_interval: 0.0,
                revised_lifetime_count: 0,
                revised_max_keep_alive_count: 0,
            };
        };
        let revised_interval = self.limits.clamp_interval(req.requested_publishing_interval);
        let revised_keep_alive = self.limits.clamp_keep_alive(req.requested_max_keep_alive_count);
        let revised_lifetime = self
            .limits
            .clamp_lifetime(req.requested_lifetime_count, revised_keep_alive);
        let max_notifications = self.limits.clamp_max_notifications(req.max_notifications_per_publish);
        sub.modify(revised_interval, revised_lifetime, revised_keep_alive, max_notifications, req.priority);

        ModifySubscriptionResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            revised_publishing_interval: revised_interval,
            revised_lifetime_count: revised_lifetime,
            revised_max_keep_alive_count: revised_keep_alive,
        }
    }

    /// Handle `SetPublishingMode`, Part 4 §5.13.4.
    pub fn set_publishing_mode(
        &self,
        req: &SetPublishingModeRequest,
        now: DateTime<Utc>,
    ) -> SetPublishingModeResponse {
        let mut subs = self.subscriptions.write();
        let results = req
            .subscription_ids
            .iter()
            .map(|id| match subs.get_mut(id) {
                Some(sub) => {
                    sub.set_publishing_enabled(req.publishing_enabled);
                    StatusCode::Good
                }
                None => StatusCode::BadSubscriptionIdInvalid,
            })
            .collect();
        SetPublishingModeResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            results,
        }
    }

    /// Handle `DeleteSubscriptions`, Part 4 §5.13.5, draining each
    /// subscription's publish requests with `BadNoSubscription`.
    pub fn delete_subscriptions(
        &self,
        req: &DeleteSubscriptionsRequest,
        now: DateTime<Utc>,
    ) -> (DeleteSubscriptionsResponse, Vec<EngineEvent>) {
        let mut subs = self.subscriptions.write();
        let mut completions = Vec::new();
        let results = req
            .subscription_ids
            .iter()
            .map(|id| match subs.remove(id) {
                Some(mut sub) => {
                    for request in sub.close() {
                        completions.push(EngineEvent {
                            session_id: request.session_id,
                            context: request.context,
                            subscription_id: *id,
                            message: NotificationMessage::keep_alive(0, now),
                            available_sequence_numbers: vec![],
                            more_notifications: false,
                            ack_results: vec![StatusCode::BadNoSubscription],
                        });
                    }
                    self.remove_from_node_index(*id);
                    StatusCode::Good
                }
                None => StatusCode::BadSubscriptionIdInvalid,
            })
            .collect();
        (
            DeleteSubscriptionsResponse {
                response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
                results,
            },
            completions,
        )
    }

    fn remove_from_node_index(&self, subscription_id: u32) {
        let mut index = self.node_index.write();
        for entries in index.values_mut() {
            entries.retain(|(sub_id, _)| *sub_id != subscription_id);
        }
        index.retain(|_, v| !v.is_empty());
    }

    /// Handle `CreateMonitoredItems`, Part 4 §5.12.2, updating the node
    /// index for the engine's `Write`/`Event` fan-out.
    pub fn create_monitored_items(
        &self,
        req: &CreateMonitoredItemsRequest,
        now: DateTime<Utc>,
    ) -> CreateMonitoredItemsResponse {
        let mut subs = self.subscriptions.write();
        let Some(sub) = subs.get_mut(&req.subscription_id) else {
            return CreateMonitoredItemsResponse {
                response_header: ResponseHeader::new(
                    req.request_header.request_handle,
                    StatusCode::BadSubscriptionIdInvalid,
                    now,
                ),
                results: req
                    .items_to_create
                    .iter()
                    .map(|_| opcua_subscriptions_types::MonitoredItemCreateResult {
                        status_code: StatusCode::BadSubscriptionIdInvalid,
                        monitored_item_id: 0,
                        revised_sampling_interval: 0.0,
                        revised_queue_size: 0,
                    })
                    .collect(),
            };
        };
        let results = sub.create_monitored_items(req.timestamps_to_return, &req.items_to_create, &self.limits);

        let mut index = self.node_index.write();
        for (item_req, result) in req.items_to_create.iter().zip(results.iter()) {
            if result.status_code.is_good() {
                index
                    .entry((item_req.node_id.clone(), item_req.attribute_id))
                    .or_default()
                    .push((req.subscription_id, result.monitored_item_id));
            }
        }

        CreateMonitoredItemsResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            results,
        }
    }

    /// Handle `ModifyMonitoredItems`, Part 4 §5.12.3.
    pub fn modify_monitored_items(
        &self,
        req: &ModifyMonitoredItemsRequest,
        now: DateTime<Utc>,
    ) -> ModifyMonitoredItemsResponse {
        let mut subs = self.subscriptions.write();
        let results = match subs.get_mut(&req.subscription_id) {
            Some(sub) => sub.modify_monitored_items(req.timestamps_to_return, &req.items_to_modify, &self.limits),
            None => req
                .items_to_modify
                .iter()
                .map(|_| opcua_subscriptions_types::MonitoredItemModifyResult {
                    status_code: StatusCode::BadSubscriptionIdInvalid,
                    revised_sampling_interval: 0.0,
                    revised_queue_size: 0,
                })
                .collect(),
        };
        ModifyMonitoredItemsResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            results,
        }
    }

    /// Handle `DeleteMonitoredItems`, Part 4 §5.12.4, clearing the deleted
    /// ids from the node index.
    pub fn delete_monitored_items(
        &self,
        req: &DeleteMonitoredItemsRequest,
        now: DateTime<Utc>,
    ) -> DeleteMonitoredItemsResponse {
        let mut subs = self.subscriptions.write();
        let results = match subs.get_mut(&req.subscription_id) {
            Some(sub) => sub.delete_monitored_items(&req.monitored_item_ids),
            None => req
                .monitored_item_ids
                .iter()
                .map(|_| StatusCode::BadSubscriptionIdInvalid)
                .collect(),
        };
        let mut index = self.node_index.write();
        for entries in index.values_mut() {
            entries.retain(|(sub_id, item_id)| {
                !(*sub_id == req.subscription_id && req.monitored_item_ids.contains(item_id))
            });
        }
        index.retain(|_, v| !v.is_empty());
        DeleteMonitoredItemsResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            results,
        }
    }

    /// Handle `SetMonitoringMode`, Part 4 §5.12.5.
    pub fn set_monitoring_mode(
        &self,
        req: &SetMonitoringModeRequest,
        now: DateTime<Utc>,
    ) -> SetMonitoringModeResponse {
        let mut subs = self.subscriptions.write();
        let results = match subs.get_mut(&req.subscription_id) {
            Some(sub) => sub.set_monitoring_mode(req.monitoring_mode, &req.monitored_item_ids),
            None => req
                .monitored_item_ids
                .iter()
                .map(|_| StatusCode::BadSubscriptionIdInvalid)
                .collect(),
        };
        SetMonitoringModeResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::Good, now),
            results,
        }
    }

    /// Handle `SetTriggering`, `SPEC_FULL.md` §F.5.
    pub fn set_triggering(&self, req: &SetTriggeringRequest, now: DateTime<Utc>) -> SetTriggeringResponse {
        let mut subs = self.subscriptions.write();
        let (status, add_results, remove_results) = match subs.get_mut(&req.subscription_id) {
            Some(sub) => sub.set_triggering(req.triggering_item_id, &req.links_to_add, &req.links_to_remove),
            None => (StatusCode::BadSubscriptionIdInvalid, vec![], vec![]),
        };
        SetTriggeringResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, status, now),
            add_results,
            remove_results,
        }
    }

    /// Handle `TransferSubscriptions`. Unimplemented per `spec.md` §1/§6 Non-goal.
    pub fn transfer_subscriptions(
        &self,
        req: &TransferSubscriptionsRequest,
        now: DateTime<Utc>,
    ) -> TransferSubscriptionsResponse {
        TransferSubscriptionsResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, StatusCode::BadNotImplemented, now),
            results: req
                .subscription_ids
                .iter()
                .map(|_| opcua_subscriptions_types::TransferResult {
                    status_code: StatusCode::BadNotImplemented,
                    available_sequence_numbers: vec![],
                })
                .collect(),
        }
    }

    /// Queue intake for `Publish`, Part 4 §5.14.5. Synchronous acknowledgement
    /// only — the matched response (if any) arrives through [`Self::tick`].
    /// The second return value, if present, is the request dropped by queue
    /// overflow (§7), to be completed with `BadTooManyPublishRequests`.
    pub fn on_publish_intake(
        &self,
        session_id: u32,
        subscription_id: u32,
        request_handle: u32,
        context: u64,
        deadline: DateTime<Utc>,
        acks: &[SubscriptionAcknowledgement],
        now: DateTime<Utc>,
    ) -> (Vec<StatusCode>, Option<EngineEvent>) {
        let mut subs = self.subscriptions.write();
        let ack_results: Vec<StatusCode> = acks
            .iter()
            .map(|ack| match subs.get_mut(&ack.subscription_id) {
                Some(sub) => {
                    if sub.acknowledge(ack.sequence_number) {
                        StatusCode::Good
                    } else {
                        StatusCode::BadMessageNotAvailable
                    }
                }
                None => StatusCode::BadSubscriptionIdInvalid,
            })
            .collect();
        let mut dropped_completion = None;
        if let Some(sub) = subs.get_mut(&subscription_id) {
            let dropped = sub.enqueue_publish_request(
                QueuedPublishRequest {
                    session_id,
                    request_handle,
                    context,
                    deadline,
                },
                self.limits.max_publish_requests_per_sub,
            );
            if let Some(dropped) = dropped {
                log::warn!("sub:{} publish request queue overflowed, dropping oldest", subscription_id);
                dropped_completion = Some(EngineEvent {
                    session_id: dropped.session_id,
                    context: dropped.context,
                    subscription_id,
                    message: NotificationMessage::keep_alive(0, now),
                    available_sequence_numbers: vec![],
                    more_notifications: false,
                    ack_results: vec![StatusCode::BadTooManyPublishRequests],
                });
            }
        }
        (ack_results, dropped_completion)
    }

    /// Handle `Republish`, Part 4 §5.14.6.
    pub fn republish(&self, req: &RepublishRequest, now: DateTime<Utc>) -> RepublishResponse {
        let subs = self.subscriptions.read();
        let (status, message) = match subs.get(&req.subscription_id) {
            Some(sub) => match sub.republish(req.retransmit_sequence_number) {
                Ok(msg) => (StatusCode::Good, msg),
                Err(status) => (status, NotificationMessage::keep_alive(0, now)),
            },
            None => (StatusCode::BadSubscriptionIdInvalid, NotificationMessage::keep_alive(0, now)),
        };
        RepublishResponse {
            response_header: ResponseHeader::new(req.request_header.request_handle, status, now),
            notification_message: message,
        }
    }

    /// Route an externally observed value change to every monitored item
    /// targeting `(node_id, attribute_id)`, per spec §4.6 `Write` fan-out.
    pub fn write(&self, node_id: &NodeId, attribute_id: u32, value: DataValue) {
        let targets = {
            let index = self.node_index.read();
            index.get(&(node_id.clone(), attribute_id)).cloned().unwrap_or_default()
        };
        if targets.is_empty() {
            return;
        }
        let mut subs = self.subscriptions.write();
        for (sub_id, item_id) in targets {
            if let Some(sub) = subs.get_mut(&sub_id) {
                if let Some(item) = sub.item_mut(item_id) {
                    item.on_value_change(value.clone());
                }
            }
        }
    }

    /// Route an externally emitted event to every monitored item targeting
    /// `notifier_node_id`, per spec §4.6 `Event` fan-out.
    pub fn event(&self, notifier_node_id: &NodeId, fields: &[(QualifiedName, Variant)]) {
        let targets = {
            let index = self.node_index.read();
            index.get(&(notifier_node_id.clone(), 0)).cloned().unwrap_or_default()
        };
        let mut subs = self.subscriptions.write();
        for (sub_id, item_id) in targets {
            if let Some(sub) = subs.get_mut(&sub_id) {
                if let Some(item) = sub.item_mut(item_id) {
                    item.on_event(fields);
                }
            }
        }
    }

    /// Register a monitored item as a notifier target for event fan-out
    /// (event items are keyed under attribute id 0, the `EventNotifier` slot).
    pub fn register_event_notifier(&self, notifier_node_id: NodeId, subscription_id: u32, item_id: u32) {
        self.node_index
            .write()
            .entry((notifier_node_id, 0))
            .or_default()
            .push((subscription_id, item_id));
    }

    /// Tear down every subscription belonging to a closed session, per spec
    /// §4.6 `SessionClosed`.
    pub fn on_session_closed(&self, session_id: u32, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let mut subs = self.subscriptions.write();
        let ids: Vec<u32> = subs
            .iter()
            .filter(|(_, s)| s.session_id() == session_id)
            .map(|(id, _)| *id)
            .collect();
        let mut completions = Vec::new();
        for id in ids {
            if let Some(mut sub) = subs.remove(&id) {
                for request in sub.close() {
                    completions.push(EngineEvent {
                        session_id: request.session_id,
                        context: request.context,
                        subscription_id: id,
                        message: NotificationMessage::keep_alive(0, now),
                        available_sequence_numbers: vec![],
                        more_notifications: false,
                        ack_results: vec![StatusCode::BadSessionIdInvalid],
                    });
                }
                drop(subs);
                self.remove_from_node_index(id);
                subs = self.subscriptions.write();
            }
        }
        completions
    }

    /// Drive every subscription's periodic tick, per spec §4.6 `Tick(now)`.
    /// Returns timeouts to complete with `BadTimeout` and ready messages to
    /// hand to the transport.
    pub fn tick(&self, now: DateTime<Utc>) -> (Vec<QueuedPublishRequest>, Vec<EngineEvent>) {
        let mut subs = self.subscriptions.write();
        let mut timeouts = Vec::new();
        let mut events = Vec::new();
        let mut closed = Vec::new();

        for (id, sub) in subs.iter_mut() {
            timeouts.extend(sub.expire_publish_requests(now));

            let request = sub.pop_publish_request();
            let had_request = request.is_some();

            let message = sub.tick(TickReason::TickTimerFired, had_request, now);

            match (message, request) {
                (Some(msg), Some(req)) => {
                    events.push(EngineEvent {
                        session_id: req.session_id,
                        context: req.context,
                        subscription_id: *id,
                        more_notifications: false,
                        available_sequence_numbers: vec![msg.sequence_number],
                        message: msg,
                        ack_results: vec![],
                    });
                }
                (None, Some(req)) => sub.return_publish_request(req),
                (Some(_), None) | (None, None) => {}
            }

            if sub.state() == crate::subscription::SubscriptionState::Closed {
                closed.push(*id);
            }
        }

        for id in closed {
            if let Some(mut sub) = subs.remove(&id) {
                timeouts.extend(sub.close());
                drop(subs);
                self.remove_from_node_index(id);
                subs = self.subscriptions.write();
            }
        }

        (timeouts, events)
    }

    /// Handle a `Publish` request arriving while a subscription already has
    /// a notification ready — Part 4's "immediate tick" path, invoked
    /// instead of waiting for the next periodic `Tick`.
    pub fn on_publish_request_tick(&self, subscription_id: u32, now: DateTime<Utc>) -> Option<NotificationMessage> {
        let mut subs = self.subscriptions.write();
        let sub = subs.get_mut(&subscription_id)?;
        let request = sub.pop_publish_request()?;
        let message = sub.tick(TickReason::ReceivedPublishRequest, true, now);
        if message.is_none() {
            sub.return_publish_request(request);
        }
        message
    }

    /// Borrow the limits this engine enforces.
    pub fn limits(&self) -> &SubscriptionLimits {
        &self.limits
    }

    /// Handle `ConditionRefresh`/`ConditionRefresh2`, `SPEC_FULL.md` §F.2: a
    /// client-triggered full republish of every retained condition's
    /// current state, bracketed by `RefreshStartEvent`/`RefreshEndEvent`,
    /// per Part 9 §5.5. Distinct from `Republish`, which replays one
    /// sequence number rather than re-deriving fresh notifications.
    pub fn condition_refresh(
        &self,
        subscription_id: u32,
        notifier_node_id: &NodeId,
        conditions: &mut [&mut AlarmConditionInstance],
    ) -> StatusCode {
        if !self.subscriptions.read().contains_key(&subscription_id) {
            return StatusCode::BadSubscriptionIdInvalid;
        }
        self.event(
            notifier_node_id,
            &[(QualifiedName::new(0, "RefreshStartEvent"), Variant::Boolean(true))],
        );
        for condition in conditions.iter_mut() {
            if condition.retain() {
                condition.emit(self);
            }
        }
        self.event(
            notifier_node_id,
            &[(QualifiedName::new(0, "RefreshEndEvent"), Variant::Boolean(true))],
        );
        StatusCode::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_subscriptions_types::RequestHeader;

    fn header(handle: u32) -> RequestHeader {
        RequestHeader {
            authentication_token: NodeId::null(),
            timestamp: Utc::now(),
            request_handle: handle,
        }
    }

    #[test]
    fn create_subscription_assigns_ids_and_revises_params() {
        let engine = SubscriptionCache::new(SubscriptionLimits::default());
        let now = Utc::now();
        let req = CreateSubscriptionRequest {
            request_header: header(1),
            requested_publishing_interval: 500.0,
            requested_lifetime_count: 9,
            requested_max_keep_alive_count: 3,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        };
        let resp = engine.create_subscription(1, &req, now);
        assert_eq!(resp.response_header.service_result, StatusCode::Good);
        assert_eq!(resp.subscription_id, 1);
        assert_eq!(resp.revised_publishing_interval, 500.0);
        assert_eq!(resp.revised_lifetime_count, 9);
        assert_eq!(resp.revised_max_keep_alive_count, 3);
        assert_eq!(engine.subscription_count(), 1);
    }

    #[test]
    fn s4_scenario_third_publish_request_overflows() {
        let mut limits = SubscriptionLimits::default();
        limits.max_publish_requests_per_sub = 2;
        let engine = SubscriptionCache::new(limits);
        let now = Utc::now();
        let create = engine.create_subscription(
            1,
            &CreateSubscriptionRequest {
                request_header: header(1),
                requested_publishing_interval: 1000.0,
                requested_lifetime_count: 30,
                requested_max_keep_alive_count: 10,
                max_notifications_per_publish: 10,
                publishing_enabled: true,
                priority: 0,
            },
            now,
        );
        let sub_id = create.subscription_id;
        let mut dropped = Vec::new();
        for handle in 0..3 {
            let (_, completion) =
                engine.on_publish_intake(1, sub_id, handle, handle as u64, now + chrono::Duration::seconds(30), &[], now);
            dropped.extend(completion);
        }
        assert_eq!(dropped.len(), 1, "only the overflowing third request is completed early");
        assert_eq!(dropped[0].context, 0, "the oldest request (handle 0) is dropped, not the newest");
        assert_eq!(dropped[0].ack_results, vec![StatusCode::BadTooManyPublishRequests]);
        let subs = engine.subscriptions.read();
        assert_eq!(subs.get(&sub_id).unwrap().monitored_item_count(), 0);
    }

    #[test]
    fn session_closed_drains_publish_requests() {
        let engine = SubscriptionCache::new(SubscriptionLimits::default());
        let now = Utc::now();
        let create = engine.create_subscription(
            7,
            &CreateSubscriptionRequest {
                request_header: header(1),
                requested_publishing_interval: 1000.0,
                requested_lifetime_count: 30,
                requested_max_keep_alive_count: 10,
                max_notifications_per_publish: 10,
                publishing_enabled: true,
                priority: 0,
            },
            now,
        );
        engine.on_publish_intake(7, create.subscription_id, 1, 42, now + chrono::Duration::seconds(30), &[], now);
        let completions = engine.on_session_closed(7, now);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].context, 42);
        assert_eq!(engine.subscription_count(), 0);
    }
}
