//! Request builders for the Subscription Service Set, Part 4 §5.12/§5.13.
//! Each builder allocates a request context from the session's state
//! machine, sends through the session's [`UaChannel`](crate::channel::UaChannel),
//! and folds a successful response back into the local [`SubscriptionState`]
//! cache. Publish/Republish are driven by the event loop, not exposed here.

use std::sync::Arc;
use std::time::Duration;

use opcua_subscriptions_types::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse,
    DeleteSubscriptionsRequest, DeleteSubscriptionsResponse, ModifyMonitoredItemsRequest,
    ModifyMonitoredItemsResponse, ModifySubscriptionRequest, ModifySubscriptionResponse,
    MonitoredItemCreateRequest, MonitoringMode, MonitoringParameters, NodeId, SetMonitoringModeRequest,
    SetMonitoringModeResponse, SetPublishingModeRequest, SetPublishingModeResponse, SetTriggeringRequest,
    SetTriggeringResponse, StatusCode, SubscriptionError, TimestampsToReturn, TransferSubscriptionsRequest,
    TransferSubscriptionsResponse,
};

use crate::request::{RequestKind, SubscriptionRequest, SubscriptionResponse};
use crate::session::Session;
use crate::session_warn;

use super::state::{ClientMonitoredItem, ClientSubscription, OnSubscriptionNotification};

fn unexpected(session: &Session, kind: RequestKind, response: SubscriptionResponse) -> SubscriptionError {
    session_warn!(session, "unexpected response {:?} for {:?}", response, kind);
    session.note_send_failed(kind, StatusCode::BadUnexpectedError);
    SubscriptionError::Status(StatusCode::BadUnexpectedError)
}

async fn exchange(
    session: &Session,
    kind: RequestKind,
    request_id: u32,
    request: SubscriptionRequest,
) -> Result<SubscriptionResponse, SubscriptionError> {
    let result = session.channel().send(request, session.limits().request_timeout).await;
    session.state_machine.lock().take_context(request_id);
    match result {
        Ok(SubscriptionResponse::ServiceFault(status)) => {
            session.note_send_failed(kind, status);
            Err(SubscriptionError::Status(status))
        }
        Ok(response) => Ok(response),
        Err(status) => {
            session.note_send_failed(kind, status);
            Err(SubscriptionError::Status(status))
        }
    }
}

/// `CreateSubscription`, Part 4 §5.13.2.2.
pub struct CreateSubscription {
    session: Arc<Session>,
    callback: Box<dyn OnSubscriptionNotification>,
    publishing_interval: Duration,
    lifetime_count: u32,
    keep_alive_count: u32,
    max_notifications_per_publish: u32,
    publishing_enabled: bool,
    priority: u8,
}

impl CreateSubscription {
    /// Construct a call with the teacher's conventional defaults.
    pub fn new(session: Arc<Session>, callback: Box<dyn OnSubscriptionNotification>) -> Self {
        Self {
            session,
            callback,
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            keep_alive_count: 20,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }

    /// The requested publishing interval, in milliseconds once sent.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// Requested lifetime count; must be at least three times the keep-alive count.
    pub fn max_lifetime_count(mut self, lifetime_count: u32) -> Self {
        self.lifetime_count = lifetime_count;
        self
    }

    /// Requested keep-alive count.
    pub fn max_keep_alive_count(mut self, keep_alive_count: u32) -> Self {
        self.keep_alive_count = keep_alive_count;
        self
    }

    /// Cap on notifications delivered per Publish response; 0 means no limit.
    pub fn max_notifications_per_publish(mut self, max: u32) -> Self {
        self.max_notifications_per_publish = max;
        self
    }

    /// Relative priority among this session's subscriptions.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Whether publishing starts enabled.
    pub fn publishing_enabled(mut self, enabled: bool) -> Self {
        self.publishing_enabled = enabled;
        self
    }

    /// Send the request and, on success, register the subscription in the
    /// local cache and nudge the publish loop.
    pub async fn send(self) -> Result<CreateSubscriptionResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_create_subscription()?;
        let request = CreateSubscriptionRequest {
            request_header: self.session.request_header(request_id),
            requested_publishing_interval: self.publishing_interval.as_millis() as f64,
            requested_lifetime_count: self.lifetime_count,
            requested_max_keep_alive_count: self.keep_alive_count,
            max_notifications_per_publish: self.max_notifications_per_publish,
            publishing_enabled: self.publishing_enabled,
            priority: self.priority,
        };
        match exchange(&self.session, RequestKind::CreateSubscription, request_id, SubscriptionRequest::CreateSubscription(request)).await? {
            SubscriptionResponse::CreateSubscription(response) => {
                self.session.state_machine.lock().complete_create_subscription(response.subscription_id)?;
                self.session.subscription_state.lock().add_subscription(ClientSubscription::new(
                    response.subscription_id,
                    Duration::from_millis(response.revised_publishing_interval.max(0.0) as u64),
                    response.revised_lifetime_count,
                    response.revised_max_keep_alive_count,
                    self.callback,
                ));
                self.session.trigger_publish();
                Ok(response)
            }
            other => Err(unexpected(&self.session, RequestKind::CreateSubscription, other)),
        }
    }
}

/// `ModifySubscription`, Part 4 §5.13.3.2.
pub struct ModifySubscription {
    session: Arc<Session>,
    subscription_id: u32,
    publishing_interval: Duration,
    lifetime_count: u32,
    keep_alive_count: u32,
    max_notifications_per_publish: u32,
    priority: u8,
}

impl ModifySubscription {
    /// Construct a call against `subscription_id`.
    pub fn new(session: Arc<Session>, subscription_id: u32) -> Self {
        Self {
            session,
            subscription_id,
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            keep_alive_count: 20,
            max_notifications_per_publish: 0,
            priority: 0,
        }
    }

    /// The requested publishing interval.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// Requested lifetime count.
    pub fn max_lifetime_count(mut self, lifetime_count: u32) -> Self {
        self.lifetime_count = lifetime_count;
        self
    }

    /// Requested keep-alive count.
    pub fn max_keep_alive_count(mut self, keep_alive_count: u32) -> Self {
        self.keep_alive_count = keep_alive_count;
        self
    }

    /// Cap on notifications delivered per Publish response.
    pub fn max_notifications_per_publish(mut self, max: u32) -> Self {
        self.max_notifications_per_publish = max;
        self
    }

    /// Relative priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Send the request and fold the revised parameters into the cache.
    pub async fn send(self) -> Result<ModifySubscriptionResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::ModifySubscription)?;
        let request = ModifySubscriptionRequest {
            request_header: self.session.request_header(request_id),
            subscription_id: self.subscription_id,
            requested_publishing_interval: self.publishing_interval.as_millis() as f64,
            requested_lifetime_count: self.lifetime_count,
            requested_max_keep_alive_count: self.keep_alive_count,
            max_notifications_per_publish: self.max_notifications_per_publish,
            priority: self.priority,
        };
        match exchange(&self.session, RequestKind::ModifySubscription, request_id, SubscriptionRequest::ModifySubscription(request)).await? {
            SubscriptionResponse::ModifySubscription(response) => {
                self.session.subscription_state.lock().modify_subscription(
                    self.subscription_id,
                    Duration::from_millis(response.revised_publishing_interval.max(0.0) as u64),
                    response.revised_lifetime_count,
                    response.revised_max_keep_alive_count,
                );
                Ok(response)
            }
            other => Err(unexpected(&self.session, RequestKind::ModifySubscription, other)),
        }
    }
}

/// `SetPublishingMode`, Part 4 §5.13.4.2.
pub struct SetPublishingMode {
    session: Arc<Session>,
    publishing_enabled: bool,
    subscription_ids: Vec<u32>,
}

impl SetPublishingMode {
    /// Construct a call enabling or disabling publishing for `subscription_ids`.
    pub fn new(session: Arc<Session>, publishing_enabled: bool, subscription_ids: Vec<u32>) -> Self {
        Self {
            session,
            publishing_enabled,
            subscription_ids,
        }
    }

    /// Send the request.
    pub async fn send(self) -> Result<SetPublishingModeResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::SetPublishingMode)?;
        let request = SetPublishingModeRequest {
            request_header: self.session.request_header(request_id),
            publishing_enabled: self.publishing_enabled,
            subscription_ids: self.subscription_ids,
        };
        match exchange(&self.session, RequestKind::SetPublishingMode, request_id, SubscriptionRequest::SetPublishingMode(request)).await? {
            SubscriptionResponse::SetPublishingMode(response) => Ok(response),
            other => Err(unexpected(&self.session, RequestKind::SetPublishingMode, other)),
        }
    }
}

/// `DeleteSubscriptions`, Part 4 §5.13.5.2.
pub struct DeleteSubscriptions {
    session: Arc<Session>,
    subscription_ids: Vec<u32>,
}

impl DeleteSubscriptions {
    /// Construct a call deleting `subscription_ids`.
    pub fn new(session: Arc<Session>, subscription_ids: Vec<u32>) -> Self {
        Self { session, subscription_ids }
    }

    /// Send the request. Only transitions the state machine (Activated ->
    /// DeletingSubscr -> Activated) when the single subscription it tracks
    /// is among those deleted.
    pub async fn send(self) -> Result<DeleteSubscriptionsResponse, SubscriptionError> {
        let tracked = self.session.state_machine.lock().subscription_id();
        let deletes_tracked = tracked.is_some_and(|id| self.subscription_ids.contains(&id));

        let request_id = if deletes_tracked {
            self.session.state_machine.lock().begin_delete_subscription()?
        } else {
            self.session.state_machine.lock().begin_application_request(RequestKind::DeleteSubscription)?
        };
        let request = DeleteSubscriptionsRequest {
            request_header: self.session.request_header(request_id),
            subscription_ids: self.subscription_ids.clone(),
        };
        match exchange(&self.session, RequestKind::DeleteSubscription, request_id, SubscriptionRequest::DeleteSubscriptions(request)).await? {
            SubscriptionResponse::DeleteSubscriptions(response) => {
                if deletes_tracked {
                    self.session.state_machine.lock().complete_delete_subscription()?;
                }
                let mut cache = self.session.subscription_state.lock();
                for id in &self.subscription_ids {
                    cache.remove_subscription(*id);
                }
                Ok(response)
            }
            other => Err(unexpected(&self.session, RequestKind::DeleteSubscription, other)),
        }
    }
}

/// One node to monitor, for [`CreateMonitoredItems`].
#[derive(Debug, Clone)]
pub struct MonitoredItemSpec {
    /// The node to monitor.
    pub node_id: NodeId,
    /// The attribute to monitor, per Part 4 §7.17 (e.g. `Value` is 13).
    pub attribute_id: u32,
    /// Requested queue size.
    pub queue_size: u32,
    /// Whether to discard the oldest or newest entry when the queue is full.
    pub discard_oldest: bool,
    /// Requested sampling interval, in milliseconds.
    pub sampling_interval: Duration,
}

/// `CreateMonitoredItems`, Part 4 §5.12.2.2.
pub struct CreateMonitoredItems {
    session: Arc<Session>,
    subscription_id: u32,
    timestamps_to_return: TimestampsToReturn,
    items: Vec<MonitoredItemSpec>,
}

impl CreateMonitoredItems {
    /// Construct a call against `subscription_id` for `items`.
    pub fn new(session: Arc<Session>, subscription_id: u32, items: Vec<MonitoredItemSpec>) -> Self {
        Self {
            session,
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Both,
            items,
        }
    }

    /// Which timestamps the server should return with each value.
    pub fn timestamps_to_return(mut self, value: TimestampsToReturn) -> Self {
        self.timestamps_to_return = value;
        self
    }

    /// Send the request, registering every successfully created item in the
    /// local cache under a freshly allocated client handle.
    pub async fn send(self) -> Result<CreateMonitoredItemsResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_create_monitored_items()?;
        let client_handles: Vec<u32> = self
            .items
            .iter()
            .map(|_| self.session.monitored_item_handle.next())
            .collect();
        let items_to_create = self
            .items
            .iter()
            .zip(&client_handles)
            .map(|(item, handle)| MonitoredItemCreateRequest {
                node_id: item.node_id.clone(),
                attribute_id: item.attribute_id,
                index_range: Default::default(),
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle: *handle,
                    sampling_interval: item.sampling_interval.as_millis() as f64,
                    filter: opcua_subscriptions_types::MonitoringFilter::None,
                    queue_size: item.queue_size,
                    discard_oldest: item.discard_oldest,
                },
            })
            .collect();
        let request = CreateMonitoredItemsRequest {
            request_header: self.session.request_header(request_id),
            subscription_id: self.subscription_id,
            timestamps_to_return: self.timestamps_to_return,
            items_to_create,
        };
        match exchange(&self.session, RequestKind::CreateMonitoredItems, request_id, SubscriptionRequest::CreateMonitoredItems(request)).await? {
            SubscriptionResponse::CreateMonitoredItems(response) => {
                let mut handles = Vec::new();
                let mut cached = Vec::new();
                for ((item, handle), result) in self.items.iter().zip(&client_handles).zip(&response.results) {
                    if !result.status_code.is_good() {
                        continue;
                    }
                    handles.push((*handle, item.node_id.clone()));
                    cached.push(ClientMonitoredItem {
                        id: result.monitored_item_id,
                        client_handle: *handle,
                        node_id: item.node_id.clone(),
                    });
                }
                self.session.state_machine.lock().complete_create_monitored_items(&handles)?;
                self.session.subscription_state.lock().insert_monitored_items(self.subscription_id, cached);
                Ok(response)
            }
            other => Err(unexpected(&self.session, RequestKind::CreateMonitoredItems, other)),
        }
    }
}

/// `ModifyMonitoredItems`, Part 4 §5.12.3.2.
pub struct ModifyMonitoredItems {
    session: Arc<Session>,
    subscription_id: u32,
    timestamps_to_return: TimestampsToReturn,
    items: Vec<opcua_subscriptions_types::MonitoredItemModifyRequest>,
}

impl ModifyMonitoredItems {
    /// Construct a call against `subscription_id` for `items`.
    pub fn new(session: Arc<Session>, subscription_id: u32, items: Vec<opcua_subscriptions_types::MonitoredItemModifyRequest>) -> Self {
        Self {
            session,
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Both,
            items,
        }
    }

    /// Which timestamps the server should return with each value.
    pub fn timestamps_to_return(mut self, value: TimestampsToReturn) -> Self {
        self.timestamps_to_return = value;
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<ModifyMonitoredItemsResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::ModifyMonitoredItems)?;
        let request = ModifyMonitoredItemsRequest {
            request_header: self.session.request_header(request_id),
            subscription_id: self.subscription_id,
            timestamps_to_return: self.timestamps_to_return,
            items_to_modify: self.items,
        };
        match exchange(&self.session, RequestKind::ModifyMonitoredItems, request_id, SubscriptionRequest::ModifyMonitoredItems(request)).await? {
            SubscriptionResponse::ModifyMonitoredItems(response) => Ok(response),
            other => Err(unexpected(&self.session, RequestKind::ModifyMonitoredItems, other)),
        }
    }
}

/// `DeleteMonitoredItems`, Part 4 §5.12.4.2.
pub struct DeleteMonitoredItems {
    session: Arc<Session>,
    subscription_id: u32,
    monitored_item_ids: Vec<u32>,
}

impl DeleteMonitoredItems {
    /// Construct a call against `subscription_id` for `monitored_item_ids`.
    pub fn new(session: Arc<Session>, subscription_id: u32, monitored_item_ids: Vec<u32>) -> Self {
        Self {
            session,
            subscription_id,
            monitored_item_ids,
        }
    }

    /// Send the request, dropping successfully deleted items from the cache.
    pub async fn send(self) -> Result<DeleteMonitoredItemsResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::DeleteMonitoredItems)?;
        let request = DeleteMonitoredItemsRequest {
            request_header: self.session.request_header(request_id),
            subscription_id: self.subscription_id,
            monitored_item_ids: self.monitored_item_ids.clone(),
        };
        match exchange(&self.session, RequestKind::DeleteMonitoredItems, request_id, SubscriptionRequest::DeleteMonitoredItems(request)).await? {
            SubscriptionResponse::DeleteMonitoredItems(response) => {
                let removed: Vec<u32> = self
                    .monitored_item_ids
                    .iter()
                    .zip(&response.results)
                    .filter(|(_, status)| status.is_good())
                    .map(|(id, _)| *id)
                    .collect();
                self.session.subscription_state.lock().remove_monitored_items(self.subscription_id, &removed);
                Ok(response)
            }
            other => Err(unexpected(&self.session, RequestKind::DeleteMonitoredItems, other)),
        }
    }
}

/// `SetMonitoringMode`, Part 4 §5.12.5.2.
pub struct SetMonitoringMode {
    session: Arc<Session>,
    subscription_id: u32,
    monitoring_mode: MonitoringMode,
    monitored_item_ids: Vec<u32>,
}

impl SetMonitoringMode {
    /// Construct a call setting `monitoring_mode` on `monitored_item_ids`.
    pub fn new(session: Arc<Session>, subscription_id: u32, monitoring_mode: MonitoringMode, monitored_item_ids: Vec<u32>) -> Self {
        Self {
            session,
            subscription_id,
            monitoring_mode,
            monitored_item_ids,
        }
    }

    /// Send the request.
    pub async fn send(self) -> Result<SetMonitoringModeResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::SetMonitoringMode)?;
        let request = SetMonitoringModeRequest {
            request_header: self.session.request_header(request_id),
            subscription_id: self.subscription_id,
            monitoring_mode: self.monitoring_mode,
            monitored_item_ids: self.monitored_item_ids,
        };
        match exchange(&self.session, RequestKind::SetMonitoringMode, request_id, SubscriptionRequest::SetMonitoringMode(request)).await? {
            SubscriptionResponse::SetMonitoringMode(response) => Ok(response),
            other => Err(unexpected(&self.session, RequestKind::SetMonitoringMode, other)),
        }
    }
}

/// `SetTriggering`, Part 4 §5.12.6.2.
pub struct SetTriggering {
    session: Arc<Session>,
    subscription_id: u32,
    triggering_item_id: u32,
    links_to_add: Vec<u32>,
    links_to_remove: Vec<u32>,
}

impl SetTriggering {
    /// Construct a call for `triggering_item_id` on `subscription_id`.
    pub fn new(session: Arc<Session>, subscription_id: u32, triggering_item_id: u32) -> Self {
        Self {
            session,
            subscription_id,
            triggering_item_id,
            links_to_add: Vec::new(),
            links_to_remove: Vec::new(),
        }
    }

    /// Triggered items to link to the triggering item.
    pub fn links_to_add(mut self, ids: Vec<u32>) -> Self {
        self.links_to_add = ids;
        self
    }

    /// Triggered items to unlink.
    pub fn links_to_remove(mut self, ids: Vec<u32>) -> Self {
        self.links_to_remove = ids;
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<SetTriggeringResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::SetTriggering)?;
        let request = SetTriggeringRequest {
            request_header: self.session.request_header(request_id),
            subscription_id: self.subscription_id,
            triggering_item_id: self.triggering_item_id,
            links_to_add: self.links_to_add,
            links_to_remove: self.links_to_remove,
        };
        match exchange(&self.session, RequestKind::SetTriggering, request_id, SubscriptionRequest::SetTriggering(request)).await? {
            SubscriptionResponse::SetTriggering(response) => Ok(response),
            other => Err(unexpected(&self.session, RequestKind::SetTriggering, other)),
        }
    }
}

/// `TransferSubscriptions`, Part 4 §5.13.7.2. Out of scope beyond the stub
/// response the server side returns; kept as a thin pass-through so callers
/// observe `BadNotImplemented` rather than being unable to compile the call.
pub struct TransferSubscriptions {
    session: Arc<Session>,
    subscription_ids: Vec<u32>,
    send_initial_values: bool,
}

impl TransferSubscriptions {
    /// Construct a call transferring `subscription_ids`.
    pub fn new(session: Arc<Session>, subscription_ids: Vec<u32>, send_initial_values: bool) -> Self {
        Self {
            session,
            subscription_ids,
            send_initial_values,
        }
    }

    /// Send the request.
    pub async fn send(self) -> Result<TransferSubscriptionsResponse, SubscriptionError> {
        let request_id = self.session.state_machine.lock().begin_application_request(RequestKind::TransferSubscriptions)?;
        let request = TransferSubscriptionsRequest {
            request_header: self.session.request_header(request_id),
            subscription_ids: self.subscription_ids,
            send_initial_values: self.send_initial_values,
        };
        match exchange(&self.session, RequestKind::TransferSubscriptions, request_id, SubscriptionRequest::TransferSubscriptions(request)).await? {
            SubscriptionResponse::TransferSubscriptions(response) => Ok(response),
            other => Err(unexpected(&self.session, RequestKind::TransferSubscriptions, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_support::ScriptedChannel;
    use crate::state::{ClientEvent, ClientState};
    use opcua_subscriptions_types::{Identifier, MonitoredItemCreateResult};

    struct NullCallback;
    impl OnSubscriptionNotification for NullCallback {
        fn on_data_change(&mut self, _items: &[(u32, opcua_subscriptions_types::DataValue)]) {}
        fn on_event(&mut self, _items: &[(u32, Vec<opcua_subscriptions_types::Variant>)]) {}
    }

    fn activated_session(responses: Vec<Result<SubscriptionResponse, StatusCode>>) -> Arc<Session> {
        let channel = Box::new(ScriptedChannel::new(responses));
        let (session, _event_loop) = Session::new(channel, 1, "anonymous", crate::ClientLimits::default());
        session.state_machine.lock().begin_activate().unwrap();
        session.state_machine.lock().apply(ClientEvent::ActivatedSession).unwrap();
        session
    }

    fn header_ok(request_handle: u32) -> opcua_subscriptions_types::ResponseHeader {
        opcua_subscriptions_types::ResponseHeader::new(request_handle, StatusCode::Good, chrono::Utc::now())
    }

    #[tokio::test]
    async fn create_subscription_registers_in_cache_and_returns_to_activated() {
        let session = activated_session(vec![Ok(SubscriptionResponse::CreateSubscription(CreateSubscriptionResponse {
            response_header: header_ok(1),
            subscription_id: 7,
            revised_publishing_interval: 500.0,
            revised_lifetime_count: 60,
            revised_max_keep_alive_count: 20,
        }))]);

        let response = CreateSubscription::new(session.clone(), Box::new(NullCallback)).send().await.unwrap();
        assert_eq!(response.subscription_id, 7);
        assert_eq!(session.client_state(), ClientState::Activated);
        assert!(session.subscription_state.lock().subscription_exists(7));
    }

    #[tokio::test]
    async fn create_monitored_items_skips_failed_results() {
        let node = NodeId {
            namespace: 1,
            identifier: Identifier::Numeric(42),
        };
        let session = activated_session(vec![
            Ok(SubscriptionResponse::CreateSubscription(CreateSubscriptionResponse {
                response_header: header_ok(1),
                subscription_id: 7,
                revised_publishing_interval: 500.0,
                revised_lifetime_count: 60,
                revised_max_keep_alive_count: 20,
            })),
            Ok(SubscriptionResponse::CreateMonitoredItems(CreateMonitoredItemsResponse {
                response_header: header_ok(2),
                results: vec![
                    MonitoredItemCreateResult {
                        status_code: StatusCode::Good,
                        monitored_item_id: 100,
                        revised_sampling_interval: 1000.0,
                        revised_queue_size: 1,
                    },
                    MonitoredItemCreateResult {
                        status_code: StatusCode::BadNodeIdUnknown,
                        monitored_item_id: 0,
                        revised_sampling_interval: 0.0,
                        revised_queue_size: 0,
                    },
                ],
            })),
        ]);
        CreateSubscription::new(session.clone(), Box::new(NullCallback)).send().await.unwrap();

        let items = vec![
            MonitoredItemSpec {
                node_id: node.clone(),
                attribute_id: 13,
                queue_size: 1,
                discard_oldest: true,
                sampling_interval: Duration::from_millis(100),
            },
            MonitoredItemSpec {
                node_id: node,
                attribute_id: 13,
                queue_size: 1,
                discard_oldest: true,
                sampling_interval: Duration::from_millis(100),
            },
        ];
        CreateMonitoredItems::new(session.clone(), 7, items).send().await.unwrap();
        assert_eq!(session.state_machine.lock().monitored_item_handles().len(), 1);
        assert_eq!(session.client_state(), ClientState::Activated);
    }

    #[tokio::test]
    async fn service_fault_on_modify_subscription_forces_error_state() {
        let session = activated_session(vec![Ok(SubscriptionResponse::ServiceFault(StatusCode::BadServiceFault))]);
        let err = ModifySubscription::new(session.clone(), 7).send().await.unwrap_err();
        assert_eq!(StatusCode::from(err), StatusCode::BadServiceFault);
        assert_eq!(session.client_state(), ClientState::Error);
    }

    #[tokio::test]
    async fn delete_subscriptions_clears_tracked_subscription() {
        let session = activated_session(vec![
            Ok(SubscriptionResponse::CreateSubscription(CreateSubscriptionResponse {
                response_header: header_ok(1),
                subscription_id: 7,
                revised_publishing_interval: 500.0,
                revised_lifetime_count: 60,
                revised_max_keep_alive_count: 20,
            })),
            Ok(SubscriptionResponse::DeleteSubscriptions(DeleteSubscriptionsResponse {
                response_header: header_ok(2),
                results: vec![StatusCode::Good],
            })),
        ]);
        CreateSubscription::new(session.clone(), Box::new(NullCallback)).send().await.unwrap();
        DeleteSubscriptions::new(session.clone(), vec![7]).send().await.unwrap();
        assert_eq!(session.client_state(), ClientState::Activated);
        assert!(session.state_machine.lock().subscription_id().is_none());
        assert!(!session.subscription_state.lock().subscription_exists(7));
    }
}
