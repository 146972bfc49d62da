//! Request/response structs for the Subscription Service Set, Part 4 §5.13
//! and §5.12. Field names and shapes follow the standard exactly (`spec.md`
//! §6 requires field-for-field fidelity); encode/decode behaviour is an
//! external collaborator and is not implemented here.

use crate::{
    filters::MonitoringFilter, node_id::NodeId, notification::NotificationMessage,
    status_code::StatusCode, string::UAString, DateTimeUtc, MonitoringMode, TimestampsToReturn,
};

/// Common to every request, per Part 4 §7.29.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHeader {
    /// The session's authentication token.
    pub authentication_token: NodeId,
    /// When the client sent the request.
    pub timestamp: DateTimeUtc,
    /// Client-defined handle, echoed back in the response header.
    pub request_handle: u32,
}

/// Common to every response, per Part 4 §7.30.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeader {
    /// When the server sent the response.
    pub timestamp: DateTimeUtc,
    /// Echoes the request's `request_handle`.
    pub request_handle: u32,
    /// Status of the service call as a whole.
    pub service_result: StatusCode,
}

impl ResponseHeader {
    /// Build a response header for `request_handle` carrying `service_result`.
    pub fn new(request_handle: u32, service_result: StatusCode, now: DateTimeUtc) -> Self {
        Self {
            timestamp: now,
            request_handle,
            service_result,
        }
    }
}

/// Part 4 §5.13.2.2.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscriptionRequest {
    pub request_header: RequestHeader,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscriptionResponse {
    pub response_header: ResponseHeader,
    pub subscription_id: u32,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

/// Part 4 §5.13.3.2.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifySubscriptionRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifySubscriptionResponse {
    pub response_header: ResponseHeader,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

/// Part 4 §5.13.4.2.
#[derive(Debug, Clone, PartialEq)]
pub struct SetPublishingModeRequest {
    pub request_header: RequestHeader,
    pub publishing_enabled: bool,
    pub subscription_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetPublishingModeResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

/// Part 4 §5.13.5.2.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSubscriptionsRequest {
    pub request_header: RequestHeader,
    pub subscription_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSubscriptionsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

/// Part 4 §5.13.1.2. Acknowledges one previously received sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

/// Part 4 §5.14.5.2.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishRequest {
    pub request_header: Option<RequestHeader>,
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishResponse {
    pub response_header: ResponseHeader,
    pub subscription_id: u32,
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
    pub results: Vec<StatusCode>,
}

/// Part 4 §5.14.6.2.
#[derive(Debug, Clone, PartialEq)]
pub struct RepublishRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub retransmit_sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepublishResponse {
    pub response_header: ResponseHeader,
    pub notification_message: NotificationMessage,
}

/// Parameters a client supplies for one monitored item to create, per Part 4
/// §7.17.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringParameters {
    pub client_handle: u32,
    pub sampling_interval: f64,
    pub filter: MonitoringFilter,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

/// Part 4 §5.12.2.2.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateRequest {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub index_range: UAString,
    pub monitoring_mode: MonitoringMode,
    pub requested_parameters: MonitoringParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemCreateResult {
    pub status_code: StatusCode,
    pub monitored_item_id: u32,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub timestamps_to_return: TimestampsToReturn,
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<MonitoredItemCreateResult>,
}

/// Part 4 §5.12.3.2.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemModifyRequest {
    pub monitored_item_id: u32,
    pub requested_parameters: MonitoringParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemModifyResult {
    pub status_code: StatusCode,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub timestamps_to_return: TimestampsToReturn,
    pub items_to_modify: Vec<MonitoredItemModifyRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<MonitoredItemModifyResult>,
}

/// Part 4 §5.12.4.2.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub monitored_item_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

/// Part 4 §5.12.5.2.
#[derive(Debug, Clone, PartialEq)]
pub struct SetMonitoringModeRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub monitoring_mode: MonitoringMode,
    pub monitored_item_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetMonitoringModeResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

/// Part 4 §5.12.6.2. Lets a "triggering" item force a disabled "triggered"
/// item to report. Not named in the distilled spec; restored per
/// `SPEC_FULL.md` §F.5.
#[derive(Debug, Clone, PartialEq)]
pub struct SetTriggeringRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub triggering_item_id: u32,
    pub links_to_add: Vec<u32>,
    pub links_to_remove: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetTriggeringResponse {
    pub response_header: ResponseHeader,
    pub add_results: Vec<StatusCode>,
    pub remove_results: Vec<StatusCode>,
}

/// Part 4 §5.13.7.2. Out of scope beyond an `BadNotImplemented` stub, per
/// `spec.md` §6.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSubscriptionsRequest {
    pub request_header: RequestHeader,
    pub subscription_ids: Vec<u32>,
    pub send_initial_values: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub status_code: StatusCode,
    pub available_sequence_numbers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferSubscriptionsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<TransferResult>,
}
