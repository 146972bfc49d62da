//! Request-context slab and the dispatch sum types for in-flight requests,
//! per `spec.md` §4.7 and the §9 design notes ("raw pointer + uintptr_t
//! application contexts" -> opaque handles; "callback-based generic
//! response dispatch" -> a `Response` sum type).

use opcua_subscriptions_types::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse,
    DeleteSubscriptionsRequest, DeleteSubscriptionsResponse, ModifyMonitoredItemsRequest,
    ModifyMonitoredItemsResponse, ModifySubscriptionRequest, ModifySubscriptionResponse,
    PublishRequest, PublishResponse, RepublishRequest, RepublishResponse,
    SetMonitoringModeRequest, SetMonitoringModeResponse, SetPublishingModeRequest,
    SetPublishingModeResponse, SetTriggeringRequest, SetTriggeringResponse, StatusCode,
    TransferSubscriptionsRequest, TransferSubscriptionsResponse,
};

/// Who a request context belongs to: the state machine's own bookkeeping
/// (e.g. Publish, CreateSubscription) or an application-issued request
/// (Read/Write/Browse/User) the machine merely multiplexes on the same
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    /// Owned by the state machine; its response drives a transition.
    StateMachine,
    /// Owned by the calling application; the response is handed back as-is.
    Application,
}

/// The service a request context was allocated for, per `spec.md` §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Session activation, external to this crate but multiplexed the same way.
    ActivateSession,
    /// `CreateSubscription`.
    CreateSubscription,
    /// `ModifySubscription`.
    ModifySubscription,
    /// `SetPublishingMode`.
    SetPublishingMode,
    /// `DeleteSubscriptions`.
    DeleteSubscription,
    /// `CreateMonitoredItems`.
    CreateMonitoredItems,
    /// `ModifyMonitoredItems`.
    ModifyMonitoredItems,
    /// `DeleteMonitoredItems`.
    DeleteMonitoredItems,
    /// `SetMonitoringMode`.
    SetMonitoringMode,
    /// `SetTriggering`.
    SetTriggering,
    /// `Publish`.
    Publish,
    /// `Republish`.
    Republish,
    /// `TransferSubscriptions`.
    TransferSubscriptions,
    /// An application-issued `Read`.
    Read,
    /// An application-issued `Write`.
    Write,
    /// An application-issued `Browse`.
    Browse,
    /// Any other application-issued request, not otherwise distinguished.
    User,
}

/// One entry in the in-flight request-context slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// The id this context was allocated under.
    pub id: u32,
    /// Whether the response drives the state machine or an application call.
    pub scope: RequestScope,
    /// The request's service kind.
    pub kind: RequestKind,
}

/// Append-only slab of in-flight request contexts with a free list, keyed by
/// a 32-bit id handed out on insertion. Reused slots get their index back as
/// the next id, so ids are not globally unique over the table's lifetime —
/// only while a context is outstanding, which is exactly the guarantee the
/// dispatch loop needs.
#[derive(Debug, Default)]
pub struct RequestContextTable {
    slots: Vec<Option<RequestContext>>,
    free: Vec<u32>,
}

impl RequestContextTable {
    /// Construct an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a context, returning its id.
    pub fn insert(&mut self, scope: RequestScope, kind: RequestKind) -> u32 {
        if let Some(idx) = self.free.pop() {
            let id = idx + 1;
            self.slots[idx as usize] = Some(RequestContext { id, scope, kind });
            id
        } else {
            let id = self.slots.len() as u32 + 1;
            self.slots.push(Some(RequestContext { id, scope, kind }));
            id
        }
    }

    /// Remove and return the context for `id`, if this table allocated it
    /// and it has not already been taken. Non-member ids (requests
    /// multiplexed by a different state machine) return `None`.
    pub fn take(&mut self, id: u32) -> Option<RequestContext> {
        let idx = id.checked_sub(1)?;
        let slot = self.slots.get_mut(idx as usize)?;
        let ctx = slot.take()?;
        self.free.push(idx);
        Some(ctx)
    }

    /// Number of contexts currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// The Subscription Service Set requests this crate knows how to send,
/// collapsed into one sum type for the channel boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionRequest {
    /// `CreateSubscription`.
    CreateSubscription(CreateSubscriptionRequest),
    /// `ModifySubscription`.
    ModifySubscription(ModifySubscriptionRequest),
    /// `SetPublishingMode`.
    SetPublishingMode(SetPublishingModeRequest),
    /// `DeleteSubscriptions`.
    DeleteSubscriptions(DeleteSubscriptionsRequest),
    /// `CreateMonitoredItems`.
    CreateMonitoredItems(CreateMonitoredItemsRequest),
    /// `ModifyMonitoredItems`.
    ModifyMonitoredItems(ModifyMonitoredItemsRequest),
    /// `DeleteMonitoredItems`.
    DeleteMonitoredItems(DeleteMonitoredItemsRequest),
    /// `SetMonitoringMode`.
    SetMonitoringMode(SetMonitoringModeRequest),
    /// `SetTriggering`.
    SetTriggering(SetTriggeringRequest),
    /// `Publish`.
    Publish(PublishRequest),
    /// `Republish`.
    Republish(RepublishRequest),
    /// `TransferSubscriptions`.
    TransferSubscriptions(TransferSubscriptionsRequest),
}

/// The matching response sum type, per the §9 design note replacing
/// callback-based generic dispatch with a typed sum type matched in the
/// state machine's transition function.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionResponse {
    /// `CreateSubscription`.
    CreateSubscription(CreateSubscriptionResponse),
    /// `ModifySubscription`.
    ModifySubscription(ModifySubscriptionResponse),
    /// `SetPublishingMode`.
    SetPublishingMode(SetPublishingModeResponse),
    /// `DeleteSubscriptions`.
    DeleteSubscriptions(DeleteSubscriptionsResponse),
    /// `CreateMonitoredItems`.
    CreateMonitoredItems(CreateMonitoredItemsResponse),
    /// `ModifyMonitoredItems`.
    ModifyMonitoredItems(ModifyMonitoredItemsResponse),
    /// `DeleteMonitoredItems`.
    DeleteMonitoredItems(DeleteMonitoredItemsResponse),
    /// `SetMonitoringMode`.
    SetMonitoringMode(SetMonitoringModeResponse),
    /// `SetTriggering`.
    SetTriggering(SetTriggeringResponse),
    /// `Publish`.
    Publish(PublishResponse),
    /// `Republish`.
    Republish(RepublishResponse),
    /// `TransferSubscriptions`.
    TransferSubscriptions(TransferSubscriptionsResponse),
    /// A `ServiceFault` was returned instead of the expected response type.
    ServiceFault(StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_slot_gets_same_id_back() {
        let mut table = RequestContextTable::new();
        let a = table.insert(RequestScope::StateMachine, RequestKind::Publish);
        let b = table.insert(RequestScope::Application, RequestKind::Read);
        assert_eq!(table.outstanding(), 2);
        table.take(a).unwrap();
        assert_eq!(table.outstanding(), 1);
        let c = table.insert(RequestScope::StateMachine, RequestKind::CreateSubscription);
        assert_eq!(c, a);
        assert!(table.take(b).is_some());
    }

    #[test]
    fn unknown_id_is_ignored() {
        let mut table = RequestContextTable::new();
        let a = table.insert(RequestScope::StateMachine, RequestKind::Publish);
        assert!(table.take(a + 41).is_none());
    }
}
