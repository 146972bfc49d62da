//! The client-side subscription state machine, `spec.md` §4.7: states
//! Init/Activating/Activated/CreatingSubscr/CreatingMonIt/DeletingSubscr/
//! Closing/Error, driven by the five application events named there. Models
//! the §9 design note "cyclic graph session <-> subscription <-> monitored
//! item: use ids, not pointers" by carrying only ids and a request-context
//! slab rather than references into a transport-owned object graph.

use std::collections::HashMap;

use opcua_subscriptions_types::{NodeId, StatusCode, SubscriptionError};

use crate::request::{RequestContextTable, RequestKind, RequestScope};

/// One of the eight states named in `spec.md` §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No session activation has been attempted yet.
    Init,
    /// `ActivateSession` is outstanding.
    Activating,
    /// The session is usable; no subscription operation is outstanding.
    Activated,
    /// `CreateSubscription` is outstanding.
    CreatingSubscr,
    /// `CreateMonitoredItems` is outstanding.
    CreatingMonIt,
    /// `DeleteSubscriptions` is outstanding.
    DeletingSubscr,
    /// The session is being torn down.
    Closing,
    /// A non-recoverable fault occurred; the caller must start a new connection.
    Error,
}

/// One of the five events that drive the state machine, per `spec.md` §4.7.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// `ActivateSession` succeeded.
    ActivatedSession,
    /// The session was closed, by us or the server.
    ClosedSession,
    /// `ActivateSession` itself failed.
    SessionActivationFailure(StatusCode),
    /// A request failed to even reach the wire (e.g. the channel closed
    /// before send). Forces `Error`, except when `request_kind` is
    /// `Publish`, which is tolerated.
    SendRequestFailed {
        /// The request kind that failed to send.
        request_kind: RequestKind,
        /// Why it failed.
        status: StatusCode,
    },
}

/// Tracks the publish-token pool (`nTokenUsable`/`nTokenTarget`, `spec.md`
/// §4.7) and the acknowledgement latch `(bAck, ackSeqNum)` that rides on the
/// next outgoing Publish request.
#[derive(Debug, Clone, Default)]
pub struct PublishTokenPolicy {
    in_flight: u32,
    target: u32,
    ack: Option<(u32, u32)>,
}

impl PublishTokenPolicy {
    /// Construct a policy targeting `target` in-flight Publish requests.
    pub fn new(target: u32) -> Self {
        Self {
            in_flight: 0,
            target,
            ack: None,
        }
    }

    /// Number of Publish requests currently outstanding.
    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    /// The steady-state number of outstanding Publish requests this policy
    /// is converging towards.
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Change the target pool size, e.g. after `max_publish_tokens` changes.
    pub fn set_target(&mut self, target: u32) {
        self.target = target;
    }

    /// True if another Publish request should be sent to reach `target`.
    /// Per invariant 6, in-flight never exceeds `target` by more than the
    /// one request sent as a replacement for the response being processed,
    /// which callers achieve by calling this before decrementing for the
    /// response just received.
    pub fn wants_more(&self) -> bool {
        self.in_flight < self.target
    }

    /// Record that a Publish request was just sent.
    pub fn note_sent(&mut self) {
        self.in_flight += 1;
    }

    /// Record that a Publish response (success or tolerated fault) was
    /// processed, freeing its slot.
    pub fn note_completed(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Latch an acknowledgement to attach to the next outgoing Publish.
    pub fn latch_ack(&mut self, subscription_id: u32, sequence_number: u32) {
        self.ack = Some((subscription_id, sequence_number));
    }

    /// Take the latched acknowledgement, if any, clearing it.
    pub fn take_ack(&mut self) -> Option<(u32, u32)> {
        self.ack.take()
    }
}

/// The client-side subscription state machine for one connection.
pub struct ClientSubscriptionStateMachine {
    configuration_id: u32,
    user_policy_id: String,
    state: ClientState,
    contexts: RequestContextTable,
    tokens: PublishTokenPolicy,
    subscription_id: Option<u32>,
    monitored_item_handles: Vec<u32>,
    handle_to_node: HashMap<u32, NodeId>,
}

impl ClientSubscriptionStateMachine {
    /// Construct a machine in `Init`, for the given configuration and user
    /// policy id (the credentials themselves are the transport's concern).
    pub fn new(configuration_id: u32, user_policy_id: impl Into<String>) -> Self {
        Self {
            configuration_id,
            user_policy_id: user_policy_id.into(),
            state: ClientState::Init,
            contexts: RequestContextTable::new(),
            tokens: PublishTokenPolicy::new(2),
            subscription_id: None,
            monitored_item_handles: Vec::new(),
            handle_to_node: HashMap::new(),
        }
    }

    /// This connection's configuration id.
    pub fn configuration_id(&self) -> u32 {
        self.configuration_id
    }

    /// The user policy id this connection authenticated with.
    pub fn user_policy_id(&self) -> &str {
        &self.user_policy_id
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The subscription id, once `CreateSubscription` has completed.
    pub fn subscription_id(&self) -> Option<u32> {
        self.subscription_id
    }

    /// Created monitored-item handles so far.
    pub fn monitored_item_handles(&self) -> &[u32] {
        &self.monitored_item_handles
    }

    /// Publish-token pool and ack latch.
    pub fn tokens(&mut self) -> &mut PublishTokenPolicy {
        &mut self.tokens
    }

    /// Resolve a monitored item's client handle to the node it targets, for
    /// callback dispatch.
    pub fn node_for_handle(&self, handle: u32) -> Option<&NodeId> {
        self.handle_to_node.get(&handle)
    }

    fn require(&self, expected: ClientState) -> Result<(), SubscriptionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SubscriptionError::InvalidClientState(state_name(expected)))
        }
    }

    /// Begin session activation: Init -> Activating. Allocates the request
    /// context for `ActivateSession`.
    pub fn begin_activate(&mut self) -> Result<u32, SubscriptionError> {
        self.require(ClientState::Init)?;
        self.state = ClientState::Activating;
        Ok(self.contexts.insert(RequestScope::StateMachine, RequestKind::ActivateSession))
    }

    /// Begin `CreateSubscription`: Activated -> CreatingSubscr.
    pub fn begin_create_subscription(&mut self) -> Result<u32, SubscriptionError> {
        self.require(ClientState::Activated)?;
        self.state = ClientState::CreatingSubscr;
        Ok(self.contexts.insert(RequestScope::StateMachine, RequestKind::CreateSubscription))
    }

    /// Begin `CreateMonitoredItems`: Activated -> CreatingMonIt.
    pub fn begin_create_monitored_items(&mut self) -> Result<u32, SubscriptionError> {
        self.require(ClientState::Activated)?;
        self.state = ClientState::CreatingMonIt;
        Ok(self.contexts.insert(RequestScope::StateMachine, RequestKind::CreateMonitoredItems))
    }

    /// Begin `DeleteSubscriptions`: Activated -> DeletingSubscr.
    pub fn begin_delete_subscription(&mut self) -> Result<u32, SubscriptionError> {
        self.require(ClientState::Activated)?;
        self.state = ClientState::DeletingSubscr;
        Ok(self.contexts.insert(RequestScope::StateMachine, RequestKind::DeleteSubscription))
    }

    /// Allocate a context for an application-scoped request (Read/Write/
    /// Browse/User), valid any time the session is activated. Does not
    /// change `state`.
    pub fn begin_application_request(&mut self, kind: RequestKind) -> Result<u32, SubscriptionError> {
        self.require(ClientState::Activated)?;
        Ok(self.contexts.insert(RequestScope::Application, kind))
    }

    /// Allocate a context for a Publish request. Valid from `Activated`
    /// onward, since publishing continues while other operations run.
    pub fn begin_publish(&mut self) -> Result<u32, SubscriptionError> {
        if matches!(self.state, ClientState::Closing | ClientState::Error | ClientState::Init) {
            return Err(SubscriptionError::InvalidClientState(state_name(ClientState::Activated)));
        }
        self.tokens.note_sent();
        Ok(self.contexts.insert(RequestScope::StateMachine, RequestKind::Publish))
    }

    /// Take back a previously allocated context for `id`, or `None` if this
    /// machine never allocated it (response belongs to a different
    /// multiplexed state machine, per `spec.md` §4.7).
    pub fn take_context(&mut self, id: u32) -> Option<crate::request::RequestContext> {
        self.contexts.take(id)
    }

    /// Process `event`, returning the resulting state or an error if the
    /// event was not valid from the current state.
    pub fn apply(&mut self, event: ClientEvent) -> Result<ClientState, SubscriptionError> {
        match event {
            ClientEvent::ActivatedSession => {
                self.require(ClientState::Activating)?;
                self.state = ClientState::Activated;
            }
            ClientEvent::SessionActivationFailure(status) => {
                self.state = ClientState::Error;
                return Err(SubscriptionError::Status(status));
            }
            ClientEvent::ClosedSession => {
                self.state = ClientState::Closing;
            }
            ClientEvent::SendRequestFailed { request_kind, status } => {
                if request_kind != RequestKind::Publish {
                    self.state = ClientState::Error;
                    return Err(SubscriptionError::Status(status));
                }
            }
        }
        Ok(self.state)
    }

    /// Complete a `CreateSubscription` that this machine was awaiting,
    /// storing the returned id and returning to `Activated`.
    pub fn complete_create_subscription(&mut self, subscription_id: u32) -> Result<(), SubscriptionError> {
        self.require(ClientState::CreatingSubscr)?;
        self.subscription_id = Some(subscription_id);
        self.state = ClientState::Activated;
        Ok(())
    }

    /// Complete a `CreateMonitoredItems` that this machine was awaiting.
    pub fn complete_create_monitored_items(&mut self, handles: &[(u32, NodeId)]) -> Result<(), SubscriptionError> {
        self.require(ClientState::CreatingMonIt)?;
        for (handle, node) in handles {
            self.monitored_item_handles.push(*handle);
            self.handle_to_node.insert(*handle, node.clone());
        }
        self.state = ClientState::Activated;
        Ok(())
    }

    /// Complete a `DeleteSubscriptions` that this machine was awaiting.
    pub fn complete_delete_subscription(&mut self) -> Result<(), SubscriptionError> {
        self.require(ClientState::DeletingSubscr)?;
        self.subscription_id = None;
        self.monitored_item_handles.clear();
        self.handle_to_node.clear();
        self.state = ClientState::Activated;
        Ok(())
    }

    /// Complete a Publish response, freeing its token slot and (unless it
    /// was a tolerated `ServiceFault`) latching the acknowledgement for the
    /// next outgoing Publish.
    pub fn complete_publish(&mut self) {
        self.tokens.note_completed();
    }
}

fn state_name(state: ClientState) -> &'static str {
    match state {
        ClientState::Init => "Init",
        ClientState::Activating => "Activating",
        ClientState::Activated => "Activated",
        ClientState::CreatingSubscr => "CreatingSubscr",
        ClientState::CreatingMonIt => "CreatingMonIt",
        ClientState::DeletingSubscr => "DeletingSubscr",
        ClientState::Closing => "Closing",
        ClientState::Error => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_subscriptions_types::Identifier;

    fn node(n: u32) -> NodeId {
        NodeId {
            namespace: 1,
            identifier: Identifier::Numeric(n),
        }
    }

    #[test]
    fn happy_path_activation_and_subscription_create() {
        let mut sm = ClientSubscriptionStateMachine::new(1, "anonymous");
        sm.begin_activate().unwrap();
        assert_eq!(sm.state(), ClientState::Activating);
        sm.apply(ClientEvent::ActivatedSession).unwrap();
        assert_eq!(sm.state(), ClientState::Activated);

        sm.begin_create_subscription().unwrap();
        assert_eq!(sm.state(), ClientState::CreatingSubscr);
        sm.complete_create_subscription(7).unwrap();
        assert_eq!(sm.state(), ClientState::Activated);
        assert_eq!(sm.subscription_id(), Some(7));
    }

    #[test]
    fn create_monitored_items_records_handle_to_node_mapping() {
        let mut sm = ClientSubscriptionStateMachine::new(1, "anonymous");
        sm.begin_activate().unwrap();
        sm.apply(ClientEvent::ActivatedSession).unwrap();
        sm.begin_create_subscription().unwrap();
        sm.complete_create_subscription(1).unwrap();

        sm.begin_create_monitored_items().unwrap();
        sm.complete_create_monitored_items(&[(1000, node(42))]).unwrap();
        assert_eq!(sm.monitored_item_handles(), &[1000]);
        assert_eq!(sm.node_for_handle(1000), Some(&node(42)));
    }

    #[test]
    fn publish_fault_is_tolerated_other_faults_force_error() {
        let mut sm = ClientSubscriptionStateMachine::new(1, "anonymous");
        sm.begin_activate().unwrap();
        sm.apply(ClientEvent::ActivatedSession).unwrap();

        sm.apply(ClientEvent::SendRequestFailed {
            request_kind: RequestKind::Publish,
            status: StatusCode::BadServiceFault,
        })
        .unwrap();
        assert_eq!(sm.state(), ClientState::Activated);

        let err = sm
            .apply(ClientEvent::SendRequestFailed {
                request_kind: RequestKind::Read,
                status: StatusCode::BadConnectionClosed,
            })
            .unwrap_err();
        assert_eq!(sm.state(), ClientState::Error);
        assert_eq!(StatusCode::from(err), StatusCode::BadConnectionClosed);
    }

    #[test]
    fn token_pool_converges_to_target_invariant_6() {
        let mut tokens = PublishTokenPolicy::new(2);
        assert!(tokens.wants_more());
        tokens.note_sent();
        assert!(tokens.wants_more());
        tokens.note_sent();
        assert!(!tokens.wants_more());
        assert_eq!(tokens.in_flight(), 2);

        tokens.note_completed();
        assert_eq!(tokens.in_flight(), 1);
        assert!(tokens.wants_more());
    }

    #[test]
    fn operation_invalid_from_current_state_is_rejected() {
        let mut sm = ClientSubscriptionStateMachine::new(1, "anonymous");
        let err = sm.begin_create_subscription().unwrap_err();
        assert_eq!(StatusCode::from(err), StatusCode::BadInvalidState);
    }
}
