//! The client session: ties a [`UaChannel`] to the subscription state
//! machine and the client's local subscription cache. Transport connect/
//! reconnect, session activation and namespace bookkeeping are external
//! collaborators here (`spec.md` §1); this crate starts downstream of a
//! session that is already active.

pub mod event_loop;
pub mod services;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use opcua_subscriptions_core::{handle::AtomicHandle, sync::Mutex};
use opcua_subscriptions_types::{NodeId, RequestHeader, StatusCode};

pub use event_loop::SubscriptionEventLoop;
pub use services::subscriptions::state::{
    ClientMonitoredItem, ClientSubscription, OnSubscriptionNotification, PublishLimits, SubscriptionState,
};

use crate::channel::UaChannel;
use crate::state::ClientSubscriptionStateMachine;
use crate::ClientLimits;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// An OPC UA session, scoped to driving the Subscription Service Set over an
/// already-established channel.
pub struct Session {
    channel: Box<dyn UaChannel>,
    internal_session_id: u32,
    limits: ClientLimits,
    /// The §4.7 state machine: activation, subscription lifecycle, publish
    /// tokens and the request-context slab.
    pub(crate) state_machine: Mutex<ClientSubscriptionStateMachine>,
    /// The client's local mirror of its subscriptions and monitored items.
    pub subscription_state: Mutex<SubscriptionState>,
    /// Allocates client handles for newly created monitored items.
    pub(crate) monitored_item_handle: AtomicHandle,
    /// The token handed back by a successful `ActivateSession`, echoed in
    /// every subsequent request header. Session activation itself is an
    /// external collaborator (`spec.md` §1); this crate only needs to carry
    /// the token forward.
    authentication_token: Mutex<NodeId>,
    trigger_publish_tx: tokio::sync::watch::Sender<Instant>,
}

impl Session {
    /// Construct a session over `channel`, returning it alongside the
    /// [`SubscriptionEventLoop`] that must be polled for the publish loop to
    /// run.
    pub fn new(channel: Box<dyn UaChannel>, configuration_id: u32, user_policy_id: impl Into<String>, limits: ClientLimits) -> (Arc<Self>, SubscriptionEventLoop) {
        let (trigger_publish_tx, trigger_publish_rx) = tokio::sync::watch::channel(Instant::now());
        let session = Arc::new(Self {
            channel,
            internal_session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            subscription_state: Mutex::new(SubscriptionState::new(
                limits.min_publish_interval,
                PublishLimits::new(limits.max_publish_tokens),
            )),
            state_machine: Mutex::new(ClientSubscriptionStateMachine::new(configuration_id, user_policy_id)),
            monitored_item_handle: AtomicHandle::new(1000),
            authentication_token: Mutex::new(NodeId::null()),
            trigger_publish_tx,
            limits,
        });
        let event_loop = SubscriptionEventLoop::new(session.clone(), trigger_publish_rx);
        (session, event_loop)
    }

    /// The internal id used to tag this session's log lines.
    pub fn session_id(&self) -> u32 {
        self.internal_session_id
    }

    /// Timing/retry limits this session was constructed with.
    pub fn limits(&self) -> &ClientLimits {
        &self.limits
    }

    /// The underlying channel requests are sent through.
    pub(crate) fn channel(&self) -> &dyn UaChannel {
        self.channel.as_ref()
    }

    /// Ask the publish loop to send a request immediately rather than
    /// waiting for the next scheduled tick, e.g. right after creating a
    /// subscription.
    pub fn trigger_publish(&self) {
        let _ = self.trigger_publish_tx.send(Instant::now());
    }

    /// Current state machine state, for diagnostics.
    pub fn client_state(&self) -> crate::ClientState {
        self.state_machine.lock().state()
    }

    /// Process a `ReceivedResponse`-equivalent event directly against the
    /// state machine, used by service builders once their response arrives.
    pub(crate) fn note_send_failed(&self, kind: crate::RequestKind, status: StatusCode) {
        let _ = self.state_machine.lock().apply(crate::state::ClientEvent::SendRequestFailed {
            request_kind: kind,
            status,
        });
    }

    /// Record the token returned by a successful `ActivateSession`, to be
    /// echoed in subsequent request headers.
    pub fn set_authentication_token(&self, token: NodeId) {
        *self.authentication_token.lock() = token;
    }

    /// Build a request header carrying `request_handle` and the session's
    /// current authentication token.
    pub(crate) fn request_header(&self, request_handle: u32) -> RequestHeader {
        RequestHeader {
            authentication_token: self.authentication_token.lock().clone(),
            timestamp: chrono::Utc::now(),
            request_handle,
        }
    }
}
