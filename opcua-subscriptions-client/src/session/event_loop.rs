//! The publish loop: keeps `nTokenTarget` Publish requests genuinely
//! concurrent in flight, carrying the latched acknowledgement on whichever
//! request goes out next, per `spec.md` §4.7 and invariant 6. Grounded on
//! the teacher's `SubscriptionEventLoop` shape (`async-opcua-client/src/
//! session/event_loop.rs`'s `tokio::select!`-driven poll loop over a set of
//! outstanding futures), stripped of transport reconnect and
//! keep-alive-by-Read, which are external collaborators here.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::warn;
use opcua_subscriptions_types::{PublishRequest, StatusCode, SubscriptionAcknowledgement};

use crate::request::{RequestKind, SubscriptionRequest, SubscriptionResponse};
use crate::session::Session;
use crate::session_debug;

/// Drives the publish-token pool for one session. Must be polled (via
/// [`run`](Self::run) or [`spawn`](Self::spawn)) for Publish requests to be
/// sent at all.
#[must_use = "The subscription event loop must be run for publishing to work"]
pub struct SubscriptionEventLoop {
    session: Arc<Session>,
    trigger_publish_rx: tokio::sync::watch::Receiver<Instant>,
}

impl SubscriptionEventLoop {
    pub(crate) fn new(session: Arc<Session>, trigger_publish_rx: tokio::sync::watch::Receiver<Instant>) -> Self {
        Self {
            session,
            trigger_publish_rx,
        }
    }

    /// Run the loop until the session's channel starts refusing Publish
    /// requests outright (a non-Publish-tolerated fault, which the state
    /// machine already reports by moving to `Error`).
    pub async fn run(mut self) {
        let mut in_flight: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();
        loop {
            self.refill(&mut in_flight);

            let interval = self.session.subscription_state.lock().min_publish_interval();
            if in_flight.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.trigger_publish_rx.changed() => {}
                }
            } else {
                tokio::select! {
                    _ = in_flight.next() => {}
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.trigger_publish_rx.changed() => {}
                }
            }

            if matches!(self.session.client_state(), crate::ClientState::Error | crate::ClientState::Closing) {
                break;
            }
        }
    }

    /// Spawn [`run`](Self::run) on a tokio task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn(self.run())
    }

    /// Push new Publish requests onto `in_flight` until the token pool has
    /// reached its target, recomputing the target from the current
    /// subscription count each time (invariant 6: in-flight never exceeds
    /// target by more than one, since each push happens one at a time).
    fn refill(&mut self, in_flight: &mut FuturesUnordered<BoxFuture<'static, ()>>) {
        loop {
            let target = self.session.subscription_state.lock().publish_token_target();
            let wants_more = {
                let mut sm = self.session.state_machine.lock();
                sm.tokens().set_target(target);
                sm.tokens().wants_more()
            };
            if !wants_more {
                break;
            }
            let request_id = match self.session.state_machine.lock().begin_publish() {
                Ok(id) => id,
                Err(_) => break,
            };
            let session = self.session.clone();
            in_flight.push(Box::pin(publish_once(session, request_id)));
        }
    }
}

/// Send a single Publish request and fold its response into the session,
/// as an owned future so many can run concurrently in a
/// [`FuturesUnordered`].
async fn publish_once(session: Arc<Session>, request_id: u32) {
    let ack = session.state_machine.lock().tokens().take_ack();
    let acknowledgements = ack
        .map(|(subscription_id, sequence_number)| {
            vec![SubscriptionAcknowledgement {
                subscription_id,
                sequence_number,
            }]
        })
        .unwrap_or_default();

    let request = PublishRequest {
        request_header: None,
        subscription_acknowledgements: acknowledgements,
    };
    let timeout = session.limits().publish_timeout;
    let result = session.channel().send(SubscriptionRequest::Publish(request), timeout).await;
    session.state_machine.lock().take_context(request_id);

    match result {
        Ok(SubscriptionResponse::Publish(response)) if response.response_header.service_result.is_good() => {
            if !response.notification_message.is_keep_alive() {
                session
                    .subscription_state
                    .lock()
                    .dispatch_notification(response.subscription_id, &response.notification_message);
            }
            session
                .state_machine
                .lock()
                .tokens()
                .latch_ack(response.subscription_id, response.notification_message.sequence_number);
            session.state_machine.lock().complete_publish();
            session_debug!(session, "publish delivered, {} available", response.available_sequence_numbers.len());
        }
        Ok(SubscriptionResponse::Publish(response)) => {
            session.note_send_failed(RequestKind::Publish, response.response_header.service_result);
            session.state_machine.lock().complete_publish();
        }
        Ok(SubscriptionResponse::ServiceFault(status)) => {
            warn!("publish service fault: {status}");
            session.note_send_failed(RequestKind::Publish, status);
            session.state_machine.lock().complete_publish();
        }
        Ok(_) => {
            session.note_send_failed(RequestKind::Publish, StatusCode::BadUnexpectedError);
            session.state_machine.lock().complete_publish();
        }
        Err(status) => {
            session.note_send_failed(RequestKind::Publish, status);
            session.state_machine.lock().complete_publish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_support::ScriptedChannel;
    use crate::session::services::subscriptions::state::{ClientSubscription, OnSubscriptionNotification, PublishLimits, SubscriptionState};
    use crate::state::ClientEvent;
    use opcua_subscriptions_types::{DataValue, NotificationMessage, NotificationMessageBody, PublishResponse, ResponseHeader, Variant};
    use std::time::Duration;

    struct NullCallback;
    impl OnSubscriptionNotification for NullCallback {
        fn on_data_change(&mut self, _items: &[(u32, DataValue)]) {}
        fn on_event(&mut self, _items: &[(u32, Vec<Variant>)]) {}
    }

    fn publish_ok(subscription_id: u32, sequence_number: u32) -> Result<SubscriptionResponse, StatusCode> {
        Ok(SubscriptionResponse::Publish(PublishResponse {
            response_header: ResponseHeader::new(0, StatusCode::Good, chrono::Utc::now()),
            subscription_id,
            available_sequence_numbers: vec![],
            more_notifications: false,
            notification_message: NotificationMessage {
                sequence_number,
                publish_time: chrono::Utc::now(),
                notification_data: vec![NotificationMessageBody::DataChange(vec![])],
            },
            results: vec![],
        }))
    }

    #[tokio::test]
    async fn refill_converges_to_target_without_exceeding_it() {
        let channel = Box::new(ScriptedChannel::new(vec![publish_ok(7, 1), publish_ok(7, 2)]));
        let (session, _event_loop) = Session::new(channel, 1, "anonymous", crate::ClientLimits::default());
        session.state_machine.lock().begin_activate().unwrap();
        session.state_machine.lock().apply(ClientEvent::ActivatedSession).unwrap();

        {
            let mut cache = session.subscription_state.lock();
            *cache = SubscriptionState::new(Duration::from_millis(10), PublishLimits::new(2));
            cache.add_subscription(ClientSubscription::new(7, Duration::from_millis(500), 60, 20, Box::new(NullCallback)));
        }

        let (_tx, rx) = tokio::sync::watch::channel(Instant::now());
        let mut event_loop = SubscriptionEventLoop::new(session.clone(), rx);
        let mut in_flight = FuturesUnordered::new();
        event_loop.refill(&mut in_flight);
        assert_eq!(in_flight.len(), 1, "one subscription means a target of one token");
        assert_eq!(session.state_machine.lock().tokens().in_flight(), 1);

        in_flight.next().await;
        assert_eq!(session.state_machine.lock().tokens().in_flight(), 0);
        assert_eq!(session.state_machine.lock().tokens().take_ack(), Some((7, 1)));
    }
}
