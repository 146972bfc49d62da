//! The transport abstraction this crate sends requests through. The real
//! secure channel (chunking, signing, TCP framing) is the teacher's
//! `AsyncSecureChannel`; that machinery is an external collaborator here
//! (`spec.md` §1's wire-security Non-goal), so this crate only needs the
//! shape of its `send` method to drive the state machine and publish loop.

use std::time::Duration;

use futures::future::BoxFuture;
use opcua_subscriptions_types::StatusCode;

use crate::request::SubscriptionRequest;
use crate::request::SubscriptionResponse;

/// A channel capable of sending one [`SubscriptionRequest`] and returning its
/// matching [`SubscriptionResponse`], or failing outright (e.g. the
/// connection dropped before a response arrived).
///
/// Boxed as a trait object so [`Session`](crate::Session) can hold one
/// without this crate depending on a concrete transport.
pub trait UaChannel: Send + Sync {
    /// Send `request`, waiting up to `timeout` for the matching response.
    fn send(&self, request: SubscriptionRequest, timeout: Duration) -> BoxFuture<'_, Result<SubscriptionResponse, StatusCode>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;

    /// A channel stub that replays a fixed queue of responses, for exercising
    /// the publish loop and service builders without a real transport.
    pub struct ScriptedChannel {
        responses: Mutex<std::collections::VecDeque<Result<SubscriptionResponse, StatusCode>>>,
        pub sent: Mutex<Vec<SubscriptionRequest>>,
    }

    impl ScriptedChannel {
        pub fn new(responses: Vec<Result<SubscriptionResponse, StatusCode>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl UaChannel for ScriptedChannel {
        fn send(&self, request: SubscriptionRequest, _timeout: Duration) -> BoxFuture<'_, Result<SubscriptionResponse, StatusCode>> {
            self.sent.lock().push(request);
            let next = self
                .responses
                .lock()
                .pop_front()
                .unwrap_or(Err(StatusCode::BadConnectionClosed));
            async move { next }.boxed()
        }
    }
}
