/// OPC UA status codes used at the boundary of the subscription engine.
///
/// This is a hand-picked subset of the ~700 status codes defined by Part 7 —
/// exactly the ones `spec.md` §7 requires the core to distinguish, plus
/// `Good`/`Uncertain` baselines. The full table is generated code in the
/// real type library and out of scope here.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum StatusCode {
    /// The operation succeeded.
    #[default]
    Good,
    /// The operation succeeded but the result may not be fully reliable.
    Uncertain,
    /// Generic failure.
    Bad,
    /// The subscription id is not known to the server.
    BadSubscriptionIdInvalid,
    /// The monitored item id is not known to the subscription.
    BadMonitoredItemIdInvalid,
    /// The server cannot accept another subscription.
    BadTooManySubscriptions,
    /// The subscription's publish request queue is full.
    BadTooManyPublishRequests,
    /// A `Republish` named a sequence number that is no longer retained.
    BadMessageNotAvailable,
    /// The session that held a publish request disappeared.
    BadSessionIdInvalid,
    /// A publish request had no subscription left to serve it.
    BadNoSubscription,
    /// A publish request's deadline expired before it was matched.
    BadTimeout,
    /// The requested filter is not allowed in this context.
    BadFilterNotAllowed,
    /// The monitored item's filter is structurally invalid.
    BadMonitoredItemFilterInvalid,
    /// The notification-message builder ran out of memory.
    BadOutOfMemory,
    /// Ack/Confirm/AddComment named an `EventId` no longer in the recall ring.
    BadEventIdUnknown,
    /// A method call targeted a disabled alarm condition.
    BadConditionDisabled,
    /// The operation is not valid for the current subscription state.
    BadInvalidState,
    /// The node id does not exist in the address space (external collaborator).
    BadNodeIdUnknown,
    /// The attribute is not supported on this node.
    BadAttributeIdInvalid,
    /// The service is recognised but not implemented (e.g. `TransferSubscriptions`).
    BadNotImplemented,
    /// A request was cancelled because the underlying channel closed.
    BadConnectionClosed,
    /// The server received a request it did not expect on this channel.
    BadUnexpectedError,
    /// A `ServiceFault` was received for an in-flight request.
    BadServiceFault,
}

impl StatusCode {
    /// True if this code represents success (`Good` or any `Good*` variant;
    /// here, exactly `Good`).
    pub fn is_good(&self) -> bool {
        matches!(self, StatusCode::Good)
    }

    /// True if this is `Bad` or one of its specializations.
    pub fn is_bad(&self) -> bool {
        !self.is_good() && !matches!(self, StatusCode::Uncertain)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for StatusCode {}
