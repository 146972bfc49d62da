use thiserror::Error;

use crate::status_code::StatusCode;

/// Errors the subscription engine and client state machine need to
/// distinguish beyond a bare `StatusCode`, following the teacher's
/// `OpcUaError` pattern of wrapping the boundary status code alongside
/// richer internal context used for logging.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    /// The operation failed with the given protocol-visible status.
    #[error("request failed: {0}")]
    Status(StatusCode),
    /// A request id was not recognised as belonging to this state machine
    /// (used for multiplexing — not itself a protocol error).
    #[error("unrecognised request id {0}")]
    UnknownRequestId(u32),
    /// The client state machine is not in a state where this operation is
    /// valid.
    #[error("operation not valid in state {0:?}")]
    InvalidClientState(&'static str),
}

impl From<StatusCode> for SubscriptionError {
    fn from(value: StatusCode) -> Self {
        SubscriptionError::Status(value)
    }
}

impl From<SubscriptionError> for StatusCode {
    fn from(value: SubscriptionError) -> Self {
        match value {
            SubscriptionError::Status(s) => s,
            SubscriptionError::UnknownRequestId(_) => StatusCode::BadUnexpectedError,
            SubscriptionError::InvalidClientState(_) => StatusCode::BadInvalidState,
        }
    }
}
