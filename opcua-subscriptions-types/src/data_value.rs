use crate::{status_code::StatusCode, variant::Variant, DateTimeUtc};

/// A value with its quality and timestamps, per Part 4 §7.7.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value itself.
    pub value: Option<Variant>,
    /// The quality of the value.
    pub status: StatusCode,
    /// When the value was obtained from its source.
    pub source_timestamp: Option<DateTimeUtc>,
    /// When the server last processed the value.
    pub server_timestamp: Option<DateTimeUtc>,
}

impl DataValue {
    /// Construct a good-quality value stamped with both timestamps.
    pub fn new_now(value: Variant, now: DateTimeUtc) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::Good,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Drop the timestamps this monitored item's `TimestampsToReturn` says
    /// the client didn't ask for, per Part 4 §7.28.
    pub fn filtered_by(&self, ttr: crate::TimestampsToReturn) -> Self {
        use crate::TimestampsToReturn as T;
        let mut out = self.clone();
        match ttr {
            T::Source => out.server_timestamp = None,
            T::Server => out.source_timestamp = None,
            T::Both => {}
            T::Neither => {
                out.server_timestamp = None;
                out.source_timestamp = None;
            }
        }
        out
    }
}
