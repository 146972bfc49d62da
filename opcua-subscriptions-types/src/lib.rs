//! Stand-in OPC UA type library.
//!
//! The binary/XML encoder and the full built-in type library are out of
//! scope for this crate (see the top-level spec) — they are external
//! collaborators here. These types carry the fields the Subscription
//! Service Set needs, named and shaped after OPC UA Part 4, with no codec
//! behaviour attached.

mod data_value;
mod errors;
mod filters;
mod node_id;
mod notification;
mod service_types;
mod status_code;
mod string;
mod variant;

pub use data_value::DataValue;
pub use errors::SubscriptionError;
pub use filters::{
    DataChangeFilter, DataChangeTrigger, Deadband, EventFilter, MonitoringFilter,
};
pub use node_id::{Identifier, NodeId};
pub use notification::{
    EventFieldList, MonitoredItemNotification, NotificationMessage, NotificationMessageBody,
};
pub use service_types::*;
pub use status_code::StatusCode;
pub use string::UAString;
pub use variant::Variant;

/// Timestamps a client asked to have returned on monitored items, per Part 4
/// §7.28.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TimestampsToReturn {
    /// Return only the source timestamp.
    Source,
    /// Return only the server timestamp.
    Server,
    /// Return both timestamps.
    #[default]
    Both,
    /// Return neither timestamp.
    Neither,
}

/// Monitoring mode of a monitored item, per Part 4 §5.12.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MonitoringMode {
    /// The item accumulates no notifications.
    Disabled,
    /// The item accumulates notifications but they are not reported.
    Sampling,
    /// The item accumulates notifications and reports them.
    #[default]
    Reporting,
}

/// A simple localized piece of text: a locale tag plus the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedText {
    /// IETF locale tag, e.g. `en-US`. Empty means no locale specified.
    pub locale: UAString,
    /// The text itself.
    pub text: UAString,
}

impl LocalizedText {
    /// Construct from a plain `&str`, with no locale.
    pub fn new(locale: &str, text: &str) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

impl From<&str> for LocalizedText {
    fn from(value: &str) -> Self {
        Self {
            locale: UAString::null(),
            text: value.into(),
        }
    }
}

/// A qualified name: a namespace index plus a name, per Part 3 §8.3.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// The name.
    pub name: UAString,
}

impl QualifiedName {
    /// Construct a qualified name in namespace 0.
    pub fn new(namespace_index: u16, name: &str) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

/// Wall-clock timestamp, re-exported from `chrono` as the rest of the
/// `async-opcua` stack does.
pub type DateTimeUtc = chrono::DateTime<chrono::Utc>;

/// An opaque byte string used as an `EventId`.
pub type ByteString = Vec<u8>;
