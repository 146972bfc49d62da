use crate::{data_value::DataValue, variant::Variant, DateTimeUtc};

/// One data-change record inside a `DataChangeNotification`, per Part 4
/// §7.25.3. `client_handle` is the opaque handle the client gave
/// `CreateMonitoredItems` for this item — it, not the server's monitored
/// item id, is what the client uses to dispatch the notification.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemNotification {
    /// The client handle of the monitored item this notification is for.
    pub client_handle: u32,
    /// The value, already filtered per the item's `TimestampsToReturn`.
    pub value: DataValue,
}

/// An ordered tuple of field values, one per `select_clause`, produced by an
/// event notification, per Part 4 §7.25.2.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventFieldList {
    /// The client handle of the monitored item this event is for.
    pub client_handle: u32,
    /// Field values, in `select_clauses` order.
    pub event_fields: Vec<Variant>,
}

/// The payload of a `NotificationMessage`: either a batch of data changes or
/// a batch of events. A single message never mixes the two at the wire
/// level (Part 4 §7.25.1's `NotificationData` union) even though a
/// subscription may have both kinds of monitored items; the engine sends one
/// `DataChange` and, if there are any, one additional `Event` body, both
/// carried by the same `NotificationMessage` (its `notification_data` list).
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationMessageBody {
    /// Changed monitored-item values.
    DataChange(Vec<MonitoredItemNotification>),
    /// Event occurrences.
    Event(Vec<EventFieldList>),
}

/// A sequence-numbered batch of notifications sent in a `Publish` response,
/// or an empty one used as a keep-alive, per Part 4 §7.25.1.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// Monotonically increasing per subscription; wraps `2^32-1 -> 1`
    /// (0 is never used).
    pub sequence_number: u32,
    /// When the server assembled this message.
    pub publish_time: DateTimeUtc,
    /// Notification bodies. Empty for a keep-alive message.
    pub notification_data: Vec<NotificationMessageBody>,
}

impl NotificationMessage {
    /// Construct an empty keep-alive message carrying the given sequence
    /// number (the *next* number to be used, per Part 4 §7.25.1 Note 1 — a
    /// keep-alive does not consume a sequence number).
    pub fn keep_alive(sequence_number: u32, publish_time: DateTimeUtc) -> Self {
        Self {
            sequence_number,
            publish_time,
            notification_data: Vec::new(),
        }
    }

    /// True if this message carries no notifications (a keep-alive).
    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }

    /// Total count of individual notifications across all bodies, used to
    /// enforce `max_notifications_per_publish`.
    pub fn notification_count(&self) -> usize {
        self.notification_data
            .iter()
            .map(|b| match b {
                NotificationMessageBody::DataChange(v) => v.len(),
                NotificationMessageBody::Event(v) => v.len(),
            })
            .sum()
    }
}
