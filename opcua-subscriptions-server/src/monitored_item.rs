//! A single monitored item: target, filter, mode and its own notification
//! queue. Grounded on `spec.md` §3/§4.2/§4.4's `MonitoredItem` data model
//! and the sampling-interval supplement in `SPEC_FULL.md` §F.4.

use chrono::{DateTime, Utc};
use opcua_subscriptions_types::{
    DataChangeFilter, DataValue, MonitoredItemNotification, MonitoringFilter, MonitoringMode,
    NodeId, QualifiedName, StatusCode, TimestampsToReturn, Variant,
};

use crate::queue::NotificationQueue;

/// One queued notification before it is assembled into a `PublishResponse`
/// body: a data-change record or a projected event-field list.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedNotification {
    /// A value change, already timestamp-filtered.
    DataChange(DataValue),
    /// A projected event-field tuple, in `select_clauses` order.
    Event(Vec<Variant>),
}

/// Server-side monitored item, identified by a 32-bit id unique within its
/// owning subscription.
#[derive(Debug)]
pub struct MonitoredItem {
    id: u32,
    subscription_id: u32,
    node_id: NodeId,
    attribute_id: u32,
    timestamps_to_return: TimestampsToReturn,
    monitoring_mode: MonitoringMode,
    client_handle: u32,
    filter: MonitoringFilter,
    /// Independent of the subscription's publishing interval; 0 means "as
    /// fast as the source reports" (`SPEC_FULL.md` §F.4).
    sampling_interval: f64,
    queue: NotificationQueue,
    last_value: Option<DataValue>,
    triggered_items: Vec<u32>,
}

impl MonitoredItem {
    /// Construct a new monitored item with an empty queue.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        subscription_id: u32,
        node_id: NodeId,
        attribute_id: u32,
        timestamps_to_return: TimestampsToReturn,
        monitoring_mode: MonitoringMode,
        client_handle: u32,
        filter: MonitoringFilter,
        sampling_interval: f64,
        queue_size: u32,
        discard_oldest: bool,
        is_event: bool,
    ) -> Self {
        Self {
            id,
            subscription_id,
            node_id,
            attribute_id,
            timestamps_to_return,
            monitoring_mode,
            client_handle,
            filter,
            sampling_interval,
            queue: NotificationQueue::new(queue_size.max(1) as usize, discard_oldest, is_event),
            last_value: None,
            triggered_items: Vec::new(),
        }
    }

    /// This item's id, unique within its subscription.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The subscription that owns this item.
    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    /// The node this item targets.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The attribute this item targets.
    pub fn attribute_id(&self) -> u32 {
        self.attribute_id
    }

    /// Current monitoring mode.
    pub fn monitoring_mode(&self) -> MonitoringMode {
        self.monitoring_mode
    }

    /// Revised sampling interval, per `SPEC_FULL.md` §F.4.
    pub fn sampling_interval(&self) -> f64 {
        self.sampling_interval
    }

    /// Client handle echoed in every notification for this item.
    pub fn client_handle(&self) -> u32 {
        self.client_handle
    }

    /// Monitored item ids that fire when this item reports, per
    /// `SPEC_FULL.md` §F.5 (`SetTriggering`).
    pub fn triggered_items(&self) -> &[u32] {
        &self.triggered_items
    }

    /// Add links to the triggered-item list, skipping ones already present.
    pub fn add_triggering_links(&mut self, links: &[u32]) {
        for &link in links {
            if !self.triggered_items.contains(&link) {
                self.triggered_items.push(link);
            }
        }
    }

    /// Remove links from the triggered-item list.
    pub fn remove_triggering_links(&mut self, links: &[u32]) {
        self.triggered_items.retain(|id| !links.contains(id));
    }

    /// Change the monitoring mode, per Part 4 §5.12.5. Disabling clears the
    /// queue (spec §3: "when mode = Disabled no notifications accumulate").
    pub fn set_monitoring_mode(&mut self, mode: MonitoringMode) {
        self.monitoring_mode = mode;
        if mode == MonitoringMode::Disabled {
            self.queue.clear();
        }
    }

    /// Apply `ModifyMonitoredItems` parameters, returning the revised
    /// sampling interval and queue size.
    pub fn modify(
        &mut self,
        timestamps_to_return: TimestampsToReturn,
        filter: MonitoringFilter,
        sampling_interval: f64,
        queue_size: u32,
        discard_oldest: bool,
    ) -> (f64, u32) {
        self.timestamps_to_return = timestamps_to_return;
        self.filter = filter;
        self.sampling_interval = sampling_interval;
        let revised_size = queue_size.max(1);
        self.queue.resize(revised_size as usize);
        self.queue.set_discard_oldest(discard_oldest);
        (self.sampling_interval, revised_size)
    }

    /// Feed an externally observed value change through this item's filter.
    /// Returns `true` if a notification was queued. No-op when disabled;
    /// queues silently when sampling (spec §3).
    pub fn on_value_change(&mut self, value: DataValue) -> bool {
        if self.monitoring_mode == MonitoringMode::Disabled {
            return false;
        }
        let changed = match &self.filter {
            MonitoringFilter::None => self.last_value.as_ref().map_or(true, |before| {
                DataChangeFilter::default().is_changed(before, &value)
            }),
            MonitoringFilter::DataChange(f) => self
                .last_value
                .as_ref()
                .map_or(true, |before| f.is_changed(before, &value)),
            MonitoringFilter::Event(_) => false,
        };
        if !changed {
            return false;
        }
        self.last_value = Some(value.clone());
        let filtered = value.filtered_by(self.timestamps_to_return);
        self.queue
            .push(QueuedNotification::DataChange(filtered));
        true
    }

    /// Feed an externally emitted event through this item's event filter.
    /// Returns `true` if the event passed the where-clause and was queued.
    pub fn on_event(&mut self, fields_by_name: &[(QualifiedName, Variant)]) -> bool {
        if self.monitoring_mode == MonitoringMode::Disabled {
            return false;
        }
        let MonitoringFilter::Event(filter) = &self.filter else {
            return false;
        };
        let projected: Vec<Variant> = filter
            .select_clauses
            .iter()
            .map(|qn| {
                fields_by_name
                    .iter()
                    .find(|(name, _)| name == qn)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Variant::Empty)
            })
            .collect();
        let field_list = opcua_subscriptions_types::EventFieldList {
            client_handle: self.client_handle,
            event_fields: projected.clone(),
        };
        if let Some(predicate) = &filter.where_clause {
            if !predicate(&field_list) {
                return false;
            }
        }
        self.queue.push(QueuedNotification::Event(projected));
        true
    }

    /// Number of queued-but-unreported notifications.
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// True if this item only reports (mode = Reporting); Sampling items
    /// accumulate but must not be drained into a publish.
    pub fn is_reporting(&self) -> bool {
        self.monitoring_mode == MonitoringMode::Reporting
    }

    /// True if this item's queue holds events rather than data-change values.
    pub fn is_event_kind(&self) -> bool {
        self.queue.is_event_kind()
    }

    /// Drain up to `max` queued notifications as `MonitoredItemNotification`s
    /// (data-change items only).
    pub fn drain_data_change(&mut self, max: usize, now: DateTime<Utc>) -> Vec<MonitoredItemNotification> {
        let _ = now;
        let mut out = Vec::new();
        while out.len() < max {
            let Some((entry, overflow)) = self.queue.pop() else {
                break;
            };
            if let QueuedNotification::DataChange(mut dv) = entry {
                if overflow {
                    dv.status = StatusCode::Uncertain;
                }
                out.push(MonitoredItemNotification {
                    client_handle: self.client_handle,
                    value: dv,
                });
            }
        }
        out
    }

    /// Drain up to `max` queued event notifications as
    /// `EventFieldList`s.
    pub fn drain_events(&mut self, max: usize) -> Vec<opcua_subscriptions_types::EventFieldList> {
        let mut out = Vec::new();
        while out.len() < max {
            let Some((entry, _overflow)) = self.queue.pop() else {
                break;
            };
            if let QueuedNotification::Event(fields) = entry {
                out.push(opcua_subscriptions_types::EventFieldList {
                    client_handle: self.client_handle,
                    event_fields: fields,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_subscriptions_types::Identifier;

    fn item(queue_size: u32, discard_oldest: bool) -> MonitoredItem {
        MonitoredItem::new(
            1,
            1,
            NodeId {
                namespace: 1,
                identifier: Identifier::Numeric(42),
            },
            13,
            TimestampsToReturn::Both,
            MonitoringMode::Reporting,
            77,
            MonitoringFilter::None,
            0.0,
            queue_size,
            discard_oldest,
            false,
        )
    }

    #[test]
    fn disabled_item_drops_writes() {
        let mut mi = item(4, true);
        mi.set_monitoring_mode(MonitoringMode::Disabled);
        let now = Utc::now();
        assert!(!mi.on_value_change(DataValue::new_now(Variant::Int64(1), now)));
        assert_eq!(mi.queued_count(), 0);
    }

    #[test]
    fn s3_scenario_overflow_marks_first_surviving_entry() {
        let mut mi = item(4, true);
        let now = Utc::now();
        for v in 1..=6i64 {
            mi.on_value_change(DataValue::new_now(Variant::Int64(v), now));
        }
        let drained = mi.drain_data_change(10, now);
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0].value.status, StatusCode::Uncertain);
        for n in &drained[1..] {
            assert_eq!(n.value.status, StatusCode::Good);
        }
    }
}
