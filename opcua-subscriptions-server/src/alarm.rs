//! The `AlarmCondition` overlay, spec §3/§4.8, supplemented per
//! `SPEC_FULL.md` §F.1–§F.3 with the `EventId` recall ring,
//! `ConditionRefresh`/`ConditionRefresh2` and `AddComment`, recovered from
//! `libs2opc_server_alarm_conditions.h` and `demo_server_alarms_mgr.c`.
//!
//! Conditions ride on the same notification path as ordinary events: a
//! "significant" state change is reported by calling
//! [`SubscriptionCache::event`] with the condition's current state
//! variables projected into fields, exactly like any other event source.

use std::collections::VecDeque;

use opcua_subscriptions_types::{ByteString, LocalizedText, NodeId, QualifiedName, StatusCode, Variant};

use crate::engine::SubscriptionCache;

/// One well-known alarm state variable: a boolean/enumerated Id plus its
/// display text, per Part 9 §5.8.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionStateVariable {
    /// The raw state value.
    pub id: bool,
    /// Localized display text for the state.
    pub text: LocalizedText,
}

impl ConditionStateVariable {
    fn new(id: bool, true_text: &str, false_text: &str) -> Self {
        Self {
            id,
            text: if id {
                LocalizedText::from(true_text)
            } else {
                LocalizedText::from(false_text)
            },
        }
    }
}

/// One alarm condition instance, overlaying an event source with the
/// Enabled/Active/Acked/Confirmed/Retain state machine of Part 9 §5.8.
pub struct AlarmConditionInstance {
    notifier_node_id: NodeId,
    condition_node_id: NodeId,
    enabled: bool,
    active: ConditionStateVariable,
    acked: ConditionStateVariable,
    confirmed: ConditionStateVariable,
    retain: bool,
    severity: u16,
    last_severity: u16,
    comment: LocalizedText,
    client_user_id: String,
    auto_acknowledgeable: bool,
    auto_confirmable: bool,
    auto_retain: bool,
    /// Recallable `EventId` ring; oldest is forgotten first once full, per
    /// `SPEC_FULL.md` §F.1.
    event_ids: VecDeque<ByteString>,
    max_event_ids: usize,
    next_event_id: u64,
}

impl AlarmConditionInstance {
    /// Construct a new, disabled, inactive condition.
    pub fn new(notifier_node_id: NodeId, condition_node_id: NodeId, max_event_ids: usize) -> Self {
        Self {
            notifier_node_id,
            condition_node_id,
            enabled: false,
            active: ConditionStateVariable::new(false, "Active", "Inactive"),
            acked: ConditionStateVariable::new(true, "Acknowledged", "Unacknowledged"),
            confirmed: ConditionStateVariable::new(true, "Confirmed", "Unconfirmed"),
            retain: false,
            severity: 0,
            last_severity: 0,
            comment: LocalizedText::default(),
            client_user_id: String::new(),
            auto_acknowledgeable: false,
            auto_confirmable: false,
            auto_retain: false,
            event_ids: VecDeque::new(),
            max_event_ids: max_event_ids.max(1),
            next_event_id: 1,
        }
    }

    /// Opt this condition's Ack transitions into automatic handling, per
    /// `SOPC_AlarmCondition_SetAutoAcknowledgeable`.
    pub fn set_auto_acknowledgeable(&mut self) {
        self.auto_acknowledgeable = true;
    }

    /// Opt this condition's Confirm transitions into automatic handling.
    pub fn set_auto_confirmable(&mut self) {
        self.auto_confirmable = true;
    }

    /// Opt Retain into being forced true whenever the condition is
    /// significant, even once `Active` returns to false.
    pub fn set_auto_retain(&mut self) {
        self.auto_retain = true;
    }

    /// Current `Active` state.
    pub fn is_active(&self) -> bool {
        self.active.id
    }

    /// Current `Acked` state.
    pub fn is_acked(&self) -> bool {
        self.acked.id
    }

    /// Current `Confirmed` state.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed.id
    }

    /// Current `Retain` flag.
    pub fn retain(&self) -> bool {
        self.retain
    }

    fn recompute_retain(&mut self) {
        self.retain = self.enabled && (self.active.id || !self.acked.id || !self.confirmed.id || self.auto_retain);
    }

    /// Enable the condition. Disabled -> Enabled may immediately re-activate
    /// if `source_active` is already true, per spec §4.8.
    pub fn set_enabled(&mut self, enabled: bool, source_active: bool, cache: &SubscriptionCache) {
        self.enabled = enabled;
        if !enabled {
            self.retain = false;
            self.active = ConditionStateVariable::new(false, "Active", "Inactive");
            self.acked = ConditionStateVariable::new(true, "Acknowledged", "Unacknowledged");
            self.confirmed = ConditionStateVariable::new(true, "Confirmed", "Unconfirmed");
        } else if source_active {
            self.set_active(true, cache);
            return;
        }
        self.emit(cache);
    }

    /// Drive the condition's `Active` state from the underlying source
    /// value, applying AutoAcknowledgeable/AutoConfirmable per spec §4.8 and
    /// scenario S6.
    pub fn set_active(&mut self, active: bool, cache: &SubscriptionCache) {
        if !self.enabled || self.active.id == active {
            return;
        }
        self.active = ConditionStateVariable::new(active, "Active", "Inactive");
        if active {
            if self.auto_acknowledgeable {
                self.acked = ConditionStateVariable::new(false, "Acknowledged", "Unacknowledged");
                if self.auto_confirmable {
                    self.confirmed = ConditionStateVariable::new(true, "Confirmed", "Unconfirmed");
                }
            }
        }
        self.recompute_retain();
        self.emit(cache);
    }

    /// Handle the `Acknowledge` method, Part 9 §5.9.2. Requires the given
    /// `event_id` to still be in the recall ring.
    pub fn acknowledge(&mut self, event_id: &[u8], cache: &SubscriptionCache) -> StatusCode {
        if !self.enabled {
            return StatusCode::BadConditionDisabled;
        }
        if !self.event_ids.iter().any(|id| id == event_id) {
            return StatusCode::BadEventIdUnknown;
        }
        if self.acked.id {
            return StatusCode::Bad;
        }
        self.acked = ConditionStateVariable::new(true, "Acknowledged", "Unacknowledged");
        if self.auto_confirmable {
            self.confirmed = ConditionStateVariable::new(false, "Confirmed", "Unconfirmed");
        }
        self.recompute_retain();
        self.emit(cache);
        StatusCode::Good
    }

    /// Handle the `Confirm` method, Part 9 §5.9.3.
    pub fn confirm(&mut self, event_id: &[u8], cache: &SubscriptionCache) -> StatusCode {
        if !self.enabled {
            return StatusCode::BadConditionDisabled;
        }
        if !self.event_ids.iter().any(|id| id == event_id) {
            return StatusCode::BadEventIdUnknown;
        }
        if self.confirmed.id {
            return StatusCode::Bad;
        }
        self.confirmed = ConditionStateVariable::new(true, "Confirmed", "Unconfirmed");
        self.recompute_retain();
        self.emit(cache);
        StatusCode::Good
    }

    /// Handle `AddComment`, `SPEC_FULL.md` §F.3 — present in the original's
    /// method handler table alongside `Acknowledge`/`Confirm` but never
    /// named in the distilled spec's operation list.
    pub fn add_comment(&mut self, event_id: &[u8], comment: LocalizedText, cache: &SubscriptionCache) -> StatusCode {
        if !self.event_ids.iter().any(|id| id == event_id) {
            return StatusCode::BadEventIdUnknown;
        }
        self.comment = comment;
        self.emit(cache);
        StatusCode::Good
    }

    /// Set the condition's severity, retaining the previous value as
    /// `LastSeverity` per Part 9 §5.8.2.
    pub fn set_severity(&mut self, severity: u16, cache: &SubscriptionCache) {
        self.last_severity = self.severity;
        self.severity = severity;
        self.emit(cache);
    }

    fn fresh_event_id(&mut self) -> ByteString {
        let id = self.next_event_id;
        self.next_event_id += 1;
        if self.event_ids.len() >= self.max_event_ids {
            self.event_ids.pop_front();
        }
        let bytes = id.to_be_bytes().to_vec();
        self.event_ids.push_back(bytes.clone());
        bytes
    }

    fn fields(&self, event_id: &[u8]) -> Vec<(QualifiedName, Variant)> {
        vec![
            (QualifiedName::new(0, "EventId"), Variant::String(hex(event_id))),
            (QualifiedName::new(0, "ConditionId"), Variant::String(self.condition_node_id.to_string())),
            (QualifiedName::new(0, "Retain"), Variant::Boolean(self.retain)),
            (QualifiedName::new(0, "ActiveState/Id"), Variant::Boolean(self.active.id)),
            (QualifiedName::new(0, "AckedState/Id"), Variant::Boolean(self.acked.id)),
            (QualifiedName::new(0, "ConfirmedState/Id"), Variant::Boolean(self.confirmed.id)),
            (QualifiedName::new(0, "Severity"), Variant::Int64(self.severity as i64)),
            (QualifiedName::new(0, "Comment"), Variant::String(self.comment.text.to_string())),
        ]
    }

    /// Stamp a fresh `EventId` and push this condition's current state as an
    /// event through `cache`, per `SPEC_FULL.md` §F.1. Exposed crate-wide so
    /// `ConditionRefresh` (`SPEC_FULL.md` §F.2) can force a replay.
    pub(crate) fn emit(&mut self, cache: &SubscriptionCache) {
        let event_id = self.fresh_event_id();
        let fields = self.fields(&event_id);
        cache.event(&self.notifier_node_id, &fields);
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_subscriptions_types::Identifier;

    use crate::config::SubscriptionLimits;

    fn node(n: u32) -> NodeId {
        NodeId {
            namespace: 1,
            identifier: Identifier::Numeric(n),
        }
    }

    #[test]
    fn auto_ack_then_confirm_flow_matches_s6_state_values() {
        // Exercises the same Enabled/Active/Acked/Confirmed/Retain values as
        // scenario S6; `Active` here transitions immediately on `set_active`
        // rather than staying pinned true until `Confirm` (see DESIGN.md).
        let cache = SubscriptionCache::new(SubscriptionLimits::default());
        let mut alarm = AlarmConditionInstance::new(node(1), node(2), 10);
        alarm.set_auto_acknowledgeable();
        alarm.set_auto_confirmable();
        alarm.set_enabled(true, false, &cache);

        alarm.set_active(true, &cache);
        assert!(alarm.is_active());
        assert!(!alarm.is_acked());
        assert!(alarm.is_confirmed());

        let event_id = alarm.event_ids.back().unwrap().clone();
        assert_eq!(alarm.acknowledge(&event_id, &cache), StatusCode::Good);
        assert!(alarm.is_acked());
        assert!(!alarm.is_confirmed());

        alarm.set_active(false, &cache);
        assert!(!alarm.is_active());

        let event_id2 = alarm.event_ids.back().unwrap().clone();
        assert_eq!(alarm.confirm(&event_id2, &cache), StatusCode::Good);
        assert!(alarm.is_confirmed());
        assert!(!alarm.retain());
    }

    #[test]
    fn unknown_event_id_is_rejected() {
        let cache = SubscriptionCache::new(SubscriptionLimits::default());
        let mut alarm = AlarmConditionInstance::new(node(1), node(2), 10);
        alarm.set_enabled(true, false, &cache);
        assert_eq!(alarm.acknowledge(b"bogus", &cache), StatusCode::BadEventIdUnknown);
    }

    #[test]
    fn recall_ring_forgets_oldest_event_id() {
        let cache = SubscriptionCache::new(SubscriptionLimits::default());
        let mut alarm = AlarmConditionInstance::new(node(1), node(2), 2);
        alarm.set_enabled(true, false, &cache);
        let first = alarm.fresh_event_id();
        alarm.fresh_event_id();
        alarm.fresh_event_id();
        assert!(!alarm.event_ids.contains(&first));
    }
}
