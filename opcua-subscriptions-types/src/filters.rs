use crate::{DataValue, Variant};

/// Which parts of a value change must differ before a data-change
/// notification is produced, per Part 4 §7.17.2.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DataChangeTrigger {
    /// Only the status changing triggers a notification.
    Status,
    /// Status or value changing triggers a notification.
    #[default]
    StatusValue,
    /// Status, value, or either timestamp changing triggers a notification.
    StatusValueTimestamp,
}

/// Deadband applied to a value comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Deadband {
    /// No deadband: any difference counts as a change.
    None,
    /// Absolute deadband: a value must differ by more than this amount.
    Absolute(f64),
}

impl Deadband {
    fn value_changed(&self, before: &Variant, after: &Variant) -> bool {
        match self {
            Deadband::None => before != after,
            Deadband::Absolute(band) => match (as_f64(before), as_f64(after)) {
                (Some(a), Some(b)) => (a - b).abs() > *band,
                _ => before != after,
            },
        }
    }
}

fn as_f64(v: &Variant) -> Option<f64> {
    match v {
        Variant::Double(d) => Some(*d),
        Variant::Int64(i) => Some(*i as f64),
        Variant::UInt64(u) => Some(*u as f64),
        _ => None,
    }
}

/// A data-change filter: the trigger plus the deadband applied to the value
/// comparison, per Part 4 §7.17.2.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChangeFilter {
    /// What must differ to trigger a notification.
    pub trigger: DataChangeTrigger,
    /// Deadband applied when comparing values.
    pub deadband: Deadband,
}

impl Default for Deadband {
    fn default() -> Self {
        Deadband::None
    }
}

impl DataChangeFilter {
    /// Decide whether `after` differs enough from `before` to report,
    /// per this filter's trigger and deadband.
    pub fn is_changed(&self, before: &DataValue, after: &DataValue) -> bool {
        match self.trigger {
            DataChangeTrigger::Status => before.status != after.status,
            DataChangeTrigger::StatusValue => {
                before.status != after.status || self.value_changed(before, after)
            }
            DataChangeTrigger::StatusValueTimestamp => {
                before.status != after.status
                    || self.value_changed(before, after)
                    || before.source_timestamp != after.source_timestamp
            }
        }
    }

    fn value_changed(&self, before: &DataValue, after: &DataValue) -> bool {
        match (&before.value, &after.value) {
            (None, None) => false,
            (Some(_), None) | (None, Some(_)) => true,
            (Some(b), Some(a)) => match (b.as_array(), a.as_array()) {
                (Some(bs), Some(asl)) => {
                    bs.len() != asl.len()
                        || bs
                            .iter()
                            .zip(asl.iter())
                            .any(|(b, a)| self.deadband.value_changed(b, a))
                }
                _ => self.deadband.value_changed(b, a),
            },
        }
    }
}

/// An event filter: which fields to project (`select_clauses`) and which
/// events pass through (`where_clause`), per Part 4 §7.17.3.
///
/// The where-clause is out of scope as a general filter-operator AST (that
/// is address-space/type-system machinery this crate doesn't own); it is
/// represented as an opaque predicate supplied by the caller.
#[derive(Clone)]
pub struct EventFilter {
    /// Qualified-name browse paths of the fields to project into each
    /// `EventFieldList`, in order.
    pub select_clauses: Vec<crate::QualifiedName>,
    /// Predicate deciding whether an event instance passes. `None` means
    /// "always passes" (no where-clause).
    pub where_clause: Option<std::sync::Arc<dyn Fn(&crate::EventFieldList) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("select_clauses", &self.select_clauses)
            .field("where_clause", &self.where_clause.is_some())
            .finish()
    }
}

impl PartialEq for EventFilter {
    fn eq(&self, other: &Self) -> bool {
        self.select_clauses == other.select_clauses
    }
}

/// The filter context attached to a monitored item: either a data-change
/// filter or an event filter, per Part 4 §5.12.1.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitoringFilter {
    /// No filter: every write is reported (`DataChangeTrigger::StatusValue`
    /// is assumed).
    None,
    /// A data-change filter.
    DataChange(DataChangeFilter),
    /// An event filter.
    Event(EventFilter),
}
