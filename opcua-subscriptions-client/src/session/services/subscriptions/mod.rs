//! The Subscription Service Set client surface: request builders plus the
//! local subscription cache they update.

pub mod service;
pub mod state;

pub use service::{
    CreateMonitoredItems, CreateSubscription, DeleteMonitoredItems, DeleteSubscriptions,
    ModifyMonitoredItems, ModifySubscription, SetMonitoringMode, SetPublishingMode,
    SetTriggering, TransferSubscriptions,
};
pub use state::{ClientMonitoredItem, ClientSubscription, OnSubscriptionNotification, PublishLimits, SubscriptionState};
