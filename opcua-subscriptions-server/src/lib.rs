// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

#![warn(missing_docs)]

//! Server-side half of the Subscription Service Set: the `Subscription`
//! lifecycle state machine, monitored-item queues, the republish queue and
//! the [`SubscriptionCache`] that hosts all of it, plus the `AlarmCondition`
//! overlay that rides on the same notification path.
//!
//! Address-space storage, transport and the binary/XML codec are external
//! collaborators; this crate only ever sees a `NodeId`/`DataValue` pushed in
//! by the caller and a `NotificationMessage` handed back out.

mod alarm;
mod config;
mod engine;
mod monitored_item;
mod queue;
mod subscription;

pub use alarm::{AlarmConditionInstance, ConditionStateVariable};
pub use config::SubscriptionLimits;
pub use engine::{EngineEvent, ServerSubscriptionEngine, SubscriptionCache};
pub use monitored_item::MonitoredItem;
pub use queue::{NotificationQueue, PublishRequestQueue, QueuedPublishRequest, RepublishQueue};
pub use subscription::{Subscription, SubscriptionState};

/// Logs a line prefixed with a subscription's id, mirroring the teacher's
/// `session_warn!` family.
#[macro_export]
macro_rules! sub_trace {
    ($sub_id:expr, $msg:expr) => {
        log::trace!("sub:{} {}", $sub_id, $msg)
    };
    ($sub_id:expr, $fmt:expr, $($arg:tt)*) => {
        log::trace!(concat!("sub:{} ", $fmt), $sub_id, $($arg)*)
    };
}

/// See [`sub_trace!`].
#[macro_export]
macro_rules! sub_debug {
    ($sub_id:expr, $msg:expr) => {
        log::debug!("sub:{} {}", $sub_id, $msg)
    };
    ($sub_id:expr, $fmt:expr, $($arg:tt)*) => {
        log::debug!(concat!("sub:{} ", $fmt), $sub_id, $($arg)*)
    };
}

/// See [`sub_trace!`].
#[macro_export]
macro_rules! sub_warn {
    ($sub_id:expr, $msg:expr) => {
        log::warn!("sub:{} {}", $sub_id, $msg)
    };
    ($sub_id:expr, $fmt:expr, $($arg:tt)*) => {
        log::warn!(concat!("sub:{} ", $fmt), $sub_id, $($arg)*)
    };
}
