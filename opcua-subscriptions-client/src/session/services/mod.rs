//! Service builders, grouped the way the teacher groups them by service set.
//! Only the Subscription Service Set is implemented — Read/Write/Browse are
//! out of scope (`spec.md` §1) beyond the thin `RequestKind` slots they
//! occupy in the request-context table.

pub mod subscriptions;
