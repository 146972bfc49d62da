//! `NotificationQueue`, `PublishRequestQueue` and `RepublishQueue` — the
//! leaf collections in §4.1/§4.2/§4.4. Capacity and drop policy follow
//! `spec.md` exactly; the overflow-marking rule (§4.2, scenario S3) and the
//! republish deep-copy rule (§4.4) are implemented here rather than in
//! `Subscription` so they can be unit-tested in isolation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use opcua_subscriptions_types::NotificationMessage;

use crate::monitored_item::QueuedNotification;

/// Bounded per-monitored-item queue of data-change or event notifications.
#[derive(Debug)]
pub struct NotificationQueue {
    entries: VecDeque<QueuedNotification>,
    capacity: usize,
    discard_oldest: bool,
    is_event: bool,
    /// Set once an entry has been dropped; cleared once the next popped
    /// entry has been marked, per spec §4.2.
    pending_overflow_mark: bool,
}

impl NotificationQueue {
    /// Construct an empty queue of the given capacity and kind.
    pub fn new(capacity: usize, discard_oldest: bool, is_event: bool) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            discard_oldest,
            is_event,
            pending_overflow_mark: false,
        }
    }

    /// True if this queue holds event notifications rather than data-change ones.
    pub fn is_event_kind(&self) -> bool {
        self.is_event
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no queued entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resize the queue's capacity. Excess entries are dropped from the
    /// front if the new capacity is smaller, per `resize(newSize)` (§4.2).
    pub fn resize(&mut self, new_size: usize) {
        self.capacity = new_size.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.pending_overflow_mark = true;
        }
    }

    /// Change the discard policy applied on future overflow.
    pub fn set_discard_oldest(&mut self, discard_oldest: bool) {
        self.discard_oldest = discard_oldest;
    }

    /// Append an entry. If the queue is full: discard-oldest drops the
    /// head and marks the next pop with overflow; otherwise the new entry
    /// is refused.
    pub fn push(&mut self, entry: QueuedNotification) {
        if self.entries.len() >= self.capacity {
            if self.discard_oldest {
                self.entries.pop_front();
                self.pending_overflow_mark = true;
            } else {
                return;
            }
        }
        self.entries.push_back(entry);
    }

    /// Pop the oldest entry, returning whether it should carry the
    /// overflow marker (true exactly once per drop, per spec §8 invariant 5).
    pub fn pop(&mut self) -> Option<(QueuedNotification, bool)> {
        let entry = self.entries.pop_front()?;
        let overflow = self.pending_overflow_mark;
        self.pending_overflow_mark = false;
        Some((entry, overflow))
    }

    /// Drop all queued entries without marking overflow.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending_overflow_mark = false;
    }
}

/// One pending `Publish` request held by the server awaiting a notification
/// or keep-alive to answer it, per §4.1.
#[derive(Debug)]
pub struct QueuedPublishRequest {
    /// The session that sent this request.
    pub session_id: u32,
    /// Client's request handle, echoed in the response header.
    pub request_handle: u32,
    /// Opaque application context (e.g. a transport response channel).
    pub context: u64,
    /// Monotonic deadline; requests past this are completed with `BadTimeout`.
    pub deadline: DateTime<Utc>,
}

/// FIFO queue of pending publish requests for one subscription.
#[derive(Debug, Default)]
pub struct PublishRequestQueue {
    requests: VecDeque<QueuedPublishRequest>,
}

impl PublishRequestQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a publish request to the tail.
    pub fn append(&mut self, request: QueuedPublishRequest) {
        self.requests.push_back(request);
    }

    /// Put a request back at the head (used when a tick claims one but
    /// cannot complete it, e.g. `OutOfMemory`).
    pub fn prepend_head(&mut self, request: QueuedPublishRequest) {
        self.requests.push_front(request);
    }

    /// Remove and return the oldest pending request.
    pub fn pop_head(&mut self) -> Option<QueuedPublishRequest> {
        self.requests.pop_front()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True if no requests are queued.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Remove and return every request whose deadline has passed, in FIFO
    /// order, for the caller to complete with `BadTimeout`.
    pub fn drain_expired(&mut self, now: DateTime<Utc>) -> Vec<QueuedPublishRequest> {
        let mut expired = Vec::new();
        while let Some(front) = self.requests.front() {
            if front.deadline <= now {
                expired.push(self.requests.pop_front().unwrap());
            } else {
                break;
            }
        }
        expired
    }

    /// Remove and return every queued request, for session-close teardown.
    pub fn drain_all(&mut self) -> Vec<QueuedPublishRequest> {
        self.requests.drain(..).collect()
    }
}

/// Sequence-number-indexed store of previously sent `NotificationMessage`s,
/// for `Republish`. Keyed by `sequence_number`; bounded by
/// `max_republish_notifs_per_sub`.
#[derive(Debug, Default)]
pub struct RepublishQueue {
    entries: VecDeque<NotificationMessage>,
    capacity: usize,
}

impl RepublishQueue {
    /// An empty queue of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store a deep copy of `msg`, evicting the oldest entry if full.
    pub fn add(&mut self, msg: NotificationMessage) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(msg);
    }

    /// Look up a previously sent message by sequence number.
    pub fn find(&self, seq: u32) -> Option<&NotificationMessage> {
        self.entries.iter().find(|m| m.sequence_number == seq)
    }

    /// Remove a message by sequence number (on ack).
    pub fn remove(&mut self, seq: u32) {
        self.entries.retain(|m| m.sequence_number != seq);
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drop every retained message (subscription close).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_oldest_marks_next_pop_overflow() {
        let mut q = NotificationQueue::new(2, true, false);
        q.push(QueuedNotification::Event(vec![]));
        q.push(QueuedNotification::Event(vec![]));
        q.push(QueuedNotification::Event(vec![])); // drops first, marks overflow
        let (_, overflow1) = q.pop().unwrap();
        assert!(overflow1);
        let (_, overflow2) = q.pop().unwrap();
        assert!(!overflow2);
    }

    #[test]
    fn discard_newest_refuses_append_when_full() {
        let mut q = NotificationQueue::new(1, false, false);
        q.push(QueuedNotification::Event(vec![]));
        q.push(QueuedNotification::Event(vec![]));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn s4_scenario_overflow_pops_oldest() {
        let mut q = PublishRequestQueue::new();
        let now = Utc::now();
        for i in 0..3 {
            q.append(QueuedPublishRequest {
                session_id: 1,
                request_handle: i,
                context: 0,
                deadline: now + chrono::Duration::seconds(30),
            });
        }
        assert_eq!(q.len(), 3);
        let dropped = q.pop_head().unwrap();
        assert_eq!(dropped.request_handle, 0);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn republish_queue_evicts_oldest_on_overflow() {
        let mut rq = RepublishQueue::new(2);
        let now = Utc::now();
        rq.add(NotificationMessage::keep_alive(1, now));
        rq.add(NotificationMessage::keep_alive(2, now));
        rq.add(NotificationMessage::keep_alive(3, now));
        assert!(rq.find(1).is_none());
        assert!(rq.find(2).is_some());
        assert!(rq.find(3).is_some());
    }
}
