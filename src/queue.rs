//! An append-only, singly-linked FIFO of queue entries.
//!
//! Entries are never unlinked: every worker thread holds a cursor (`Arc<Entry>`) into the
//! queue, so removing a node out from under a cursor would require epoch-based reclamation.
//! Instead the TTL cleaner only clears an entry's payload (see [`cleaner`](crate::cleaner)),
//! leaving the link structure permanent for the life of the process.

use crate::clock::Timestamp;
use crate::codec::Message;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

/// One link in the queue: a timestamp, a payload slot the cleaner may clear, a per-worker
/// sent-bitmask, and a forward link to the next entry (written once, under the queue mutex).
pub struct Entry {
    pub timestamp: Timestamp,
    payload: RwLock<Option<Message>>,
    sent: RwLock<u64>,
    next: Mutex<Option<Arc<Entry>>>,
}

impl Entry {
    fn new(message: Message) -> Self {
        Entry {
            timestamp: Timestamp::now(),
            payload: RwLock::new(Some(message)),
            sent: RwLock::new(0),
            next: Mutex::new(None),
        }
    }

    /// True iff worker slot `index` has already handled this entry.
    pub fn is_sent(&self, index: usize) -> bool {
        *self.sent.read().unwrap() & (1 << index) != 0
    }

    /// Mark (or unmark) worker slot `index` as having handled this entry.
    pub fn set_sent(&self, index: usize, val: bool) {
        let mut mask = self.sent.write().unwrap();
        if val {
            *mask |= 1 << index;
        } else {
            *mask &= !(1 << index);
        }
    }

    /// An entry is forwardable to a given receiver iff it arrived after the receiver
    /// connected and that worker slot hasn't already handled it. The timestamp comparison is
    /// evaluated first so that an entry whose payload the cleaner has since cleared is never
    /// read: if it's old enough to be cleaned, no live receiver can still have an earlier
    /// connection timestamp (see the TTL safety argument in the cleaner module).
    pub fn can_forward(&self, index: usize, receiver_ts: Timestamp) -> bool {
        self.timestamp > receiver_ts && !self.is_sent(index)
    }

    /// Borrow the payload, if the cleaner hasn't cleared it yet.
    pub fn with_payload<T>(&self, f: impl FnOnce(&Message) -> T) -> Option<T> {
        self.payload.read().unwrap().as_ref().map(f)
    }

    /// Clear the payload. Called only by the TTL cleaner.
    pub fn clear_payload(&self) {
        *self.payload.write().unwrap() = None;
    }

    pub fn has_payload(&self) -> bool {
        self.payload.read().unwrap().is_some()
    }
}

#[derive(Default)]
struct QueueState {
    head: Option<Arc<Entry>>,
    tail: Option<Arc<Entry>>,
}

/// The shared message queue. Cheap to clone (`Arc` internally via [`MessageQueue::append`]
/// callers sharing one instance behind an `Arc`).
pub struct MessageQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl MessageQueue {
    pub fn new() -> Self {
        MessageQueue {
            state: Mutex::new(QueueState::default()),
            cond: Condvar::new(),
        }
    }

    /// Append a newly-parsed message to the tail, waking every thread blocked on "queue has a
    /// successor now".
    pub fn append(&self, message: Message) -> Arc<Entry> {
        let entry = Arc::new(Entry::new(message));
        let mut state = self.state.lock().unwrap();
        match state.tail.take() {
            Some(old_tail) => {
                *old_tail.next.lock().unwrap() = Some(entry.clone());
            }
            None => {
                state.head = Some(entry.clone());
            }
        }
        state.tail = Some(entry.clone());
        drop(state);
        self.cond.notify_all();
        entry
    }

    pub fn first(&self) -> Option<Arc<Entry>> {
        self.state.lock().unwrap().head.clone()
    }

    pub fn next(&self, entry: &Arc<Entry>) -> Option<Arc<Entry>> {
        entry.next.lock().unwrap().clone()
    }

    /// Block until the queue has a first entry (or `timeout` elapses), tolerating spurious
    /// wakeups via a predicate loop.
    pub fn wait_for_first(&self, timeout: Option<Duration>) -> Option<Arc<Entry>> {
        let state = self.state.lock().unwrap();
        match timeout {
            None => {
                let state = self
                    .cond
                    .wait_while(state, |s| s.head.is_none())
                    .unwrap();
                state.head.clone()
            }
            Some(d) => {
                let (state, _) = self
                    .cond
                    .wait_timeout_while(state, d, |s| s.head.is_none())
                    .unwrap();
                state.head.clone()
            }
        }
    }

    /// Block until `after` has a successor (or `timeout` elapses). `append` always takes
    /// `self.state`'s lock before writing a predecessor's link and before `notify_all`, so
    /// holding that same lock across the predicate check and the wait is enough to avoid
    /// missing a concurrent append (no race window between "check" and "sleep").
    pub fn wait_for_next(&self, after: &Arc<Entry>, timeout: Option<Duration>) -> Option<Arc<Entry>> {
        let state = self.state.lock().unwrap();
        match timeout {
            None => {
                let _ = self
                    .cond
                    .wait_while(state, |_| after.next.lock().unwrap().is_none())
                    .unwrap();
            }
            Some(d) => {
                let _ = self
                    .cond
                    .wait_timeout_while(state, d, |_| after.next.lock().unwrap().is_none())
                    .unwrap();
            }
        }
        self.next(after)
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
