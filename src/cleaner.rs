//! The TTL cleaner: a single thread that walks the queue forever, clearing the payload of any
//! entry old enough to be past its time-to-live.

use crate::clock::Timestamp;
use crate::queue::MessageQueue;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Run the cleaner forever. Never returns.
///
/// Walks the queue from the head, clearing each entry's payload once it is older than `ttl`,
/// then blocking on the queue condition for a successor. The timestamp-before-payload read
/// order that makes this safe alongside concurrent workers lives in [`crate::queue::Entry`].
pub fn run(queue: &Arc<MessageQueue>, ttl: Duration) -> ! {
    let mut current = queue.wait_for_first(None).expect("unbounded wait always yields an entry");

    loop {
        if current.has_payload() && current.timestamp.expired_by(ttl, Timestamp::now()) {
            debug!("clearing expired entry");
            current.clear_payload();
        }

        current = queue
            .wait_for_next(&current, None)
            .expect("unbounded wait always yields an entry");
    }
}
