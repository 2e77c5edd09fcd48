//! The destination dispatcher and the per-receiver worker loop it spawns and wakes.

use crate::cli::Config;
use crate::clock::Timestamp;
use crate::codec;
use crate::error::BrokerError;
use crate::net;
use crate::pool::{SlotTransition, WorkerPool};
use crate::queue::{Entry, MessageQueue};
use log::{debug, error, info};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Run the destination dispatcher forever: accept receivers, assign each to an idle worker
/// slot (spawning a thread on first activation, waking a parked one otherwise).
pub fn run(
    config: &Config,
    queue: &Arc<MessageQueue>,
    pool: &Arc<WorkerPool>,
) -> Result<(), BrokerError> {
    let addr = format!("0.0.0.0:{}", config.dest_port).parse().unwrap();
    let listener: TcpListener =
        net::listen(addr, config.backlog).map_err(|source| BrokerError::Bind { addr, source })?;
    info!("destination listener bound on {addr}");

    loop {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                error!("destination accept failed: {e}");
                continue;
            }
        };
        let connected_at = Timestamp::now();
        info!("receiver connected from {peer}");

        let index = find_idle_with_backoff(pool);
        match pool.assign(index, stream, connected_at) {
            SlotTransition::SpawnWorker => {
                let queue = queue.clone();
                let pool = pool.clone();
                std::thread::spawn(move || worker_loop(index, queue, pool));
            }
            SlotTransition::Woken => {
                debug!("slot {index} woken for new receiver");
            }
        }
    }
}

fn find_idle_with_backoff(pool: &WorkerPool) -> usize {
    let mut delay = INITIAL_BACKOFF;
    loop {
        if let Some(index) = pool.find_idle() {
            return index;
        }
        error!("no idle worker slot available, retrying in {delay:?}");
        std::thread::sleep(delay);
        delay *= 2;
    }
}

/// The body of a single worker slot's thread: walk the queue from a cursor, forwarding
/// eligible entries to whichever receiver currently owns the slot.
///
/// `current`/`prev` survive a receiver disconnect/reconnect cycle unchanged: per step 7, a
/// newly-assigned receiver on this slot does *not* rewind the cursor to the queue head. Only
/// its (fresh, later) connection timestamp and the per-entry sent-bit reset make `can_forward`
/// correctly skip everything the new receiver isn't eligible for.
fn worker_loop(index: usize, queue: Arc<MessageQueue>, pool: Arc<WorkerPool>) {
    let (mut stream, mut receiver_ts) = pool.slot(index).take_initial();

    let mut current: Option<Arc<Entry>> = None;
    let mut prev: Option<Arc<Entry>> = None;

    loop {
        // Step 1: advance the cursor onto an entry if it isn't sitting on one already.
        if current.is_none() {
            current = match &prev {
                None => queue.wait_for_first(None),
                Some(p) => queue.wait_for_next(p, None),
            };
        }
        let entry = current.clone().expect("queue wait always yields an entry");

        // Step 2
        let alive = match net::is_alive(&stream) {
            Ok(alive) => alive,
            Err(e) => {
                error!("slot {index}: liveness check failed: {e}");
                false
            }
        };
        if !alive {
            (stream, receiver_ts) = receiver_gone(index, &pool, &entry);
            continue;
        }

        // Steps 3-4
        if entry.can_forward(index, receiver_ts) {
            let sent = entry
                .with_payload(|msg| codec::serialize(&mut stream, msg))
                .unwrap_or(Ok(()));
            match sent {
                Ok(()) => entry.set_sent(index, true),
                Err(e) => {
                    debug!("slot {index}: send failed: {e}");
                    (stream, receiver_ts) = receiver_gone(index, &pool, &entry);
                    continue;
                }
            }
        }

        // Steps 5-6
        let next = queue.next(&entry);
        prev = Some(entry);
        current = next;
    }
}

/// Step 7: the receiver is gone. Release the slot, park until reassigned, then reset the
/// sent-bit for the entry the worker was sitting on so the next receiver isn't pre-marked as
/// already served.
fn receiver_gone(index: usize, pool: &WorkerPool, current: &Arc<Entry>) -> (TcpStream, Timestamp) {
    debug!("slot {index}: receiver gone, releasing and waiting for reassignment");
    let (stream, ts) = pool.release_and_park(index);
    current.set_sent(index, false);
    (stream, ts)
}
