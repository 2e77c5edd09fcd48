//! The fixed-size pool of destination worker slots.
//!
//! Slots are a plain array, not a growable collection: the per-entry sent-bitmask in
//! [`crate::queue`] encodes "slot *i* has served this entry" in bit *i*, so `num_workers` is
//! capped at 64.

use crate::clock::Timestamp;
use std::net::TcpStream;
use std::sync::{Condvar, Mutex};

/// Upper bound on `num_workers`, fixed by the width of the per-entry sent-bitmask.
pub const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Never started: no thread has been spawned for this slot yet.
    Available,
    /// A worker thread exists and is parked, awaiting reassignment.
    Ready,
    /// A worker thread exists and is actively serving a receiver.
    Busy,
}

/// A receiver's socket and connection timestamp, reassigned under `Slot::lock`.
pub struct Assignment {
    pub stream: Option<TcpStream>,
    pub connected_at: Timestamp,
    pub status: SlotStatus,
}

/// A single reusable worker slot: stable index, current assignment, and the condvar a parked
/// worker thread waits on for reassignment.
pub struct Slot {
    pub index: usize,
    state: Mutex<Assignment>,
    cond: Condvar,
}

impl Slot {
    fn new(index: usize) -> Self {
        Slot {
            index,
            state: Mutex::new(Assignment {
                stream: None,
                connected_at: Timestamp::now(),
                status: SlotStatus::Available,
            }),
            cond: Condvar::new(),
        }
    }

    /// Pull the stream and connection timestamp a freshly-spawned worker was assigned, with
    /// no waiting: `assign` always sets them (and flips the slot to `Busy`) before the
    /// dispatcher spawns the worker thread, so they're guaranteed present.
    pub fn take_initial(&self) -> (TcpStream, Timestamp) {
        let mut guard = self.state.lock().unwrap();
        debug_assert_eq!(guard.status, SlotStatus::Busy);
        let stream = guard
            .stream
            .take()
            .expect("freshly spawned worker must have an assigned stream");
        (stream, guard.connected_at)
    }

    pub fn status(&self) -> SlotStatus {
        self.state.lock().unwrap().status
    }

    /// Block until this slot's status becomes `Busy` again, then return the freshly-assigned
    /// stream and connection timestamp. Called by a worker that has just gone `Ready`.
    pub fn park_until_busy(&self) -> (TcpStream, Timestamp) {
        let guard = self.state.lock().unwrap();
        let mut guard = self
            .cond
            .wait_while(guard, |a| a.status != SlotStatus::Busy)
            .unwrap();
        let stream = guard.stream.take().expect("busy slot must carry a stream");
        (stream, guard.connected_at)
    }
}

/// The array of worker slots plus the global busy-bitmask used for O(1) idle scans.
pub struct WorkerPool {
    slots: Vec<Slot>,
    busy: Mutex<u64>,
}

/// What the caller of [`WorkerPool::assign`] must do in response.
pub enum SlotTransition {
    /// This is the slot's first activation: spawn a worker thread for it.
    SpawnWorker,
    /// The slot already has a parked worker thread; it has been woken in place.
    Woken,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        assert!(
            (1..=MAX_WORKERS).contains(&num_workers),
            "num_workers must be in 1..={MAX_WORKERS}"
        );
        WorkerPool {
            slots: (0..num_workers).map(Slot::new).collect(),
            busy: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Scan the busy-bitmask for the first idle slot.
    pub fn find_idle(&self) -> Option<usize> {
        let busy = self.busy.lock().unwrap();
        (0..self.slots.len()).find(|&i| *busy & (1 << i) == 0)
    }

    /// Assign a freshly-accepted receiver to slot `index`, branching on its current status.
    pub fn assign(&self, index: usize, stream: TcpStream, connected_at: Timestamp) -> SlotTransition {
        let slot = &self.slots[index];
        let mut guard = slot.state.lock().unwrap();
        let transition = match guard.status {
            SlotStatus::Available => SlotTransition::SpawnWorker,
            SlotStatus::Ready => SlotTransition::Woken,
            SlotStatus::Busy => unreachable!("dispatcher only assigns idle slots"),
        };
        guard.stream = Some(stream);
        guard.connected_at = connected_at;
        guard.status = SlotStatus::Busy;
        drop(guard);

        let mut busy = self.busy.lock().unwrap();
        *busy |= 1 << index;
        drop(busy);

        if matches!(transition, SlotTransition::Woken) {
            slot.cond.notify_one();
        }
        transition
    }

    /// Called by a worker after it observes its receiver is gone: release the slot back to
    /// `Ready` and clear the busy-bit, then block until reassigned.
    pub fn release_and_park(&self, index: usize) -> (TcpStream, Timestamp) {
        {
            let mut guard = self.slots[index].state.lock().unwrap();
            guard.status = SlotStatus::Ready;
            let mut busy = self.busy.lock().unwrap();
            *busy &= !(1 << index);
        }
        self.slots[index].park_until_busy()
    }

    pub fn is_busy(&self, index: usize) -> bool {
        *self.busy.lock().unwrap() & (1 << index) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn dummy_stream() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        client
    }

    #[test]
    fn find_idle_returns_first_zero_bit() {
        let pool = WorkerPool::new(4);
        assert_eq!(pool.find_idle(), Some(0));
        pool.assign(0, dummy_stream(), Timestamp::now());
        assert_eq!(pool.find_idle(), Some(1));
    }

    #[test]
    fn assign_on_available_requests_spawn() {
        let pool = WorkerPool::new(2);
        let t = pool.assign(0, dummy_stream(), Timestamp::now());
        assert!(matches!(t, SlotTransition::SpawnWorker));
        assert_eq!(pool.slot(0).status(), SlotStatus::Busy);
        assert!(pool.is_busy(0));
    }

    #[test]
    fn release_then_wake_round_trips_through_ready() {
        let pool = std::sync::Arc::new(WorkerPool::new(1));
        pool.assign(0, dummy_stream(), Timestamp::now());

        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || pool2.release_and_park(0));

        // give the worker time to observe Ready and start parking
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(pool.slot(0).status(), SlotStatus::Ready);
        assert!(!pool.is_busy(0));

        let transition = pool.assign(0, dummy_stream(), Timestamp::now());
        assert!(matches!(transition, SlotTransition::Woken));
        let (_stream, _ts) = handle.join().unwrap();
        assert_eq!(pool.slot(0).status(), SlotStatus::Busy);
    }

    #[test]
    fn busy_bitmask_matches_status() {
        let pool = WorkerPool::new(3);
        pool.assign(1, dummy_stream(), Timestamp::now());
        for i in 0..3 {
            assert_eq!(pool.is_busy(i), pool.slot(i).status() == SlotStatus::Busy);
        }
    }
}
