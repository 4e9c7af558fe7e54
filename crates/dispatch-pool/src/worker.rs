//! Per-worker state and the arena of three intrusive lists (idle/active/
//! exited) that own it.

use std::thread::JoinHandle;
use std::time::Instant;

use dispatch_common::RequestHandle;
use parking_lot::Condvar;
use std::sync::Arc;

use crate::list::{Link, ListHead};

/// A worker's position in its own lifecycle, always matching exactly one
/// of the three arena lists (see the invariant in the crate's top-level
/// docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Active,
    Cancelled,
    Exited,
}

/// Per-worker bookkeeping. Never moved once allocated into the arena (the
/// arena hands out stable indices), so the `Condvar` can be shared with the
/// worker's own OS thread without any extra indirection.
pub struct Worker {
    pub id: u64,
    pub status: WorkerStatus,
    pub handled: u64,
    pub start_time: Instant,
    pub request: Option<RequestHandle>,
    pub deadline: Option<Instant>,
    pub wake: Arc<Condvar>,
    /// Guards against lost and spurious wakeups: set before `notify`, read
    /// and cleared by the worker after waking.
    pub has_work: bool,
    pub thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(id: u64, wake: Arc<Condvar>, now: Instant) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            handled: 0,
            start_time: now,
            request: None,
            deadline: None,
            wake,
            has_work: false,
            thread: None,
        }
    }
}

/// Owns every worker slot plus the three lists (idle/active/exited) that
/// partition them. Slots vacated by a fully-reaped worker are recycled via
/// a free list so long-running pools don't grow the slab without bound.
#[derive(Default)]
pub struct WorkerArena {
    slots: Vec<Option<Worker>>,
    links: Vec<Link>,
    free: Vec<usize>,
    pub idle: ListHead,
    pub active: ListHead,
    pub exited: ListHead,
}

impl WorkerArena {
    pub fn get(&self, idx: usize) -> &Worker {
        self.slots[idx].as_ref().expect("slot index must be live")
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Worker {
        self.slots[idx].as_mut().expect("slot index must be live")
    }

    /// Allocate a slot for a freshly-created worker and link it at the head
    /// of the idle list. Returns the stable slot index.
    pub fn insert_idle(&mut self, worker: Worker) -> usize {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(worker);
                idx
            }
            None => {
                self.slots.push(Some(worker));
                self.links.push(Link::default());
                self.slots.len() - 1
            }
        };
        self.idle.push_front(idx, &mut self.links);
        idx
    }

    /// Idle -> Active hand-off: unlink from idle, push to the head of
    /// active (matching the "hot thread" cache-locality rule), attach the
    /// request and its deadline.
    pub fn idle_to_active(&mut self, idx: usize, request: RequestHandle, deadline: Instant) {
        self.idle.unlink(idx, &mut self.links);
        self.active.push_front(idx, &mut self.links);
        let w = self.get_mut(idx);
        w.status = WorkerStatus::Active;
        w.request = Some(request);
        w.deadline = Some(deadline);
    }

    /// Active -> Idle: the worker finished its request and has nothing
    /// queued to pick up next.
    pub fn active_to_idle(&mut self, idx: usize) {
        self.active.unlink(idx, &mut self.links);
        self.idle.push_front(idx, &mut self.links);
        let w = self.get_mut(idx);
        w.status = WorkerStatus::Idle;
        w.request = None;
        w.deadline = None;
        w.handled += 1;
    }

    /// Active worker stays active but its request is swapped for the next
    /// heap entry ("hot thread stays hot").
    pub fn reassign_active(&mut self, idx: usize, request: RequestHandle, deadline: Instant) {
        let w = self.get_mut(idx);
        w.request = Some(request);
        w.deadline = Some(deadline);
        w.handled += 1;
    }

    /// Idle -> Exited, for a worker whose wait primitive gives up without
    /// ever being cancelled. `parking_lot::Mutex`/`Condvar` never poison
    /// (see `PoolError::WaitFailure`'s doc comment and the design notes),
    /// so nothing in this tree calls this today; kept as the documented
    /// landing spot should a future wait primitive need it.
    pub fn idle_to_exited(&mut self, idx: usize) {
        self.idle.unlink(idx, &mut self.links);
        self.exited.push_back(idx, &mut self.links);
        self.get_mut(idx).status = WorkerStatus::Exited;
    }

    /// Manager-driven shrink: move the coldest idle worker into the exited
    /// list as Cancelled. It stays Cancelled (not yet Exited) until its own
    /// thread notices and changes its own status in place. `has_work` is
    /// set so the worker's park predicate wakes it the same way a real
    /// hand-off would -- otherwise a cancelled worker parked on its condvar
    /// never re-checks its own status and never exits.
    pub fn idle_to_cancelled(&mut self, idx: usize) {
        self.idle.unlink(idx, &mut self.links);
        self.exited.push_back(idx, &mut self.links);
        let w = self.get_mut(idx);
        w.status = WorkerStatus::Cancelled;
        w.has_work = true;
    }

    /// A Cancelled worker's own thread has finished and is exiting. It is
    /// already resident in the exited list; only the status flips.
    pub fn mark_exited_in_place(&mut self, idx: usize) {
        self.get_mut(idx).status = WorkerStatus::Exited;
    }

    /// Reap: unlink a fully-exited worker from the exited list and free its
    /// slot for reuse. Returns the worker so the caller can join its
    /// thread handle outside the lock.
    pub fn reap(&mut self, idx: usize) -> Worker {
        debug_assert_eq!(self.get(idx).status, WorkerStatus::Exited);
        self.exited.unlink(idx, &mut self.links);
        let worker = self.slots[idx].take().expect("slot index must be live");
        self.free.push(idx);
        worker
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn total_count(&self) -> usize {
        self.idle.len() + self.active.len()
    }

    /// Unlink a freshly-inserted idle worker that never got a thread (spawn
    /// failure) and free its slot, without routing it through exited.
    pub fn remove_idle(&mut self, idx: usize) -> Worker {
        self.idle.unlink(idx, &mut self.links);
        let worker = self.slots[idx].take().expect("slot index must be live");
        self.free.push(idx);
        worker
    }

    /// Force a worker straight to Exited regardless of which list currently
    /// owns it, for pool shutdown. A worker already in the exited list
    /// (Cancelled or Exited) is left alone.
    pub fn move_to_exited(&mut self, idx: usize) {
        match self.get(idx).status {
            WorkerStatus::Idle => self.idle.unlink(idx, &mut self.links),
            WorkerStatus::Active => self.active.unlink(idx, &mut self.links),
            WorkerStatus::Cancelled | WorkerStatus::Exited => return,
        }
        self.exited.push_back(idx, &mut self.links);
        self.get_mut(idx).status = WorkerStatus::Exited;
    }

    pub fn idle_ids(&self) -> Vec<usize> {
        self.idle.iter(&self.links).collect()
    }

    pub fn active_ids(&self) -> Vec<usize> {
        self.active.iter(&self.links).collect()
    }

    pub fn is_empty_all(&self) -> bool {
        self.idle.is_empty() && self.active.is_empty() && self.exited.is_empty()
    }
}
