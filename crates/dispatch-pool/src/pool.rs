//! The pool struct: one mutex serialising every list, heap, and counter
//! mutation, plus the handful of fields (config, process callback,
//! triggers, rate limiters) that never change after construction.
//!
//! Every cross-module operation (`dispatch`, `handler`, `manager`,
//! `deadline`) is an `impl Shared` block living in its own file and taking
//! `&mut State` once the caller already holds `self.state.lock()` --
//! `MutexGuard<State>` coerces to `&mut State` at the call site, so callers
//! never have to pass the guard type itself around.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dispatch_common::ratelimit::RateLimiter;
use dispatch_common::request::ProcessFn;
use dispatch_common::{Action, MasterState, NullSink, Request, RequestHandle, TriggerSink};
use dispatch_config::ValidatedThreadConfig;
use parking_lot::{Condvar as PlCondvar, Mutex, MutexGuard};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::heap::RequestHeap;
use crate::pps::PpsCounter;
use crate::reaper::ChildReaper;
use crate::worker::{WorkerArena, WorkerStatus};

/// Everything the pool mutex protects.
pub(crate) struct State {
    pub(crate) arena: WorkerArena,
    pub(crate) heap: RequestHeap,
    pub(crate) time_last_spawned: Instant,
    /// Guards deadline-enforcer idempotence within the same wall-clock
    /// second; lives on the struct, never as a function-local static.
    pub(crate) last_deadline_check: Option<u64>,
    /// Same idea for the once-per-second manager tick.
    pub(crate) last_managed: Option<u64>,
    pub(crate) stop_flag: bool,
    pub(crate) pps_in: PpsCounter,
    pub(crate) pps_out: PpsCounter,
}

/// Immutable (after construction) shared pool configuration and
/// collaborators, plus the mutex-guarded [`State`].
pub struct Shared {
    pub(crate) config: ValidatedThreadConfig,
    pub(crate) process: Arc<ProcessFn>,
    pub(crate) triggers: Arc<dyn TriggerSink>,
    pub(crate) state: Mutex<State>,
    pub(crate) start_time: Instant,
    pub(crate) overload_limiter: RateLimiter,
    pub(crate) blocked_queue_limiter: RateLimiter,
    next_worker_id: AtomicU64,
    pub(crate) reaper: ChildReaper,
    pub(crate) rng: Mutex<StdRng>,
}

/// A cheaply-cloneable handle to the worker pool.
#[derive(Clone)]
pub struct Pool(pub(crate) Arc<Shared>);

/// Snapshot returned by [`Pool::queue_stats`].
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub queue_len: usize,
    pub pps_in: f64,
    pub pps_out: f64,
}

impl Pool {
    /// Build a pool and spawn `start_servers` workers. `process` is the
    /// opaque per-request handler; `triggers` receives named lifecycle
    /// events (pass [`dispatch_common::NullSink`] if you don't care).
    pub fn new(
        config: ValidatedThreadConfig,
        process: Arc<ProcessFn>,
        triggers: Arc<dyn TriggerSink>,
    ) -> Self {
        let now = Instant::now();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                arena: WorkerArena::default(),
                heap: RequestHeap::new(config.queue_priority, now),
                time_last_spawned: now,
                last_deadline_check: None,
                last_managed: None,
                stop_flag: false,
                pps_in: PpsCounter::new(),
                pps_out: PpsCounter::new(),
            }),
            config,
            process,
            triggers,
            start_time: now,
            overload_limiter: RateLimiter::new(Duration::from_secs(1)),
            blocked_queue_limiter: RateLimiter::new(Duration::from_secs(1)),
            next_worker_id: AtomicU64::new(1),
            reaper: ChildReaper::new(),
            rng: Mutex::new(StdRng::from_entropy()),
        });

        let start_servers = shared.config.start_servers;
        {
            let mut state = shared.state.lock();
            for _ in 0..start_servers {
                let _ = Shared::spawn_one(&shared, &mut state);
            }
        }

        Pool(shared)
    }

    /// A pool whose admission-control RNG is seeded, for deterministic
    /// tests of the probabilistic accounting drop.
    pub fn with_seed(
        config: ValidatedThreadConfig,
        process: Arc<ProcessFn>,
        triggers: Arc<dyn TriggerSink>,
        seed: u64,
    ) -> Self {
        let pool = Self::new(config, process, triggers);
        *pool.0.rng.lock() = StdRng::seed_from_u64(seed);
        pool
    }

    pub fn enqueue(&self, request: RequestHandle) {
        self.0.enqueue(request);
    }

    pub fn queue_stats(&self) -> QueueStats {
        let elapsed = self.0.start_time.elapsed();
        let state = self.0.state.lock();
        QueueStats {
            queue_len: state.heap.len(),
            pps_in: state.pps_in.rate(elapsed),
            pps_out: state.pps_out.rate(elapsed),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.0.start_time.elapsed()
    }

    pub fn idle_threads(&self) -> usize {
        self.0.state.lock().arena.idle_count()
    }

    pub fn active_threads(&self) -> usize {
        self.0.state.lock().arena.active_count()
    }

    pub fn total_threads(&self) -> usize {
        self.0.state.lock().arena.total_count()
    }

    /// Sets the stop flag, fails every request still sitting in the heap,
    /// wakes every worker, and joins them all as they exit.
    pub fn stop(&self) {
        self.0.stop();
    }

    /// Runs one manager tick unconditionally (ignoring the once-per-second
    /// gate), for tests that want to drive ticks explicitly.
    pub fn force_tick(&self) {
        let now = Instant::now();
        let mut state = self.0.state.lock();
        Shared::manage(&self.0, &mut state, now);
    }
}

impl Shared {
    pub(crate) fn emit(&self, trigger: dispatch_common::Trigger) {
        self.triggers.emit(trigger);
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_worker_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wake the condvar for worker `idx`. Caller must already hold the pool
    /// mutex and have set `has_work`/the relevant status beforehand.
    pub(crate) fn notify_worker(&self, state: &State, idx: usize) {
        state.arena.get(idx).wake.notify_one();
    }

    /// Parks the calling worker's condvar on the pool mutex until
    /// `has_work` is set or shutdown is requested, handling spurious
    /// wakeups by re-checking the predicate in a loop.
    pub(crate) fn park_worker<'a>(
        &self,
        mut state: MutexGuard<'a, State>,
        idx: usize,
        wake: &PlCondvar,
    ) -> MutexGuard<'a, State> {
        loop {
            if state.stop_flag || state.arena.get(idx).has_work {
                return state;
            }
            wake.wait(&mut state);
        }
    }

    /// Fail a request synchronously: flag it `StopProcessing` and hand it
    /// back to the caller via `process(Done)`. Used by every admission path
    /// that decides a request will never reach a worker.
    pub(crate) fn fail(&self, request: RequestHandle) {
        request.set_master_state(MasterState::StopProcessing);
        (self.process)(request, Action::Done);
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.stop_flag = true;
            while let Some(req) = state.heap.pop() {
                req.set_master_state(MasterState::StopProcessing);
                (self.process)(req, Action::Done);
            }
            for idx in state.arena.idle_ids().into_iter().chain(state.arena.active_ids()) {
                state.arena.get(idx).wake.notify_one();
            }
        }

        loop {
            let handles = {
                let mut state = self.state.lock();
                let mut handles = Vec::new();
                while let Some(idx) = state.arena.exited.head() {
                    if state.arena.get(idx).status != WorkerStatus::Exited {
                        break;
                    }
                    let mut worker = state.arena.reap(idx);
                    if let Some(h) = worker.thread.take() {
                        handles.push(h);
                    }
                }
                handles
            };
            for h in handles {
                let _ = h.join();
            }
            if self.state.lock().arena.is_empty_all() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Allocate a worker slot, spawn its OS thread, and wire up the join
    /// handle. On spawn failure the slot is released and the idle insertion
    /// undone, matching the design's "leave the pool at its current size
    /// and retry next tick" policy.
    pub(crate) fn spawn_one(shared: &Arc<Self>, state: &mut State) -> Result<(), dispatch_common::PoolError> {
        let wake = Arc::new(PlCondvar::new());
        let worker_id = shared.next_id();
        let worker = crate::worker::Worker::new(worker_id, Arc::clone(&wake), Instant::now());
        let idx = state.arena.insert_idle(worker);

        let shared2 = Arc::clone(shared);
        let wake2 = Arc::clone(&wake);
        match std::thread::Builder::new()
            .name(format!("dispatch-worker-{worker_id}"))
            .spawn(move || crate::handler::worker_loop(shared2, idx, wake2))
        {
            Ok(handle) => {
                state.arena.get_mut(idx).thread = Some(handle);
                shared.emit(dispatch_common::Trigger::ThreadStart { worker_id });
                Ok(())
            }
            Err(e) => {
                state.arena.remove_idle(idx);
                Err(dispatch_common::PoolError::SpawnFailure(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_request;
    use dispatch_config::ThreadConfig;
    use std::sync::atomic::AtomicUsize;

    fn cfg(overrides: impl FnOnce(&mut ThreadConfig)) -> ValidatedThreadConfig {
        let mut c = ThreadConfig::default();
        overrides(&mut c);
        c.validate().unwrap()
    }

    fn noop_process() -> Arc<ProcessFn> {
        Arc::new(|_req, _action| {})
    }

    #[test]
    fn new_spawns_start_servers_workers() {
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 3;
                c.max_servers = 5;
            }),
            noop_process(),
            Arc::new(NullSink),
        );
        assert_eq!(pool.total_threads(), 3);
        assert_eq!(pool.idle_threads(), 3);
        pool.stop();
    }

    #[test]
    fn enqueue_hands_off_to_an_idle_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::clone(&counter);
        let process: Arc<ProcessFn> = Arc::new(move |req, action| {
            if action == Action::Run {
                c2.fetch_add(1, Ordering::SeqCst);
                req.set_master_state(MasterState::Done);
            }
        });
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 2;
                c.max_servers = 4;
                c.min_spare_servers = 1;
                c.max_spare_servers = 2;
            }),
            process,
            Arc::new(NullSink),
        );
        pool.enqueue(fake_request(0, false, false));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.stop();
    }

    #[test]
    fn stop_joins_every_worker_and_fails_queued_requests() {
        let done = Arc::new(AtomicUsize::new(0));
        let d2 = Arc::clone(&done);
        let process: Arc<ProcessFn> = Arc::new(move |req, action| {
            if action == Action::Done {
                d2.fetch_add(1, Ordering::SeqCst);
            }
            if action == Action::Run {
                std::thread::sleep(Duration::from_millis(50));
            }
        });
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 1;
                c.max_servers = 1;
            }),
            process,
            Arc::new(NullSink),
        );
        pool.enqueue(fake_request(0, false, false));
        pool.enqueue(fake_request(0, false, false));
        pool.stop();
        assert_eq!(pool.total_threads(), 0);
    }
}
