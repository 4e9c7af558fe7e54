//! The once-per-second manager tick: reap one exited worker, grow toward
//! `min_spare_servers`, shrink past `max_spare_servers` with hysteresis.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pool::{Shared, State};
use crate::worker::WorkerStatus;

impl Shared {
    pub(crate) fn manage(shared: &Arc<Shared>, state: &mut State, now: Instant) {
        shared.enforce_deadlines(state, now);
        reap_one_exited(state);
        grow(shared, state);
        shrink(shared, state, now);
    }
}

fn reap_one_exited(state: &mut State) {
    if let Some(idx) = state.arena.exited.head() {
        if state.arena.get(idx).status == WorkerStatus::Exited {
            let mut worker = state.arena.reap(idx);
            if let Some(handle) = worker.thread.take() {
                // The thread has already finished running by the time its
                // status flips to Exited, so this join does not block the
                // tick for long; holding the pool mutex through it trades the
                // original's release-for-join optimisation for a simpler
                // single-lock design (see the crate's design notes).
                let _ = handle.join();
            }
        }
    }
}

fn grow(shared: &Arc<Shared>, state: &mut State) {
    let idle = state.arena.idle_count();
    let total = state.arena.total_count();
    if total >= shared.config.max_servers || idle >= shared.config.min_spare_servers {
        return;
    }
    let need = (shared.config.min_spare_servers - idle).min(shared.config.max_servers - total);
    let mut spawned_any = false;
    for _ in 0..need {
        match Shared::spawn_one(shared, state) {
            Ok(()) => spawned_any = true,
            Err(_) => break,
        }
    }
    if spawned_any {
        state.time_last_spawned = Instant::now();
    }
}

fn shrink(shared: &Arc<Shared>, state: &mut State, now: Instant) {
    if now.duration_since(state.time_last_spawned) < Duration::from_secs(shared.config.cleanup_delay) {
        return;
    }
    if state.arena.idle_count() <= shared.config.max_spare_servers {
        return;
    }
    if let Some(idx) = state.arena.idle.tail() {
        state.arena.idle_to_cancelled(idx);
        shared.notify_worker(state, idx);
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::Pool;
    use dispatch_common::request::ProcessFn;
    use dispatch_common::NullSink;
    use dispatch_config::ThreadConfig;
    use std::sync::Arc;

    fn cfg(overrides: impl FnOnce(&mut ThreadConfig)) -> dispatch_config::ValidatedThreadConfig {
        let mut c = ThreadConfig::default();
        overrides(&mut c);
        c.validate().unwrap()
    }

    #[test]
    fn shrinks_one_idle_worker_per_tick_down_to_max_spare() {
        let process: Arc<ProcessFn> = Arc::new(|_req, _action| {});
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 8;
                c.max_servers = 8;
                c.min_spare_servers = 0;
                c.max_spare_servers = 3;
                c.cleanup_delay = 0;
            }),
            process,
            Arc::new(NullSink),
        );
        assert_eq!(pool.idle_threads(), 8);
        for _ in 0..5 {
            pool.force_tick();
        }
        assert_eq!(pool.idle_threads(), 3);
        pool.stop();
    }

    #[test]
    fn grows_toward_min_spare_when_below() {
        let process: Arc<ProcessFn> = Arc::new(|_req, _action| {});
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 1;
                c.max_servers = 10;
                c.min_spare_servers = 4;
                c.max_spare_servers = 8;
            }),
            process,
            Arc::new(NullSink),
        );
        pool.force_tick();
        assert_eq!(pool.total_threads(), 4);
        pool.stop();
    }
}
