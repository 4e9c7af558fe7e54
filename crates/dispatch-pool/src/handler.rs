//! The worker loop: wait for a hand-off, run it, drain the heap while work
//! remains ("hot thread stays hot"), otherwise go back to idle.

use std::sync::Arc;
use std::time::Instant;

use dispatch_common::{Action, Request, Trigger};
use parking_lot::Condvar;

use crate::pool::Shared;
use crate::worker::WorkerStatus;

pub(crate) fn worker_loop(shared: Arc<Shared>, idx: usize, wake: Arc<Condvar>) {
    loop {
        let state = shared.state.lock();
        let mut state = shared.park_worker(state, idx, &wake);

        if state.stop_flag {
            let worker_id = state.arena.get(idx).id;
            state.arena.move_to_exited(idx);
            drop(state);
            shared.emit(Trigger::ThreadStop { worker_id });
            return;
        }

        if state.arena.get(idx).status == WorkerStatus::Cancelled {
            state.arena.mark_exited_in_place(idx);
            let worker_id = state.arena.get(idx).id;
            drop(state);
            shared.emit(Trigger::ThreadStop { worker_id });
            return;
        }

        state.arena.get_mut(idx).has_work = false;
        let mut request = state
            .arena
            .get(idx)
            .request
            .clone()
            .expect("an active worker always carries a request");
        drop(state);

        loop {
            if shared.config.auto_limit_acct && request.is_accounting() {
                let (pps_in, pps_out, queue_free_pct) = {
                    let state = shared.state.lock();
                    let elapsed = shared.start_time.elapsed();
                    let free = shared.config.max_queue_size.saturating_sub(state.heap.len());
                    let pct = free as f64 / shared.config.max_queue_size as f64 * 100.0;
                    (state.pps_in.rate(elapsed), state.pps_out.rate(elapsed), pct)
                };
                request.set_control_attrs(pps_in, pps_out, queue_free_pct);
            }

            (shared.process)(Arc::clone(&request), Action::Run);
            shared.reaper.poll_once();

            let mut state = shared.state.lock();

            if state.stop_flag {
                state.arena.move_to_exited(idx);
                let worker_id = state.arena.get(idx).id;
                drop(state);
                shared.emit(Trigger::ThreadStop { worker_id });
                return;
            }

            state.pps_out.sample(shared.start_time.elapsed());

            let now = Instant::now();
            let now_secs = now.duration_since(shared.start_time).as_secs();
            if state.last_managed != Some(now_secs) {
                state.last_managed = Some(now_secs);
                Shared::manage(&shared, &mut state, now);
            }

            if let Some(next) = state.heap.pop() {
                let deadline = Instant::now() + next.max_request_time();
                state.arena.reassign_active(idx, Arc::clone(&next), deadline);
                drop(state);
                request = next;
                continue;
            } else {
                state.arena.active_to_idle(idx);
                drop(state);
                break;
            }
        }
    }
}
