//! The deadline enforcer: cancels active requests past their per-request
//! deadline and drops stale queued requests. Idempotent within the same
//! wall-clock second.

use std::time::{Duration, Instant};

use dispatch_common::{Action, MasterState, Request, Trigger};

use crate::pool::{Shared, State};

impl Shared {
    pub(crate) fn enforce_deadlines(&self, state: &mut State, now: Instant) {
        let now_secs = now.duration_since(self.start_time).as_secs();
        if state.last_deadline_check == Some(now_secs) {
            return;
        }
        state.last_deadline_check = Some(now_secs);

        for idx in state.arena.active_ids() {
            let worker = state.arena.get(idx);
            let Some(deadline) = worker.deadline else { continue };
            if now < deadline {
                continue;
            }
            let Some(request) = worker.request.clone() else { continue };
            if request.master_state() == MasterState::StopProcessing {
                continue;
            }
            let worker_id = worker.id;
            request.set_master_state(MasterState::StopProcessing);
            eprintln!("[dispatch] worker {worker_id} exceeded its request deadline");
            self.emit(Trigger::ThreadUnresponsive { worker_id });
            (self.process)(request, Action::Done);
        }

        if let Some(head) = state.heap.peek() {
            if now.duration_since(head.arrival()) > Duration::from_secs(5)
                && !head.is_proxied()
                && self.blocked_queue_limiter.allow(now)
            {
                eprintln!(
                    "[dispatch] head of queue has been waiting {:?}",
                    now.duration_since(head.arrival())
                );
            }
        }

        let stale = state.heap.drain_while(|r| {
            now.checked_duration_since(r.arrival())
                .map(|age| age > r.max_request_time())
                .unwrap_or(false)
        });
        for request in stale {
            request.set_master_state(MasterState::StopProcessing);
            (self.process)(request, Action::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::Pool;
    use crate::test_support::fake_request_at;
    use dispatch_common::request::ProcessFn;
    use dispatch_common::{Action, MasterState, NullSink, Request};
    use dispatch_config::ThreadConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn cfg(overrides: impl FnOnce(&mut ThreadConfig)) -> dispatch_config::ValidatedThreadConfig {
        let mut c = ThreadConfig::default();
        overrides(&mut c);
        c.validate().unwrap()
    }

    fn counting_process() -> (Arc<ProcessFn>, Arc<AtomicUsize>) {
        let done = Arc::new(AtomicUsize::new(0));
        let d2 = Arc::clone(&done);
        let process: Arc<ProcessFn> = Arc::new(move |req, action| {
            if action == Action::Done {
                assert_eq!(req.master_state(), MasterState::StopProcessing);
                d2.fetch_add(1, Ordering::SeqCst);
            }
        });
        (process, done)
    }

    // Exercises `enforce_deadlines` directly against `Shared`/`State`,
    // advancing `now` by hand rather than sleeping real wall-clock seconds,
    // so the once-per-second idempotence gate can be driven deterministically.
    #[test]
    fn stale_queued_request_is_drained_on_the_next_tick() {
        let (process, done) = counting_process();
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 0;
                c.max_servers = 0;
            }),
            process,
            Arc::new(NullSink),
        );
        let now0 = Instant::now();
        {
            let mut state = pool.0.state.lock();
            pool.0.enforce_deadlines(&mut state, now0);
            let ancient = fake_request_at(now0 - Duration::from_secs(60), 0, 0, false, false, Duration::from_secs(30));
            state.heap.push(ancient);
        }
        let mut state = pool.0.state.lock();
        pool.0.enforce_deadlines(&mut state, now0 + Duration::from_secs(2));
        assert_eq!(state.heap.len(), 0);
        drop(state);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_call_within_the_same_second_is_a_no_op() {
        let (process, done) = counting_process();
        let pool = Pool::new(
            cfg(|c| {
                c.start_servers = 0;
                c.max_servers = 0;
            }),
            process,
            Arc::new(NullSink),
        );
        let now0 = Instant::now();
        let mut state = pool.0.state.lock();
        let ancient = fake_request_at(now0 - Duration::from_secs(60), 0, 0, false, false, Duration::from_secs(30));
        state.heap.push(ancient);
        pool.0.enforce_deadlines(&mut state, now0);
        assert_eq!(state.heap.len(), 0);
        assert_eq!(done.load(Ordering::SeqCst), 1);

        // A second, later-arriving stale request shows up but the same
        // wall-clock second's enforcer run is already spent.
        let ancient2 = fake_request_at(now0 - Duration::from_secs(60), 0, 0, false, false, Duration::from_secs(30));
        state.heap.push(ancient2);
        pool.0.enforce_deadlines(&mut state, now0 + Duration::from_millis(1));
        assert_eq!(state.heap.len(), 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
