//! A minimal `Request` implementation shared by every module's unit tests.
//! Not part of the public API.

use std::time::{Duration, Instant};

use dispatch_common::request::{AtomicChildState, AtomicMasterState};
use dispatch_common::{ChildState, MasterState, Request, RequestHandle};
use std::sync::Arc;

pub struct FakeRequest {
    arrival: Instant,
    priority: i32,
    rounds: u32,
    max_request_time: Duration,
    accounting: bool,
    proxied: bool,
    master_state: AtomicMasterState,
    child_state: AtomicChildState,
}

impl Request for FakeRequest {
    fn arrival(&self) -> Instant {
        self.arrival
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn rounds(&self) -> u32 {
        self.rounds
    }

    fn max_request_time(&self) -> Duration {
        self.max_request_time
    }

    fn is_accounting(&self) -> bool {
        self.accounting
    }

    fn is_proxied(&self) -> bool {
        self.proxied
    }

    fn master_state(&self) -> MasterState {
        self.master_state.load()
    }

    fn set_master_state(&self, state: MasterState) {
        self.master_state.store(state);
    }

    fn child_state(&self) -> ChildState {
        self.child_state.load()
    }

    fn set_child_state(&self, state: ChildState) {
        self.child_state.store(state);
    }
}

pub fn fake_request(priority: i32, accounting: bool, proxied: bool) -> RequestHandle {
    fake_request_full(priority, 0, accounting, proxied)
}

pub fn fake_request_full(priority: i32, rounds: u32, accounting: bool, proxied: bool) -> RequestHandle {
    fake_request_at(Instant::now(), priority, rounds, accounting, proxied, Duration::from_secs(30))
}

pub fn fake_request_at(
    arrival: Instant,
    priority: i32,
    rounds: u32,
    accounting: bool,
    proxied: bool,
    max_request_time: Duration,
) -> RequestHandle {
    Arc::new(FakeRequest {
        arrival,
        priority,
        rounds,
        max_request_time,
        accounting,
        proxied,
        master_state: AtomicMasterState::new(MasterState::Queued),
        child_state: AtomicChildState::new(ChildState::Runnable),
    })
}
