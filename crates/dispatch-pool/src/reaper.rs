//! Child-process reaping.
//!
//! Native `SIGCHLD` delivery is not directed at the forking thread in a
//! multithreaded program, so handlers never wait on it directly. Instead
//! every forked child is registered in a PID table; a non-blocking sweep
//! (`poll_once`) drains `waitpid(-1, WNOHANG)` and marks matching entries
//! exited, and `wait_for` polls that table on the handler's behalf.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use parking_lot::Mutex;

use dispatch_common::PoolError;

const MAX_CHILDREN: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

struct ChildEntry {
    status: Option<WaitStatus>,
    exited: bool,
}

#[derive(Default)]
struct WaitTable {
    entries: HashMap<i32, ChildEntry>,
}

impl WaitTable {
    fn register(&mut self, pid: Pid) -> Result<(), PoolError> {
        if self.entries.len() >= MAX_CHILDREN {
            return Err(PoolError::WaitTableFull);
        }
        self.entries.insert(
            pid.as_raw(),
            ChildEntry {
                status: None,
                exited: false,
            },
        );
        Ok(())
    }

    fn reap_nonblocking(&mut self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(status) => {
                    if let Some(pid) = status.pid() {
                        if let Some(entry) = self.entries.get_mut(&pid.as_raw()) {
                            entry.status = Some(status);
                            entry.exited = true;
                        }
                    }
                }
            }
        }
    }

    fn take_if_exited(&mut self, pid: Pid) -> Option<WaitStatus> {
        let exited = self.entries.get(&pid.as_raw()).map(|e| e.exited)?;
        if !exited {
            return None;
        }
        self.entries.remove(&pid.as_raw()).and_then(|e| e.status)
    }

    fn drop_entry(&mut self, pid: Pid) {
        self.entries.remove(&pid.as_raw());
    }
}

/// Shared, mutex-guarded PID waiter table, independent of the pool mutex
/// (per the design's "separate `wait_mutex`").
pub struct ChildReaper {
    table: Mutex<WaitTable>,
}

impl Default for ChildReaper {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildReaper {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(WaitTable::default()),
        }
    }

    /// Wraps `fork()`: the parent's copy is registered in the PID table
    /// before returning. Callers in the child branch must exec or exit
    /// immediately -- nothing else in this runtime is fork-safe across
    /// threads.
    ///
    /// # Safety
    /// Same preconditions as `nix::unistd::fork`: the child must not call
    /// into anything that assumes the other threads of this process still
    /// exist.
    pub unsafe fn fork_and_register(&self) -> Result<ForkResult, PoolError> {
        let result = fork().map_err(|e| PoolError::SpawnFailure(e.to_string()))?;
        if let ForkResult::Parent { child } = result {
            self.table.lock().register(child)?;
        }
        Ok(result)
    }

    /// Non-blocking sweep; safe to call frequently (e.g. once per worker
    /// loop iteration).
    pub fn poll_once(&self) {
        self.table.lock().reap_nonblocking();
    }

    /// Polls every 100ms for up to 10 seconds for `pid` to exit. Returns
    /// `None` (and drops the table entry, orphaning the child) on timeout.
    pub fn wait_for(&self, pid: Pid) -> Option<WaitStatus> {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            self.poll_once();
            if let Some(status) = self.table.lock().take_if_exited(pid) {
                return Some(status);
            }
            if Instant::now() >= deadline {
                self.table.lock().drop_entry(pid);
                return None;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_past_capacity() {
        let mut table = WaitTable::default();
        for i in 0..MAX_CHILDREN {
            table.register(Pid::from_raw(i as i32 + 1)).unwrap();
        }
        assert_eq!(
            table.register(Pid::from_raw(MAX_CHILDREN as i32 + 1)),
            Err(PoolError::WaitTableFull)
        );
    }

    #[test]
    fn take_if_exited_is_none_until_marked() {
        let mut table = WaitTable::default();
        let pid = Pid::from_raw(4242);
        table.register(pid).unwrap();
        assert!(table.take_if_exited(pid).is_none());
    }

    #[test]
    fn wait_for_real_child_returns_promptly() {
        let reaper = ChildReaper::new();
        // SAFETY: the child immediately exits without touching any shared
        // runtime state.
        let result = unsafe { reaper.fork_and_register() }.unwrap();
        match result {
            ForkResult::Child => unsafe { libc::_exit(0) },
            ForkResult::Parent { child } => {
                let status = reaper.wait_for(child);
                assert!(status.is_some());
            }
        }
    }
}
