use std::fmt;

/// Everything that can go wrong inside the scheduler or its collaborators.
///
/// Variants map directly to the error kinds named in the design: most are
/// handled internally (logged and degraded) rather than ever reaching a
/// caller, but they are still represented as real values so tests can
/// assert on them instead of scraping log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pending-request heap is at `max_queue_size`; the request was
    /// rejected instead of queued.
    QueueFull,
    /// A request's deadline passed before a worker could finish it.
    DeadlineExceeded,
    /// The OS refused to spawn another worker thread.
    SpawnFailure(String),
    /// A worker's wait primitive observed a poisoned pool mutex. Structurally
    /// unreachable with `parking_lot::Mutex`/`Condvar`, which never poison
    /// on a panicking holder the way `std::sync::Mutex` does; kept as a real
    /// variant (rather than removed) so `WorkerArena::idle_to_exited` has a
    /// documented error to pair with if a future wait primitive can fail.
    WaitFailure,
    /// The child-process PID table is full (1024 outstanding children).
    WaitTableFull,
    /// A forked child was not reaped within the 10-second polling window.
    ChildTimeout,
    /// The `[thread]` configuration section failed validation.
    Config(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "pending-request queue is full"),
            Self::DeadlineExceeded => write!(f, "request exceeded its deadline"),
            Self::SpawnFailure(msg) => write!(f, "failed to spawn worker thread: {msg}"),
            Self::WaitFailure => write!(f, "worker wait primitive observed a poisoned mutex"),
            Self::WaitTableFull => write!(f, "child-process wait table is full"),
            Self::ChildTimeout => write!(f, "child process was not reaped before timeout"),
            Self::Config(msg) => write!(f, "invalid thread pool configuration: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_variants() {
        assert_eq!(
            PoolError::QueueFull.to_string(),
            "pending-request queue is full"
        );
        assert_eq!(
            PoolError::DeadlineExceeded.to_string(),
            "request exceeded its deadline"
        );
        assert_eq!(
            PoolError::SpawnFailure("out of memory".into()).to_string(),
            "failed to spawn worker thread: out of memory"
        );
        assert_eq!(
            PoolError::Config("bad queue_priority".into()).to_string(),
            "invalid thread pool configuration: bad queue_priority"
        );
    }
}
