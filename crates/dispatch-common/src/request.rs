use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The scheduler-visible lifecycle of a request.
///
/// Everything outside these four states -- wire decoding, actual
/// authentication/accounting logic -- belongs to the opaque `process`
/// callback and is never inspected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Running,
    StopProcessing,
    Queued,
    Done,
}

impl MasterState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::StopProcessing => 1,
            Self::Queued => 2,
            Self::Done => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::StopProcessing,
            2 => Self::Queued,
            _ => Self::Done,
        }
    }
}

/// Secondary state the handler uses to track sub-processing (e.g. whether a
/// forked child is still outstanding). The scheduler only ever overwrites
/// it; it never branches on the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Runnable,
    Done,
}

impl ChildState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Runnable => 0,
            Self::Done => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Runnable,
            _ => Self::Done,
        }
    }
}

/// Lock-free storage for [`MasterState`], shared between the thread that
/// enqueued/dispatched a request and the worker or deadline enforcer that
/// later mutates it.
#[derive(Debug)]
pub struct AtomicMasterState(AtomicU8);

impl AtomicMasterState {
    pub fn new(initial: MasterState) -> Self {
        Self(AtomicU8::new(initial.to_u8()))
    }

    pub fn load(&self) -> MasterState {
        MasterState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: MasterState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// Lock-free storage for [`ChildState`].
#[derive(Debug)]
pub struct AtomicChildState(AtomicU8);

impl AtomicChildState {
    pub fn new(initial: ChildState) -> Self {
        Self(AtomicU8::new(initial.to_u8()))
    }

    pub fn load(&self) -> ChildState {
        ChildState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ChildState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// What the opaque `process` callback is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run the request to completion (or until it yields control back, for
    /// the hot-thread heap-draining path).
    Run,
    /// The scheduler has decided this request will not be processed
    /// further; the callback should release whatever it was holding.
    Done,
}

/// The scheduler's view of a unit of work.
///
/// A `Request` is owned by the caller of [`enqueue`](../dispatch_pool/fn.enqueue.html);
/// the scheduler mutates only `master_state`, `child_state`, the
/// module/component label, and its own heap-membership bookkeeping. Wire
/// decoding and the actual authentication/accounting logic live entirely
/// outside this trait, behind the `process` callback.
pub trait Request: Send + Sync {
    /// When the request arrived, used for deadline enforcement and the
    /// `time` comparator.
    fn arrival(&self) -> Instant;

    /// Scheduling priority; lower sorts first under the `default` comparator.
    fn priority(&self) -> i32;

    /// Protocol-round counter, used by the `eap` comparator.
    fn rounds(&self) -> u32;

    /// The wall-clock budget this request has once a worker starts it.
    fn max_request_time(&self) -> Duration;

    /// Whether this is an accounting request, relevant only to the
    /// probabilistic admission control in `auto_limit_acct` mode.
    fn is_accounting(&self) -> bool;

    /// Whether this request arrived via a proxy hop; proxied requests are
    /// exempt from the "blocked queue" staleness warning.
    fn is_proxied(&self) -> bool;

    fn master_state(&self) -> MasterState;
    fn set_master_state(&self, state: MasterState);

    fn child_state(&self) -> ChildState;
    fn set_child_state(&self, state: ChildState);

    /// Record where in the request pipeline this request currently is, for
    /// diagnostics. Most implementations can make this a no-op.
    fn set_component(&self, _module: &str, _component: &str) {}

    /// Attach the three admission-control attributes a worker computes for
    /// accounting requests under `auto_limit_acct` before handing the
    /// request to `process`. Default is a no-op for callers that don't
    /// care.
    fn set_control_attrs(&self, _pps_in: f64, _pps_out: f64, _queue_free_pct: f64) {}
}

/// Shared ownership of a scheduler request.
pub type RequestHandle = Arc<dyn Request>;

/// The opaque per-request processing function. Invoked by worker threads;
/// the scheduler never inspects its return value.
pub type ProcessFn = dyn Fn(RequestHandle, Action) + Send + Sync;
