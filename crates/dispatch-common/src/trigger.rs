use std::sync::Mutex;

/// The named side-channel events the scheduler emits to an external
/// observability sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A worker thread started.
    ThreadStart { worker_id: u64 },
    /// A worker thread exited.
    ThreadStop { worker_id: u64 },
    /// An active worker's request exceeded its deadline.
    ThreadUnresponsive { worker_id: u64 },
}

impl Trigger {
    /// The dotted name used in the original design (`server.thread.start`,
    /// and so on), kept for log lines and external dashboards that key off
    /// the string form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ThreadStart { .. } => "server.thread.start",
            Self::ThreadStop { .. } => "server.thread.stop",
            Self::ThreadUnresponsive { .. } => "server.thread.unresponsive",
        }
    }
}

/// Receives triggers emitted by the pool. Kept as a trait so the binary can
/// wire triggers to metrics/logging without the pool crate depending on
/// either.
pub trait TriggerSink: Send + Sync {
    fn emit(&self, trigger: Trigger);
}

/// A sink that does nothing; the default for pools that don't care about
/// observability callbacks.
#[derive(Debug, Default)]
pub struct NullSink;

impl TriggerSink for NullSink {
    fn emit(&self, _trigger: Trigger) {}
}

/// A sink that records every trigger it receives, in order. Intended for
/// tests that need to assert a `server.thread.unresponsive` trigger fired.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Trigger>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Trigger> {
        self.events.lock().unwrap().clone()
    }
}

impl TriggerSink for RecordingSink {
    fn emit(&self, trigger: Trigger) {
        self.events.lock().unwrap().push(trigger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_names() {
        assert_eq!(Trigger::ThreadStart { worker_id: 1 }.name(), "server.thread.start");
        assert_eq!(Trigger::ThreadStop { worker_id: 1 }.name(), "server.thread.stop");
        assert_eq!(
            Trigger::ThreadUnresponsive { worker_id: 1 }.name(),
            "server.thread.unresponsive"
        );
    }

    #[test]
    fn recording_sink_collects_in_order() {
        let sink = RecordingSink::new();
        sink.emit(Trigger::ThreadStart { worker_id: 1 });
        sink.emit(Trigger::ThreadStop { worker_id: 1 });
        assert_eq!(sink.events().len(), 2);
    }
}
