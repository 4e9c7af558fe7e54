//! The pending-request priority heap.
//!
//! Rather than tracking a separate "heap index, sentinel = not present"
//! field on each request the way an intrusive C heap must, membership in
//! the heap is represented structurally: a request is queued exactly when
//! it is an element of this heap's backing `BinaryHeap`, and nowhere else.
//! `num_queued == heap.len()` and "present in the heap" both fall out of
//! that for free instead of needing to be kept in sync by hand.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use dispatch_common::{Request, RequestHandle};
use dispatch_config::Comparator;

/// A request plus its precomputed sort key, ordered so that `BinaryHeap`
/// (a max-heap) pops the *lowest* key first -- i.e. this type's `Ord` is
/// inverted relative to the natural reading of the key tuple.
struct Entry {
    key: (i64, i64, i64),
    seq: u64,
    request: RequestHandle,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want min-key-first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn nanos_since(epoch: Instant, t: Instant) -> i64 {
    t.saturating_duration_since(epoch).as_nanos() as i64
}

fn sort_key(comparator: Comparator, epoch: Instant, req: &dyn dispatch_common::Request) -> (i64, i64, i64) {
    let arrival = nanos_since(epoch, req.arrival());
    match comparator {
        Comparator::Default => (req.priority() as i64, arrival, 0),
        Comparator::Time => (arrival, 0, 0),
        // Higher rounds first: negate so the min-heap surfaces it first.
        Comparator::Eap => (-(req.rounds() as i64), req.priority() as i64, arrival),
    }
}

/// The comparator-ordered pending-request queue.
pub struct RequestHeap {
    comparator: Comparator,
    epoch: Instant,
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl RequestHeap {
    pub fn new(comparator: Comparator, epoch: Instant) -> Self {
        Self {
            comparator,
            epoch,
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, request: RequestHandle) {
        let key = sort_key(self.comparator, self.epoch, request.as_ref());
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Entry { key, seq, request });
    }

    pub fn pop(&mut self) -> Option<RequestHandle> {
        self.heap.pop().map(|e| e.request)
    }

    pub fn peek(&self) -> Option<&RequestHandle> {
        self.heap.peek().map(|e| &e.request)
    }

    /// Pop entries from the head for as long as `pred` returns `true` for
    /// the current head. `pred` is re-evaluated against the new head after
    /// every pop, since popping can expose a very different request.
    pub fn drain_while(&mut self, mut pred: impl FnMut(&RequestHandle) -> bool) -> Vec<RequestHandle> {
        let mut out = Vec::new();
        while let Some(front) = self.peek() {
            if !pred(front) {
                break;
            }
            out.push(self.pop().expect("peek just confirmed an element"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_request;
    use std::time::{Duration, Instant};

    #[test]
    fn default_comparator_orders_by_priority_then_arrival() {
        let epoch = Instant::now();
        let mut heap = RequestHeap::new(Comparator::Default, epoch);
        let low = fake_request_at(epoch, 5, 0, false, false);
        let high = fake_request_at(epoch, 1, 0, false, false);
        heap.push(low.clone());
        heap.push(high.clone());
        assert!(same(&heap.pop().unwrap(), &high));
        assert!(same(&heap.pop().unwrap(), &low));
    }

    #[test]
    fn time_comparator_ignores_priority() {
        let epoch = Instant::now();
        let mut heap = RequestHeap::new(Comparator::Time, epoch);
        let earlier = fake_request_at(epoch, 100, 0, false, false);
        std::thread::sleep(Duration::from_millis(2));
        let later = fake_request_at(epoch, 1, 0, false, false);
        heap.push(later.clone());
        heap.push(earlier.clone());
        assert!(same(&heap.pop().unwrap(), &earlier));
    }

    #[test]
    fn eap_comparator_prefers_higher_rounds() {
        let epoch = Instant::now();
        let mut heap = RequestHeap::new(Comparator::Eap, epoch);
        let few_rounds = fake_request_at(epoch, 0, 1, false, false);
        let many_rounds = fake_request_at(epoch, 0, 9, false, false);
        heap.push(few_rounds.clone());
        heap.push(many_rounds.clone());
        assert!(same(&heap.pop().unwrap(), &many_rounds));
    }

    #[test]
    fn drain_while_stops_at_first_non_matching_head() {
        let epoch = Instant::now();
        let mut heap = RequestHeap::new(Comparator::Default, epoch);
        heap.push(fake_request_at(epoch, 1, 0, false, false));
        heap.push(fake_request_at(epoch, 2, 0, false, false));
        heap.push(fake_request_at(epoch, 3, 0, false, false));
        let drained = heap.drain_while(|r| r.priority() < 3);
        assert_eq!(drained.len(), 2);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn len_tracks_membership_exactly() {
        let epoch = Instant::now();
        let mut heap = RequestHeap::new(Comparator::Default, epoch);
        assert_eq!(heap.len(), 0);
        heap.push(fake_request(0, false, false));
        assert_eq!(heap.len(), 1);
        heap.pop();
        assert_eq!(heap.len(), 0);
    }

    fn fake_request_at(
        epoch: Instant,
        priority: i32,
        rounds: u32,
        accounting: bool,
        proxied: bool,
    ) -> RequestHandle {
        let _ = epoch;
        crate::test_support::fake_request_full(priority, rounds, accounting, proxied)
    }

    fn same(a: &RequestHandle, b: &RequestHandle) -> bool {
        std::sync::Arc::ptr_eq(a, b)
    }
}
