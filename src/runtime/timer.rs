//! Sleep alarms on the virtual clock.
//!
//! `cx.sleep` parks a fiber and schedules an alarm for it here. Once the
//! ready queue runs dry the executor jumps the clock to [`Alarms::next_deadline`]
//! and resumes every fiber returned by [`Alarms::take_due`].
//!
//! Alarms are keyed by `(deadline, sequence)`. The sequence number grows with
//! every schedule, so sleepers sharing a deadline resume in the order they went
//! to sleep.

use crate::types::{FiberId, Time};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Default)]
pub(crate) struct Alarms {
    queue: BinaryHeap<Reverse<(Time, u64, FiberId)>>,
    sequence: u64,
}

impl Alarms {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Alarms not yet taken.
    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Wakes `sleeper` once the clock reaches `deadline`.
    pub(crate) fn schedule(&mut self, sleeper: FiberId, deadline: Time) {
        self.sequence += 1;
        self.queue.push(Reverse((deadline, self.sequence, sleeper)));
    }

    pub(crate) fn next_deadline(&self) -> Option<Time> {
        self.queue.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Removes and returns the sleepers due at `now`, earliest first.
    pub(crate) fn take_due(&mut self, now: Time) -> Vec<FiberId> {
        let mut due = Vec::new();
        while self.next_deadline().is_some_and(|deadline| deadline <= now) {
            if let Some(Reverse((_, _, sleeper))) = self.queue.pop() {
                due.push(sleeper);
            }
        }
        due
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
