//! Waker implementation with deduplication.
//!
//! Waking a fiber appends its id to the ready queue unless it is already
//! queued, so a fiber woken several times between two polls runs once.
//! Queue order is first-woken, first-run.
//!
//! Note: This implementation uses safe Rust only (no unsafe).

use crate::types::FiberId;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::task::{Wake, Waker};

#[derive(Debug, Default)]
struct Queue {
    order: VecDeque<FiberId>,
    queued: HashSet<FiberId>,
}

/// The ready queue shared by every fiber waker of one runtime.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    inner: Mutex<Queue>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a waker that schedules `fiber`.
    pub(crate) fn waker_for(self: &Arc<Self>, fiber: FiberId) -> Waker {
        Waker::from(Arc::new(FiberWaker {
            queue: Arc::clone(self),
            fiber,
        }))
    }

    /// Schedules `fiber` unless it is already queued.
    pub(crate) fn wake(&self, fiber: FiberId) {
        let mut inner = self.inner.lock();
        if inner.queued.insert(fiber) {
            inner.order.push_back(fiber);
        }
    }

    /// Takes the next fiber to run.
    pub(crate) fn pop(&self) -> Option<FiberId> {
        let mut inner = self.inner.lock();
        let fiber = inner.order.pop_front()?;
        inner.queued.remove(&fiber);
        Some(fiber)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.queued.clear();
    }
}

/// A waker for a specific fiber.
struct FiberWaker {
    queue: Arc<ReadyQueue>,
    fiber: FiberId,
}

impl Wake for FiberWaker {
    fn wake(self: Arc<Self>) {
        self.queue.wake(self.fiber);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.wake(self.fiber);
    }
}
