//! Internal fiber record.
//!
//! A [`FiberRecord`] is the runtime's view of one fiber: its lifecycle status,
//! ambient interruptibility, pending interruptors, fiber-local values and the
//! lexical overrides (fork scope, parallelism) installed by combinators. The
//! typed result lives in the fiber's own promise; the record only carries an
//! erased completion signal so scopes can await fibers of any type.

use crate::cx::Cx;
use crate::fiber::FiberRefs;
use crate::scope::Scope;
use crate::sync::Promise;
use crate::tracing_compat::debug;
use crate::types::{ErasedExit, FiberId, FiberStatus, InterruptStatus, Interrupted};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

/// State a child takes over from the fiber that forks it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Inherited {
    pub(crate) interrupt_status: InterruptStatus,
    pub(crate) refs: FiberRefs,
    pub(crate) parallelism: Option<usize>,
}

/// Mutable per-fiber state, guarded by the record's mutex.
#[derive(Debug)]
pub(crate) struct FiberState {
    pub(crate) status: FiberStatus,
    pub(crate) interrupt_status: InterruptStatus,
    pub(crate) interruptors: BTreeSet<FiberId>,
    pub(crate) fork_scope: Option<Scope>,
    pub(crate) parallelism: Option<usize>,
    pub(crate) refs: FiberRefs,
    blocking_on: Vec<FiberId>,
    suspended_interruptibly: Option<bool>,
    waker: Option<Waker>,
    epoch: u64,
}

/// The runtime record of a fiber.
#[derive(Debug)]
pub(crate) struct FiberRecord {
    id: FiberId,
    daemon: bool,
    scope: Scope,
    completion: Promise<(), ()>,
    observed: AtomicBool,
    state: Mutex<FiberState>,
}

impl FiberRecord {
    pub(crate) fn new(id: FiberId, daemon: bool, inherited: Inherited) -> Self {
        Self {
            id,
            daemon,
            scope: Scope::new(),
            completion: Promise::make_as(id),
            observed: AtomicBool::new(false),
            state: Mutex::new(FiberState {
                status: FiberStatus::INITIAL,
                interrupt_status: inherited.interrupt_status,
                interruptors: BTreeSet::new(),
                fork_scope: None,
                parallelism: inherited.parallelism,
                refs: inherited.refs,
                blocking_on: Vec::new(),
                suspended_interruptibly: None,
                waker: None,
                epoch: 0,
            }),
        }
    }

    pub(crate) const fn id(&self) -> FiberId {
        self.id
    }

    pub(crate) const fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// The scope that owns this fiber's children.
    pub(crate) const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Erased completion signal, completed after the typed exit.
    pub(crate) const fn completion(&self) -> &Promise<(), ()> {
        &self.completion
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut FiberState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) fn status(&self) -> FiberStatus {
        self.state.lock().status.clone()
    }

    pub(crate) fn interruptors(&self) -> BTreeSet<FiberId> {
        self.state.lock().interruptors.clone()
    }

    pub(crate) fn interrupt_status(&self) -> InterruptStatus {
        self.state.lock().interrupt_status
    }

    pub(crate) fn refs(&self) -> FiberRefs {
        self.state.lock().refs.clone()
    }

    /// What a child forked by this fiber starts with.
    pub(crate) fn inherited(&self) -> Inherited {
        let state = self.state.lock();
        Inherited {
            interrupt_status: state.interrupt_status,
            refs: state.refs.forked(),
            parallelism: state.parallelism,
        }
    }

    pub(crate) fn mark_observed(&self) {
        self.observed.store(true, Ordering::Release);
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }

    /// Records an interruption request attributed to `by`.
    ///
    /// Returns false if the fiber is already done. A fiber suspended
    /// interruptibly is woken so the suspension point can observe the request.
    pub(crate) fn request_interrupt(&self, by: FiberId) -> bool {
        let waker = {
            let mut state = self.state.lock();
            if state.status.is_done() {
                return false;
            }
            state.interruptors.insert(by);
            let status = std::mem::replace(&mut state.status, FiberStatus::Done);
            state.status = status.with_interrupting(true);
            if state.status.is_interruptibly_suspended() {
                state.waker.clone()
            } else {
                None
            }
        };
        debug!(fiber = %self.id, by = %by, "interruption requested");
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Fails if an interruption is pending and the fiber is interruptible.
    pub(crate) fn checkpoint(&self) -> Result<(), Interrupted> {
        let state = self.state.lock();
        if state.interrupt_status.is_interruptible() && !state.interruptors.is_empty() {
            Err(Interrupted::new(state.interruptors.iter().copied()))
        } else {
            Ok(())
        }
    }

    /// Records what the suspension point being entered is waiting on, and
    /// whether it can be interrupted.
    pub(crate) fn note_suspension(&self, ids: &[FiberId]) {
        let mut state = self.state.lock();
        state.blocking_on.clear();
        state.blocking_on.extend_from_slice(ids);
        state.suspended_interruptibly = Some(state.interrupt_status.is_interruptible());
    }

    /// Pops the suspension frame pushed by the previous poll.
    pub(crate) fn resume(&self, waker: &Waker) {
        let mut state = self.state.lock();
        let status = std::mem::replace(&mut state.status, FiberStatus::Done);
        state.status = status.resume();
        state.waker = Some(waker.clone());
    }

    /// Pushes a suspension frame after a poll returned pending.
    pub(crate) fn suspend(&self) {
        let mut state = self.state.lock();
        if state.status.is_done() {
            return;
        }
        let interruptible = state
            .suspended_interruptibly
            .take()
            .unwrap_or_else(|| state.interrupt_status.is_interruptible());
        let epoch = state.epoch;
        state.epoch += 1;
        let blocking_on = std::mem::take(&mut state.blocking_on);
        let status = std::mem::replace(&mut state.status, FiberStatus::Done);
        state.status = status.suspend(interruptible, epoch, blocking_on);
    }

    /// Moves to `Finishing`; the rest of the fiber's life is uninterruptible.
    pub(crate) fn begin_finishing(&self) {
        let mut state = self.state.lock();
        let status = std::mem::replace(&mut state.status, FiberStatus::Done);
        state.status = status.to_finishing();
        state.interrupt_status = InterruptStatus::Uninterruptible;
    }

    pub(crate) fn finish(&self) {
        let mut state = self.state.lock();
        state.status = FiberStatus::Done;
        state.waker = None;
        state.fork_scope = None;
    }

    /// Interrupts this fiber on behalf of a closing scope and waits for it.
    ///
    /// The interruption is attributed to the first interruptor recorded in the
    /// scope's exit, or to the closing fiber when there is none. A fiber closing
    /// its own scope is left alone.
    pub(crate) async fn interrupt_from_scope(&self, cx: &Cx, exit: &ErasedExit) {
        if cx.id() == self.id {
            return;
        }
        let by = exit.interruptors().into_iter().next().unwrap_or_else(|| cx.id());
        if !self.request_interrupt(by) {
            return;
        }
        let _ = self.completion.await_exit(cx).await;
    }
}
