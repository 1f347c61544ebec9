//! Single-assignment synchronization variable.
//!
//! A [`Promise`] starts pending with an empty joiner list and is completed at
//! most once with an [`Exit`]. Every completion operation (`succeed`, `fail`,
//! `halt`, `interrupt_as`, ...) funnels through [`Promise::done`].
//!
//! # Atomicity
//!
//! The pending/done state and the joiner list live under one mutex, so joiner
//! registration, joiner removal and completion are all linearizable: a joiner is
//! either registered before completion (and notified) or observes the stored
//! exit directly. Once `Done` is installed it never reverts.
//!
//! # Notification order
//!
//! Joiners are invoked outside the lock, in the reverse of registration order.
//!
//! # Cancellation
//!
//! An awaiting fiber that is interrupted, or whose await future is dropped,
//! removes its own joiner entry before returning.

use crate::cx::Cx;
use crate::types::{Cause, Defect, Exit, FiberId, Interrupted};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

type Joiner<E, A> = Box<dyn FnOnce(&Exit<E, A>) + Send>;

enum PromiseState<E, A> {
    Pending {
        joiners: Vec<(u64, Joiner<E, A>)>,
        next_key: u64,
    },
    Done(Exit<E, A>),
}

struct PromiseInner<E, A> {
    state: Mutex<PromiseState<E, A>>,
    blocking_on: SmallVec<[FiberId; 1]>,
}

/// A single-assignment variable that fibers can await.
pub struct Promise<E, A> {
    inner: Arc<PromiseInner<E, A>>,
}

impl<E, A> Clone for Promise<E, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, A> std::fmt::Debug for Promise<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let done = matches!(*self.inner.state.lock(), PromiseState::Done(_));
        f.debug_struct("Promise")
            .field("done", &done)
            .field("blocking_on", &self.inner.blocking_on)
            .finish()
    }
}

impl<E, A> Default for Promise<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::make()
    }
}

impl<E, A> Promise<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    /// Creates a pending promise.
    #[must_use]
    pub fn make() -> Self {
        Self::with_blocking_on(SmallVec::new())
    }

    /// Creates a pending promise whose waiters report they are blocked on `id`.
    #[must_use]
    pub fn make_as(id: FiberId) -> Self {
        Self::with_blocking_on(smallvec::smallvec![id])
    }

    fn with_blocking_on(blocking_on: SmallVec<[FiberId; 1]>) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                state: Mutex::new(PromiseState::Pending {
                    joiners: Vec::new(),
                    next_key: 0,
                }),
                blocking_on,
            }),
        }
    }

    /// Completes with `exit`. Returns `false` if already completed.
    pub fn done(&self, exit: Exit<E, A>) -> bool {
        let joiners = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                PromiseState::Done(_) => return false,
                PromiseState::Pending { joiners, .. } => {
                    let joiners = std::mem::take(joiners);
                    *state = PromiseState::Done(exit.clone());
                    joiners
                }
            }
        };
        for (_, joiner) in joiners.into_iter().rev() {
            joiner(&exit);
        }
        true
    }

    /// Completes with a value.
    pub fn succeed(&self, value: A) -> bool {
        self.done(Exit::Success(value))
    }

    /// Completes with a typed failure.
    pub fn fail(&self, error: E) -> bool {
        self.done(Exit::fail(error))
    }

    /// Completes with an arbitrary cause.
    pub fn fail_cause(&self, cause: Cause<E>) -> bool {
        self.done(Exit::Failure(cause))
    }

    /// Completes with a defect.
    pub fn halt(&self, defect: Defect) -> bool {
        self.done(Exit::halt(defect))
    }

    /// Completes with a defect carrying `message`.
    pub fn die(&self, message: impl Into<String>) -> bool {
        self.done(Exit::die(message))
    }

    /// Completes with an interruption attributed to `id`.
    pub fn interrupt_as(&self, id: FiberId) -> bool {
        self.done(Exit::interrupt(id))
    }

    /// Completes with an interruption attributed to the calling fiber.
    pub fn interrupt(&self, cx: &Cx) -> bool {
        self.interrupt_as(cx.id())
    }

    /// Runs `effect` and completes with its outcome.
    pub async fn complete<F>(&self, effect: F) -> bool
    where
        F: Future<Output = Result<A, Cause<E>>>,
    {
        let exit = Exit::from(effect.await);
        self.done(exit)
    }

    /// Non-blocking read of the stored exit.
    #[must_use]
    pub fn poll(&self) -> Option<Exit<E, A>> {
        match &*self.inner.state.lock() {
            PromiseState::Done(exit) => Some(exit.clone()),
            PromiseState::Pending { .. } => None,
        }
    }

    /// Returns true once completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(*self.inner.state.lock(), PromiseState::Done(_))
    }

    /// Number of registered joiners (zero once completed).
    #[must_use]
    pub fn joiner_count(&self) -> usize {
        match &*self.inner.state.lock() {
            PromiseState::Pending { joiners, .. } => joiners.len(),
            PromiseState::Done(_) => 0,
        }
    }

    /// Suspends until completed, yielding the stored exit.
    ///
    /// Fails only if the *calling* fiber is interrupted while waiting.
    pub fn await_exit(&self, cx: &Cx) -> PromiseAwait<E, A> {
        PromiseAwait {
            promise: self.clone(),
            cx: cx.clone(),
            state: AwaitState::Init,
        }
    }

    /// Suspends until completed, yielding the value or the stored cause.
    pub async fn wait(&self, cx: &Cx) -> Result<A, Cause<E>> {
        self.await_exit(cx).await?.into_result()
    }

    /// Registers `joiner`, or hands back the exit if already completed.
    fn register(&self, joiner: Joiner<E, A>) -> Result<u64, Exit<E, A>> {
        let mut state = self.inner.state.lock();
        match &mut *state {
            PromiseState::Done(exit) => Err(exit.clone()),
            PromiseState::Pending { joiners, next_key } => {
                let key = *next_key;
                *next_key += 1;
                joiners.push((key, joiner));
                Ok(key)
            }
        }
    }

    fn unregister(&self, key: u64) {
        if let PromiseState::Pending { joiners, .. } = &mut *self.inner.state.lock() {
            joiners.retain(|(k, _)| *k != key);
        }
    }
}

struct JoinSlot<E, A> {
    exit: Option<Exit<E, A>>,
    waker: Waker,
}

enum AwaitState<E, A> {
    Init,
    Waiting {
        key: u64,
        slot: Arc<Mutex<JoinSlot<E, A>>>,
    },
    Done,
}

/// Future returned by [`Promise::await_exit`].
#[must_use = "futures do nothing unless polled"]
pub struct PromiseAwait<E, A> {
    promise: Promise<E, A>,
    cx: Cx,
    state: AwaitState<E, A>,
}

impl<E, A> Future for PromiseAwait<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    type Output = Result<Exit<E, A>, Interrupted>;

    fn poll(self: Pin<&mut Self>, task: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &this.state {
            AwaitState::Done => return Poll::Pending,
            AwaitState::Init => {
                if let Some(exit) = this.promise.poll() {
                    this.state = AwaitState::Done;
                    return Poll::Ready(Ok(exit));
                }
            }
            AwaitState::Waiting { slot, .. } => {
                let mut slot = slot.lock();
                if let Some(exit) = slot.exit.take() {
                    drop(slot);
                    this.state = AwaitState::Done;
                    return Poll::Ready(Ok(exit));
                }
                slot.waker.clone_from(task.waker());
            }
        }

        if let Err(interrupted) = this.cx.checkpoint() {
            if let AwaitState::Waiting { key, .. } =
                std::mem::replace(&mut this.state, AwaitState::Done)
            {
                this.promise.unregister(key);
            }
            return Poll::Ready(Err(interrupted));
        }

        if matches!(this.state, AwaitState::Init) {
            let slot = Arc::new(Mutex::new(JoinSlot {
                exit: None,
                waker: task.waker().clone(),
            }));
            let notify = Arc::clone(&slot);
            let joiner: Joiner<E, A> = Box::new(move |exit: &Exit<E, A>| {
                let waker = {
                    let mut slot = notify.lock();
                    slot.exit = Some(exit.clone());
                    slot.waker.clone()
                };
                waker.wake();
            });
            match this.promise.register(joiner) {
                Ok(key) => this.state = AwaitState::Waiting { key, slot },
                Err(exit) => {
                    this.state = AwaitState::Done;
                    return Poll::Ready(Ok(exit));
                }
            }
        }

        this.cx.note_suspension(&this.promise.inner.blocking_on);
        Poll::Pending
    }
}

impl<E, A> Drop for PromiseAwait<E, A> {
    fn drop(&mut self) {
        if let AwaitState::Waiting { key, .. } = self.state {
            if let PromiseState::Pending { joiners, .. } = &mut *self.promise.inner.state.lock() {
                joiners.retain(|(k, _)| *k != key);
            }
        }
    }
}
