//! Fibers assembled from other fibers.
//!
//! A [`SyntheticFiber`] has no status, scope or driver of its own. It is a
//! bundle of the four fiber capabilities, usually derived from one or more
//! underlying fibers by the combinators in [`super::algebra`].

use super::FiberRefs;
use crate::cx::Cx;
use crate::sync::Promise;
use crate::types::{BoxFuture, Exit, FiberId, Interrupted};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type AwaitFn<E, A> =
    Arc<dyn Fn(Cx) -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>> + Send + Sync>;
type PollFn<E, A> = Arc<dyn Fn() -> Option<Exit<E, A>> + Send + Sync>;
type InterruptFn<E, A> = Arc<dyn Fn(Cx, FiberId) -> BoxFuture<'static, Exit<E, A>> + Send + Sync>;
type RefsFn = Arc<dyn Fn() -> FiberRefs + Send + Sync>;

/// A fiber defined by its capabilities rather than by a running body.
pub struct SyntheticFiber<E, A> {
    await_fn: AwaitFn<E, A>,
    poll_fn: PollFn<E, A>,
    interrupt_fn: InterruptFn<E, A>,
    refs_fn: RefsFn,
}

impl<E, A> Clone for SyntheticFiber<E, A> {
    fn clone(&self) -> Self {
        Self {
            await_fn: Arc::clone(&self.await_fn),
            poll_fn: Arc::clone(&self.poll_fn),
            interrupt_fn: Arc::clone(&self.interrupt_fn),
            refs_fn: Arc::clone(&self.refs_fn),
        }
    }
}

impl<E, A> fmt::Debug for SyntheticFiber<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticFiber").finish_non_exhaustive()
    }
}

impl<E, A> SyntheticFiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    /// Builds a fiber from its await, poll, interrupt and fiber-local
    /// capabilities.
    pub fn new<AW, AF, P, I, IF, R>(await_fn: AW, poll_fn: P, interrupt_fn: I, refs_fn: R) -> Self
    where
        AW: Fn(Cx) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<Exit<E, A>, Interrupted>> + Send + 'static,
        P: Fn() -> Option<Exit<E, A>> + Send + Sync + 'static,
        I: Fn(Cx, FiberId) -> IF + Send + Sync + 'static,
        IF: Future<Output = Exit<E, A>> + Send + 'static,
        R: Fn() -> FiberRefs + Send + Sync + 'static,
    {
        Self {
            await_fn: Arc::new(
                move |cx: Cx| -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>> {
                    Box::pin(await_fn(cx))
                },
            ),
            poll_fn: Arc::new(poll_fn),
            interrupt_fn: Arc::new(move |cx: Cx, by: FiberId| -> BoxFuture<'static, Exit<E, A>> {
                Box::pin(interrupt_fn(cx, by))
            }),
            refs_fn: Arc::new(refs_fn),
        }
    }

    /// A fiber that is already done with `exit`.
    #[must_use]
    pub fn done(exit: Exit<E, A>) -> Self {
        let cell = Promise::make();
        cell.done(exit);
        let awaited = cell.clone();
        let polled = cell.clone();
        Self::new(
            move |cx: Cx| awaited.await_exit(&cx),
            move || polled.poll(),
            move |cx: Cx, _by| {
                let stored = cell.await_exit(&cx);
                async move {
                    stored
                        .await
                        .unwrap_or_else(|interrupted| Exit::Failure(interrupted.into()))
                }
            },
            FiberRefs::default,
        )
    }

    /// Suspends until the underlying fibers are done.
    pub fn await_exit(&self, cx: &Cx) -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>> {
        (self.await_fn)(cx.clone())
    }

    /// Returns the exit if every underlying fiber is done.
    #[must_use]
    pub fn poll(&self) -> Option<Exit<E, A>> {
        (self.poll_fn)()
    }

    /// Interrupts the underlying fibers, attributed to `by`, and waits.
    pub fn interrupt_as(&self, cx: &Cx, by: FiberId) -> BoxFuture<'static, Exit<E, A>> {
        (self.interrupt_fn)(cx.clone(), by)
    }

    /// The underlying fibers' fiber-local values, merged with each ref's
    /// `join`.
    #[must_use]
    pub fn refs(&self) -> FiberRefs {
        (self.refs_fn)()
    }
}
