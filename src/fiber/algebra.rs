//! Combinators that build synthetic fibers from other fibers.
//!
//! Nothing here forks. Each combinator wires the capabilities of its inputs
//! together:
//!
//! - `await_exit` waits for every input and merges the exits, with concurrent
//!   failures combined by [`Cause::both`]
//! - `poll` is `Some` only once every input's poll is `Some`
//! - `interrupt_as` interrupts the inputs one after the other
//! - `refs` merges the inputs' fiber-local values with each ref's `join`
//!
//! [`Fiber::collect_all`] walks its inputs in one loop instead of nesting
//! [`Fiber::cross_with`], so it handles any number of fibers and the output
//! order always matches the input order.

use super::{Fiber, FiberOps, FiberRefs, SyntheticFiber};
use crate::cx::Cx;
use crate::sync::Promise;
use crate::types::{Cause, Defect, Exit, FiberId, Interrupted};
use std::future::Future;
use std::sync::Arc;

impl<E, A> Fiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    /// A fiber that is already done with `exit`.
    #[must_use]
    pub fn done(exit: Exit<E, A>) -> Self {
        Self::Synthetic(SyntheticFiber::done(exit))
    }

    /// A fiber that already succeeded with `value`.
    #[must_use]
    pub fn succeed(value: A) -> Self {
        Self::done(Exit::succeed(value))
    }

    /// A fiber that already failed with `error`.
    #[must_use]
    pub fn fail(error: E) -> Self {
        Self::done(Exit::fail(error))
    }

    /// A fiber that already died with `defect`.
    #[must_use]
    pub fn halt(defect: Defect) -> Self {
        Self::done(Exit::halt(defect))
    }

    /// A fiber that was already interrupted by `id`.
    #[must_use]
    pub fn interrupted(id: FiberId) -> Self {
        Self::done(Exit::interrupt(id))
    }

    /// Maps the fiber's value.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Fiber<E, B>
    where
        B: Clone + Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let (awaited, polled, interrupted, refs) =
            (self.clone(), self.clone(), self.clone(), self);
        let (await_f, poll_f, interrupt_f) = (Arc::clone(&f), Arc::clone(&f), f);
        Fiber::Synthetic(SyntheticFiber::new(
            move |cx: Cx| {
                let f = Arc::clone(&await_f);
                let pending = awaited.await_exit(&cx);
                async move { Ok::<_, Interrupted>(pending.await?.map(|a| f(a))) }
            },
            move || polled.poll().map(|exit| exit.map(|a| poll_f(a))),
            move |cx: Cx, by| {
                let f = Arc::clone(&interrupt_f);
                let pending = interrupted.interrupt_as(&cx, by);
                async move { pending.await.map(|a| f(a)) }
            },
            move || refs.refs(),
        ))
    }

    /// Maps the fiber's value with an effect.
    ///
    /// The effect runs on the fiber that awaits (or interrupts) the result, at
    /// most once: the first outcome is stored and every later await, poll or
    /// interrupt sees it. Until then `poll` is `None` even if the underlying
    /// fiber is done.
    #[must_use]
    pub fn map_io<B, F, Fut>(self, f: F) -> Fiber<E, B>
    where
        B: Clone + Send + 'static,
        F: Fn(Cx, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
    {
        let f = Arc::new(f);
        let cache: Promise<E, B> = Promise::make();
        let (awaited, interrupted, refs) = (self.clone(), self.clone(), self);
        let (await_f, interrupt_f) = (Arc::clone(&f), f);
        let (await_cache, poll_cache, interrupt_cache) = (cache.clone(), cache.clone(), cache);
        Fiber::Synthetic(SyntheticFiber::new(
            move |cx: Cx| {
                let f = Arc::clone(&await_f);
                let cache = await_cache.clone();
                let inner = awaited.clone();
                async move {
                    if let Some(exit) = cache.poll() {
                        return Ok(exit);
                    }
                    let exit = inner.await_exit(&cx).await?;
                    Ok::<_, Interrupted>(settle(&cx, &cache, exit, f.as_ref()).await)
                }
            },
            move || poll_cache.poll(),
            move |cx: Cx, by| {
                let f = Arc::clone(&interrupt_f);
                let cache = interrupt_cache.clone();
                let inner = interrupted.clone();
                async move {
                    if let Some(exit) = cache.poll() {
                        return exit;
                    }
                    let exit = inner.interrupt_as(&cx, by).await;
                    settle(&cx, &cache, exit, f.as_ref()).await
                }
            },
            move || refs.refs(),
        ))
    }

    /// Combines this fiber with `other`.
    ///
    /// The result succeeds with `f(a, b)` once both succeed; if either fails
    /// it fails, and if both fail the causes are combined with
    /// [`Cause::both`]. Interruption goes to `self` first, then to `other`.
    #[must_use]
    pub fn cross_with<B, C, F>(self, other: Fiber<E, B>, f: F) -> Fiber<E, C>
    where
        B: Clone + Send + 'static,
        C: Clone + Send + 'static,
        F: Fn(A, B) -> C + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let left = self;
        let right = other;
        let (await_l, await_r) = (left.clone(), right.clone());
        let (poll_l, poll_r) = (left.clone(), right.clone());
        let (interrupt_l, interrupt_r) = (left.clone(), right.clone());
        let (await_f, poll_f, interrupt_f) = (Arc::clone(&f), Arc::clone(&f), f);
        Fiber::Synthetic(SyntheticFiber::new(
            move |cx: Cx| {
                let f = Arc::clone(&await_f);
                let l = await_l.await_exit(&cx);
                let r = await_r.await_exit(&cx);
                async move {
                    let a = l.await?;
                    let b = r.await?;
                    Ok::<_, Interrupted>(a.zip_with(b, |a, b| f(a, b), Cause::both))
                }
            },
            move || {
                let a = poll_l.poll()?;
                let b = poll_r.poll()?;
                Some(a.zip_with(b, |a, b| poll_f(a, b), Cause::both))
            },
            move |cx: Cx, by| {
                let f = Arc::clone(&interrupt_f);
                let (l, r) = (interrupt_l.clone(), interrupt_r.clone());
                async move {
                    let a = l.interrupt_as(&cx, by).await;
                    let b = r.interrupt_as(&cx, by).await;
                    a.zip_with(b, |a, b| f(a, b), Cause::both)
                }
            },
            move || left.refs().combine(&right.refs()),
        ))
    }

    /// Pairs the values of this fiber and `other`.
    #[must_use]
    pub fn zip<B>(self, other: Fiber<E, B>) -> Fiber<E, (A, B)>
    where
        B: Clone + Send + 'static,
    {
        self.cross_with(other, |a, b| (a, b))
    }

    /// Keeps this fiber's value, still waiting for `other`.
    #[must_use]
    pub fn zip_left<B>(self, other: Fiber<E, B>) -> Self
    where
        B: Clone + Send + 'static,
    {
        self.cross_with(other, |a, _| a)
    }

    /// Keeps `other`'s value, still waiting for this fiber.
    #[must_use]
    pub fn zip_right<B>(self, other: Fiber<E, B>) -> Fiber<E, B>
    where
        B: Clone + Send + 'static,
    {
        self.cross_with(other, |_, b| b)
    }

    /// Collects many fibers into one that yields their values in input order.
    ///
    /// The inputs are awaited and interrupted one after the other in a single
    /// loop, whatever their number.
    #[must_use]
    pub fn collect_all(fibers: impl IntoIterator<Item = Self>) -> Fiber<E, Vec<A>> {
        let fibers: Arc<[Self]> = fibers.into_iter().collect();
        let (awaited, polled, interrupted) =
            (Arc::clone(&fibers), Arc::clone(&fibers), Arc::clone(&fibers));
        Fiber::Synthetic(SyntheticFiber::new(
            move |cx: Cx| {
                let waits: Vec<_> = awaited.iter().map(|fiber| fiber.await_exit(&cx)).collect();
                async move {
                    let mut exits = Vec::with_capacity(waits.len());
                    for wait in waits {
                        exits.push(wait.await?);
                    }
                    Ok::<_, Interrupted>(merge_in_order(exits))
                }
            },
            move || {
                polled
                    .iter()
                    .map(|fiber| fiber.poll())
                    .collect::<Option<Vec<_>>>()
                    .map(merge_in_order)
            },
            move |cx: Cx, by| {
                let fibers = Arc::clone(&interrupted);
                async move {
                    let mut exits = Vec::with_capacity(fibers.len());
                    for fiber in fibers.iter() {
                        exits.push(fiber.interrupt_as(&cx, by).await);
                    }
                    merge_in_order(exits)
                }
            },
            move || {
                fibers
                    .iter()
                    .fold(FiberRefs::default(), |refs, fiber| refs.combine(&fiber.refs()))
            },
        ))
    }
}

/// Zips exits left to right; failures meet under [`Cause::both`].
fn merge_in_order<E, A>(exits: Vec<Exit<E, A>>) -> Exit<E, Vec<A>> {
    Exit::collect_all_par(exits).unwrap_or_else(|| Exit::succeed(Vec::new()))
}

/// Runs the continuation of [`Fiber::map_io`] once and stores its outcome.
async fn settle<E, A, B, F, Fut>(cx: &Cx, cache: &Promise<E, B>, exit: Exit<E, A>, f: &F) -> Exit<E, B>
where
    E: Clone + Send + 'static,
    B: Clone + Send + 'static,
    F: Fn(Cx, A) -> Fut,
    Fut: Future<Output = Result<B, Cause<E>>>,
{
    let mapped = match exit {
        Exit::Success(a) => Exit::from(f(cx.clone(), a).await),
        Exit::Failure(cause) => Exit::Failure(cause),
    };
    cache.done(mapped.clone());
    cache.poll().unwrap_or(mapped)
}

/// Waits for every fiber and yields their values in input order, joining
/// their fiber-local values into the caller on success.
pub async fn join_all<E, A>(
    cx: &Cx,
    fibers: impl IntoIterator<Item = Fiber<E, A>>,
) -> Result<Vec<A>, Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    Fiber::collect_all(fibers).join(cx).await
}

/// Waits for every fiber and yields the combined exit.
pub async fn await_all<E, A>(
    cx: &Cx,
    fibers: impl IntoIterator<Item = Fiber<E, A>>,
) -> Result<Exit<E, Vec<A>>, Interrupted>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    Fiber::collect_all(fibers).await_exit(cx).await
}

/// Interrupts every fiber on behalf of the caller, one after the other.
pub async fn interrupt_all<E, A>(cx: &Cx, fibers: impl IntoIterator<Item = Fiber<E, A>>)
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    interrupt_all_as(cx, cx.id(), fibers).await;
}

/// Interrupts every fiber, attributed to `by`, one after the other.
pub async fn interrupt_all_as<E, A>(
    cx: &Cx,
    by: FiberId,
    fibers: impl IntoIterator<Item = Fiber<E, A>>,
) where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    for fiber in fibers {
        fiber.interrupt_as(cx, by).await;
    }
}
