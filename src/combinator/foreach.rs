//! Parallel traversal: run one effect per element, collect in input order.
//!
//! # Semantics
//!
//! ```text
//! foreach_par(xs, f):
//!   all succeed      -> Ok([f(x0), f(x1), ...])   // input order, not finish order
//!   first failure    -> siblings interrupted, Err(cause)
//!   caller interrupted -> every child interrupted and awaited, Err(interrupt)
//! ```
//!
//! # Critical Invariant: No Orphans
//!
//! The traversal never returns while one of its children is still running.
//! On the failure path every sibling receives exactly one interruption
//! attributed to the caller and is awaited before the combined cause is
//! reported. Those self-inflicted interruptions are stripped from the cause,
//! so the caller sees the failure that triggered the teardown, not the noise.
//!
//! # Bounded Parallelism
//!
//! [`foreach_par_n`] feeds `(element, index)` pairs through a fixed-size
//! queue drained by `n` workers; each result lands at its original index.
//! [`foreach_par`] picks the bounded form whenever the calling fiber has a
//! parallelism bound (see [`Cx::with_parallelism`]).
//!
//! # Supervision
//!
//! Element fibers are forked through a [`Grafter`](crate::cx::Grafter), so
//! anything an element forks is supervised by the caller's fork scope rather
//! than by the short-lived element fiber.

use crate::cx::Cx;
use crate::fiber::RuntimeFiber;
use crate::sync::Promise;
use crate::tracing_compat::debug;
use crate::types::{Cause, ErasedExit, Exit, FiberId};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts finished elements and trips a shared promise on the first failure
/// or once every element has succeeded.
#[derive(Clone)]
struct Tally {
    size: usize,
    succeeded: Arc<AtomicUsize>,
    settled: Promise<(), ()>,
}

impl Tally {
    fn new(size: usize) -> Self {
        Self {
            size,
            succeeded: Arc::new(AtomicUsize::new(0)),
            settled: Promise::make(),
        }
    }

    fn record(&self, exit: &ErasedExit) {
        if exit.is_success() {
            if self.succeeded.fetch_add(1, Ordering::AcqRel) + 1 == self.size {
                self.settled.succeed(());
            }
        } else {
            self.settled.fail(());
        }
    }

    /// Hooks the tally onto the fiber's own scope, which closes with the
    /// fiber's exit whether it ran, panicked or was interrupted before start.
    fn watch<E, B>(&self, fiber: &RuntimeFiber<E, B>)
    where
        E: Clone + Send + 'static,
        B: Clone + Send + 'static,
    {
        let scope = fiber.scope().clone();
        let tally = self.clone();
        let added = scope.add_finalizer(move |_cx: Cx, exit: ErasedExit| {
            tally.record(&exit);
            std::future::ready(())
        });
        if added.is_none() {
            if let Some(exit) = scope.closed_exit() {
                self.record(&exit);
            }
        }
    }
}

/// Applies `f` to every element in parallel, using the caller's parallelism
/// bound if one is set and no bound otherwise.
pub async fn foreach_par<I, B, E, F, Fut>(
    cx: &Cx,
    items: impl IntoIterator<Item = I>,
    f: F,
) -> Result<Vec<B>, Cause<E>>
where
    I: Send + 'static,
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: Fn(Cx, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    match cx.parallelism() {
        Some(n) => foreach_par_n(cx, n, items, f).await,
        None => foreach_par_unbounded(cx, items, f).await,
    }
}

/// Applies `f` to every element, one fiber per element.
pub async fn foreach_par_unbounded<I, B, E, F, Fut>(
    cx: &Cx,
    items: impl IntoIterator<Item = I>,
    f: F,
) -> Result<Vec<B>, Cause<E>>
where
    I: Send + 'static,
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: Fn(Cx, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    let items: Vec<I> = items.into_iter().collect();
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let f = Arc::new(f);
    let cx = cx.clone();
    cx.clone()
        .uninterruptible_mask(move |restore| async move {
            let parent = cx.id();
            let tally = Tally::new(items.len());
            debug!(fiber = %parent, elements = items.len(), "foreach_par starting");

            let fibers: Vec<RuntimeFiber<E, B>> = cx
                .transplant(|graft| {
                    let fibers = items
                        .into_iter()
                        .map(|item| {
                            let f = Arc::clone(&f);
                            cx.fork(graft.graft(move |child: Cx| async move {
                                let body = f(child.clone(), item);
                                restore.run(&child, body).await
                            }))
                        })
                        .collect::<Vec<_>>();
                    std::future::ready(fibers)
                })
                .await;
            for fiber in &fibers {
                tally.watch(fiber);
            }

            match restore.run(&cx, tally.settled.await_exit(&cx)).await {
                Ok(Exit::Success(())) => collect_successes(&cx, parent, &fibers).await,
                Ok(Exit::Failure(_)) => {
                    let children = tear_down(&cx, parent, &fibers).await;
                    debug!(fiber = %parent, "foreach_par failed, siblings interrupted");
                    Err(if children.is_empty() {
                        Cause::interrupt(parent)
                    } else {
                        children
                    })
                }
                Err(interrupted) => {
                    let children = tear_down(&cx, parent, &fibers).await;
                    Err(Cause::from(interrupted).both(children))
                }
            }
        })
        .await
}

/// Gathers the values of a traversal whose elements all succeeded.
async fn collect_successes<E, B>(
    cx: &Cx,
    parent: FiberId,
    fibers: &[RuntimeFiber<E, B>],
) -> Result<Vec<B>, Cause<E>>
where
    E: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    let mut values = Vec::with_capacity(fibers.len());
    for fiber in fibers {
        // The last element trips the tally from its scope finalizer, a step
        // before its exit is published.
        match fiber.await_exit(cx).await {
            Ok(Exit::Success(value)) => {
                fiber.inherit_refs(cx);
                values.push(value);
            }
            Ok(Exit::Failure(cause)) => return Err(cause.strip_interrupts_by(parent)),
            Err(interrupted) => return Err(interrupted.into()),
        }
    }
    Ok(values)
}

/// Interrupts every unfinished child on behalf of `parent`, waits for all of
/// them, and combines their failures minus the interruptions `parent` sent.
async fn tear_down<E, B>(cx: &Cx, parent: FiberId, fibers: &[RuntimeFiber<E, B>]) -> Cause<E>
where
    E: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    for fiber in fibers {
        fiber.record().request_interrupt(parent);
    }
    let mut combined = Cause::Empty;
    for fiber in fibers {
        let exit = cx.shielded(fiber.await_exit(cx)).await;
        if let Ok(Exit::Failure(cause)) = exit {
            combined = combined.both(cause);
        }
    }
    combined.strip_interrupts_by(parent)
}

/// Applies `f` to every element with at most `n` elements in flight.
///
/// `n` is clamped to at least one. Results keep the input order.
pub async fn foreach_par_n<I, B, E, F, Fut>(
    cx: &Cx,
    n: usize,
    items: impl IntoIterator<Item = I>,
    f: F,
) -> Result<Vec<B>, Cause<E>>
where
    I: Send + 'static,
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: Fn(Cx, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    let items: Vec<I> = items.into_iter().collect();
    let size = items.len();
    if size == 0 {
        return Ok(Vec::new());
    }
    let queue = Arc::new(ArrayQueue::new(size));
    for entry in items.into_iter().enumerate() {
        let displaced = queue.force_push(entry);
        debug_assert!(displaced.is_none(), "queue sized to the input");
    }
    let slots: Arc<Mutex<Vec<Option<B>>>> = Arc::new(Mutex::new(vec![None; size]));
    let workers = n.max(1).min(size);
    debug!(fiber = %cx.id(), elements = size, workers, "foreach_par_n starting");

    let f = Arc::new(f);
    let worker_slots = Arc::clone(&slots);
    foreach_par_unbounded(cx, 0..workers, move |cx: Cx, _worker: usize| {
        let queue = Arc::clone(&queue);
        let slots = Arc::clone(&worker_slots);
        let f = Arc::clone(&f);
        async move {
            while let Some((index, item)) = queue.pop() {
                let value = f(cx.clone(), item).await?;
                slots.lock()[index] = Some(value);
            }
            Ok::<_, Cause<E>>(())
        }
    })
    .await?;

    let values: Option<Vec<B>> = std::mem::take(&mut *slots.lock()).into_iter().collect();
    values.ok_or_else(|| Cause::die("bounded traversal finished with an unfilled slot"))
}

/// Runs every effect in parallel and collects the values in input order.
pub async fn collect_all_par<B, E, Eff, Fut>(
    cx: &Cx,
    effects: impl IntoIterator<Item = Eff>,
) -> Result<Vec<B>, Cause<E>>
where
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Eff: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    foreach_par(cx, effects, |cx: Cx, effect: Eff| effect(cx)).await
}

/// Like [`collect_all_par`] with at most `n` effects in flight.
pub async fn collect_all_par_n<B, E, Eff, Fut>(
    cx: &Cx,
    n: usize,
    effects: impl IntoIterator<Item = Eff>,
) -> Result<Vec<B>, Cause<E>>
where
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Eff: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    foreach_par_n(cx, n, effects, |cx: Cx, effect: Eff| effect(cx)).await
}

/// Applies `f` to every element in parallel for its effect only.
pub async fn foreach_par_discard<I, B, E, F, Fut>(
    cx: &Cx,
    items: impl IntoIterator<Item = I>,
    f: F,
) -> Result<(), Cause<E>>
where
    I: Send + 'static,
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
    F: Fn(Cx, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    foreach_par(cx, items, f).await.map(|_| ())
}
