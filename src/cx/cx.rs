//! The fiber capability context.
//!
//! `Cx` is the token a fiber body receives. Everything a fiber can do to the
//! runtime goes through it:
//!
//! - Querying identity and status (`id`, `descriptor`, `interrupt_status`)
//! - Suspending (`sleep`, `yield_now`) and observing interruption (`checkpoint`)
//! - Forking children (`fork`, `fork_daemon`, `fork_in`)
//! - Reading and writing fiber-local values (`get_ref`, `set_ref`, `locally`)
//!
//! The interruption and fork-scope combinators live in sibling modules and are
//! also methods on `Cx`.
//!
//! # Effects
//!
//! An effect is a closure from `Cx` to a future of `Result<A, Cause<E>>`:
//!
//! ```ignore
//! let fiber = cx.fork(|cx: Cx| async move {
//!     cx.sleep(Duration::from_millis(10)).await?;
//!     Ok::<_, Cause<MyError>>(42)
//! });
//! let value = fiber.join(&cx).await?;
//! ```
//!
//! Suspension points return [`Interrupted`] when the calling fiber has been
//! interrupted while interruptible; `?` turns that into an `Interrupt` cause.
//!
//! # Thread Safety
//!
//! `Cx` is `Send + Sync` and cheap to clone, but it names one fiber. Passing
//! it into another fiber's body makes that body act on the wrong fiber; use the
//! `Cx` each fork hands you instead.

use crate::fiber::{FiberDescriptor, FiberRef, RuntimeFiber};
use crate::record::FiberRecord;
use crate::runtime::state::RuntimeState;
use crate::scope::Scope;
use crate::types::{Cause, FiberId, InterruptStatus, Interrupted, Time};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// The capability context of one fiber.
#[derive(Clone)]
pub struct Cx {
    record: Arc<FiberRecord>,
    runtime: Arc<RuntimeState>,
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("fiber", &self.record.id())
            .field("interrupt_status", &self.record.interrupt_status())
            .finish_non_exhaustive()
    }
}

impl Cx {
    pub(crate) fn new(record: Arc<FiberRecord>, runtime: Arc<RuntimeState>) -> Self {
        Self { record, runtime }
    }

    pub(crate) fn record(&self) -> &Arc<FiberRecord> {
        &self.record
    }

    pub(crate) fn runtime(&self) -> &Arc<RuntimeState> {
        &self.runtime
    }

    /// Returns the id of the current fiber.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.record.id()
    }

    /// Returns the runtime's virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.runtime.now()
    }

    /// Returns a snapshot of the current fiber.
    #[must_use]
    pub fn descriptor(&self) -> FiberDescriptor {
        FiberDescriptor::capture(&self.record)
    }

    /// Returns the ambient interrupt status.
    #[must_use]
    pub fn interrupt_status(&self) -> InterruptStatus {
        self.record.interrupt_status()
    }

    /// Returns the fibers that have requested interruption of this one.
    #[must_use]
    pub fn interruptors(&self) -> BTreeSet<FiberId> {
        self.record.interruptors()
    }

    /// Interruption checkpoint.
    ///
    /// Returns `Err` if an interruption is pending and the fiber is currently
    /// interruptible. Inside an uninterruptible region this always succeeds
    /// and the request stays queued.
    ///
    /// ```ignore
    /// for item in items {
    ///     cx.checkpoint()?;
    ///     process(item);
    /// }
    /// ```
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        self.record.checkpoint()
    }

    pub(crate) fn note_suspension(&self, blocking_on: &[FiberId]) {
        self.record.note_suspension(blocking_on);
    }

    /// Suspends once, letting every other ready fiber run first.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow {
            cx: self.clone(),
            yielded: false,
        }
    }

    /// Suspends for `duration` of virtual time.
    ///
    /// The clock only moves when no fiber is runnable, so a sleeping fiber
    /// resumes at exactly `now + duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep {
            cx: self.clone(),
            duration,
            deadline: None,
        }
    }

    /// Returns the runtime's global (daemon) scope.
    #[must_use]
    pub fn global_scope(&self) -> Scope {
        self.runtime.global_scope().clone()
    }

    /// Returns the current fiber's own scope.
    ///
    /// It closes when the fiber finishes, interrupting any child still
    /// attached to it.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.record.scope().clone()
    }

    /// Returns the scope [`fork`](Self::fork) attaches children to: the
    /// innermost fork-scope override, or the fiber's own scope.
    #[must_use]
    pub fn fork_scope(&self) -> Scope {
        self.record
            .with_state(|state| state.fork_scope.clone())
            .unwrap_or_else(|| self.record.scope().clone())
    }

    /// Returns the concurrency bound for parallel combinators.
    #[must_use]
    pub fn parallelism(&self) -> Option<usize> {
        self.record.with_state(|state| state.parallelism)
    }

    /// Forks `f` into the current fork scope.
    ///
    /// The child inherits the caller's interrupt status, parallelism and
    /// fiber-local values, and is interrupted when the fork scope closes.
    pub fn fork<E, A, F, Fut>(&self, f: F) -> RuntimeFiber<E, A>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        self.fork_in(&self.fork_scope(), f)
    }

    /// Forks `f` into the global scope. The child outlives the caller.
    pub fn fork_daemon<E, A, F, Fut>(&self, f: F) -> RuntimeFiber<E, A>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        self.fork_in(self.runtime.global_scope(), f)
    }

    /// Forks `f` into `scope`.
    ///
    /// If `scope` is already closed the child is interrupted immediately,
    /// attributed to the caller.
    pub fn fork_in<E, A, F, Fut>(&self, scope: &Scope, f: F) -> RuntimeFiber<E, A>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        self.runtime.spawn(Some(&self.record), scope, f)
    }

    /// Reads a fiber-local value.
    #[must_use]
    pub fn get_ref<V>(&self, fiber_ref: &FiberRef<V>) -> V
    where
        V: Clone + Send + Sync + 'static,
    {
        self.record.with_state(|state| state.refs.get(fiber_ref))
    }

    /// Writes a fiber-local value.
    pub fn set_ref<V>(&self, fiber_ref: &FiberRef<V>, value: V)
    where
        V: Clone + Send + Sync + 'static,
    {
        self.record
            .with_state(|state| state.refs.set(fiber_ref, value));
    }

    /// Updates a fiber-local value, returning the new value.
    pub fn update_ref<V>(&self, fiber_ref: &FiberRef<V>, f: impl FnOnce(V) -> V) -> V
    where
        V: Clone + Send + Sync + 'static,
    {
        self.record.with_state(|state| {
            let next = f(state.refs.get(fiber_ref));
            state.refs.set(fiber_ref, next.clone());
            next
        })
    }

    /// Runs `fut` with `fiber_ref` set to `value`, restoring the previous value
    /// afterwards whatever the outcome.
    pub async fn locally<V, T, Fut>(&self, fiber_ref: &FiberRef<V>, value: V, fut: Fut) -> T
    where
        V: Clone + Send + Sync + 'static,
        Fut: Future<Output = T>,
    {
        let previous = self.get_ref(fiber_ref);
        self.set_ref(fiber_ref, value);
        let out = fut.await;
        self.set_ref(fiber_ref, previous);
        out
    }

    /// Joins a child's fiber-local values into this fiber.
    pub(crate) fn inherit_refs(&self, child: &crate::fiber::FiberRefs) {
        self.record.with_state(|state| state.refs.inherit(child));
    }
}

/// Future returned by [`Cx::yield_now`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct YieldNow {
    cx: Cx,
    yielded: bool,
}

impl Future for YieldNow {
    type Output = Result<(), Interrupted>;

    fn poll(mut self: Pin<&mut Self>, task: &mut Context<'_>) -> Poll<Self::Output> {
        self.cx.checkpoint()?;
        if self.yielded {
            return Poll::Ready(Ok(()));
        }
        self.yielded = true;
        self.cx.note_suspension(&[]);
        task.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Future returned by [`Cx::sleep`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Sleep {
    cx: Cx,
    duration: Duration,
    deadline: Option<Time>,
}

impl Future for Sleep {
    type Output = Result<(), Interrupted>;

    fn poll(mut self: Pin<&mut Self>, _task: &mut Context<'_>) -> Poll<Self::Output> {
        self.cx.checkpoint()?;
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => {
                let deadline = self.cx.now() + self.duration;
                self.deadline = Some(deadline);
                self.cx.runtime.register_timer(self.cx.id(), deadline);
                deadline
            }
        };
        if self.cx.now() >= deadline {
            return Poll::Ready(Ok(()));
        }
        self.cx.note_suspension(&[]);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::test_utils::init_test_logging;
    use crate::types::Exit;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn sleeping_fibers_wake_in_deadline_order() {
        init_test("sleeping_fibers_wake_in_deadline_order");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let slow = cx.fork(|cx: Cx| async move {
                cx.sleep(Duration::from_millis(30)).await?;
                Ok::<_, Cause<()>>(cx.now())
            });
            let fast = cx.fork(|cx: Cx| async move {
                cx.sleep(Duration::from_millis(10)).await?;
                Ok::<_, Cause<()>>(cx.now())
            });
            let fast_at = fast.join(&cx).await?;
            let slow_at = slow.join(&cx).await?;
            Ok::<_, Cause<()>>((fast_at, slow_at))
        });
        assert_eq!(
            exit,
            Exit::succeed((Time::from_millis(10), Time::from_millis(30)))
        );
        crate::test_complete!("sleeping_fibers_wake_in_deadline_order");
    }

    #[test]
    fn zero_sleep_completes_without_suspending() {
        init_test("zero_sleep_completes_without_suspending");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            cx.sleep(Duration::ZERO).await?;
            Ok::<_, Cause<()>>(cx.now())
        });
        assert_eq!(exit, Exit::succeed(Time::ZERO));
        crate::test_complete!("zero_sleep_completes_without_suspending");
    }

    #[test]
    fn fiber_refs_are_forked_and_joined() {
        init_test("fiber_refs_are_forked_and_joined");
        let counter = FiberRef::with_combinators(0_i64, |v| *v, |parent, child| parent + child);
        let rt = Runtime::new();
        let r = counter.clone();
        let exit = rt.run(move |cx: Cx| async move {
            cx.set_ref(&r, 10);
            let child_ref = r.clone();
            let child = cx.fork(move |cx: Cx| async move {
                let seen = cx.get_ref(&child_ref);
                cx.update_ref(&child_ref, |v| v + 5);
                Ok::<_, Cause<()>>(seen)
            });
            let seen_by_child = child.join(&cx).await?;
            Ok::<_, Cause<()>>((seen_by_child, cx.get_ref(&r)))
        });
        assert_eq!(exit, Exit::succeed((10, 25)));
        crate::test_complete!("fiber_refs_are_forked_and_joined");
    }

    #[test]
    fn locally_restores_previous_value() {
        init_test("locally_restores_previous_value");
        let name = FiberRef::new(String::from("outer"));
        let rt = Runtime::new();
        let r = name.clone();
        let exit = rt.run(move |cx: Cx| async move {
            let inner = cx
                .locally(&r, String::from("inner"), async { cx.get_ref(&r) })
                .await;
            Ok::<_, Cause<()>>((inner, cx.get_ref(&r)))
        });
        assert_eq!(
            exit,
            Exit::succeed((String::from("inner"), String::from("outer")))
        );
        crate::test_complete!("locally_restores_previous_value");
    }

    #[test]
    fn descriptor_describes_current_fiber() {
        init_test("descriptor_describes_current_fiber");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let d = cx.descriptor();
            Ok::<_, Cause<()>>((d.id == cx.id(), d.scope == cx.scope().id(), d.status))
        });
        assert_eq!(
            exit,
            Exit::succeed((true, true, crate::types::FiberStatus::INITIAL))
        );
        crate::test_complete!("descriptor_describes_current_fiber");
    }
}
