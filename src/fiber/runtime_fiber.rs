//! Handles to fibers scheduled by the runtime.

use super::{FiberDump, FiberRef, FiberRefs};
use crate::cx::Cx;
use crate::record::FiberRecord;
use crate::scope::Scope;
use crate::sync::{Promise, PromiseAwait};
use crate::types::{Cause, Exit, FiberId, FiberStatus};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A handle to a fiber forked on a runtime.
///
/// Handles are cheap to clone; every clone refers to the same fiber. Dropping
/// all handles does not stop the fiber: it keeps running under the scope it was
/// forked into.
pub struct RuntimeFiber<E, A> {
    record: Arc<FiberRecord>,
    exit: Promise<E, A>,
}

impl<E, A> Clone for RuntimeFiber<E, A> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            exit: self.exit.clone(),
        }
    }
}

impl<E, A> fmt::Debug for RuntimeFiber<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeFiber")
            .field("id", &self.record.id())
            .field("status", &self.record.status())
            .field("daemon", &self.record.is_daemon())
            .finish()
    }
}

impl<E, A> RuntimeFiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    pub(crate) fn new(record: Arc<FiberRecord>, exit: Promise<E, A>) -> Self {
        Self { record, exit }
    }

    pub(crate) fn record(&self) -> &Arc<FiberRecord> {
        &self.record
    }

    /// The fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.record.id()
    }

    /// The fiber's current lifecycle status.
    #[must_use]
    pub fn status(&self) -> FiberStatus {
        self.record.status()
    }

    /// The fiber's own scope, which supervises the children it forks.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        self.record.scope()
    }

    /// Fibers that have requested this fiber's interruption.
    #[must_use]
    pub fn interruptors(&self) -> BTreeSet<FiberId> {
        self.record.interruptors()
    }

    /// Whether the fiber was forked into the global scope.
    #[must_use]
    pub fn is_daemon(&self) -> bool {
        self.record.is_daemon()
    }

    /// A diagnostic snapshot of the fiber.
    #[must_use]
    pub fn dump(&self) -> FiberDump {
        FiberDump::capture(&self.record)
    }

    /// Suspends the caller until the fiber is done and yields its exit.
    ///
    /// The returned future fails only if the *caller* is interrupted while
    /// waiting; the fiber's own failures are inside the [`Exit`].
    pub fn await_exit(&self, cx: &Cx) -> PromiseAwait<E, A> {
        self.record.mark_observed();
        self.exit.await_exit(cx)
    }

    /// Returns the exit if the fiber is done.
    #[must_use]
    pub fn poll(&self) -> Option<Exit<E, A>> {
        self.record.mark_observed();
        self.exit.poll()
    }

    /// Requests interruption attributed to `by` and waits for the fiber to
    /// finish.
    ///
    /// A finished fiber's exit is returned as is, with no request recorded.
    /// The wait itself cannot be interrupted: interruption is cooperative and
    /// the target may take a while to run its finalizers.
    pub async fn interrupt_as(&self, cx: &Cx, by: FiberId) -> Exit<E, A> {
        self.record.mark_observed();
        if let Some(exit) = self.exit.poll() {
            return exit;
        }
        self.record.request_interrupt(by);
        if cx.id() == self.id() {
            // A fiber waiting on itself can only leave through its own checkpoint.
            return self
                .exit
                .await_exit(cx)
                .await
                .unwrap_or_else(|interrupted| Exit::Failure(interrupted.into()));
        }
        cx.shielded(self.exit.await_exit(cx))
            .await
            .unwrap_or_else(|interrupted| Exit::Failure(interrupted.into()))
    }

    /// Interrupts the fiber on behalf of the caller and waits for it.
    pub async fn interrupt(&self, cx: &Cx) -> Exit<E, A> {
        self.interrupt_as(cx, cx.id()).await
    }

    /// Interrupts the fiber from a background daemon so the caller does not
    /// wait for it to finish.
    pub fn interrupt_fork(&self, cx: &Cx, by: FiberId) {
        self.record.mark_observed();
        let target = self.clone();
        let _ = cx.fork_daemon(move |cx: Cx| async move {
            target.interrupt_as(&cx, by).await;
            Ok::<_, Cause<()>>(())
        });
    }

    /// Waits for the fiber and yields its value, re-raising its cause on
    /// failure. On success the fiber's fiber-local values are joined into the
    /// caller.
    pub async fn join(&self, cx: &Cx) -> Result<A, Cause<E>> {
        let exit = self.await_exit(cx).await?;
        if exit.is_success() {
            self.inherit_refs(cx);
        }
        exit.into_result()
    }

    /// Joins the fiber's fiber-local values into the caller.
    pub fn inherit_refs(&self, cx: &Cx) {
        cx.inherit_refs(&self.record.refs());
    }

    /// A snapshot of the fiber's fiber-local values.
    #[must_use]
    pub fn refs(&self) -> FiberRefs {
        self.record.refs()
    }

    /// Reads one of the fiber's fiber-local values.
    #[must_use]
    pub fn get_ref<V>(&self, fiber_ref: &FiberRef<V>) -> V
    where
        V: Clone + Send + Sync + 'static,
    {
        self.record.with_state(|state| state.refs.get(fiber_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::test_utils::init_test_logging;
    use crate::types::Time;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn interrupting_a_finished_fiber_returns_its_exit() {
        init_test("interrupting_a_finished_fiber_returns_its_exit");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let child = cx.fork(|_cx: Cx| async move { Ok::<_, Cause<()>>(7) });
            let first = child.await_exit(&cx).await?;
            let again = child.interrupt(&cx).await;
            Ok::<_, Cause<()>>((first == again, child.interruptors().is_empty()))
        });
        assert_eq!(exit, Exit::succeed((true, true)));
        crate::test_complete!("interrupting_a_finished_fiber_returns_its_exit");
    }

    #[test]
    fn interrupt_as_attributes_and_waits() {
        init_test("interrupt_as_attributes_and_waits");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let child = cx.fork(|cx: Cx| async move {
                cx.sleep(Duration::from_secs(5)).await?;
                Ok::<_, Cause<()>>(())
            });
            cx.yield_now().await?;
            let culprit = FiberId::new(99, Time::ZERO);
            let exit = child.interrupt_as(&cx, culprit).await;
            Ok::<_, Cause<()>>((exit, cx.now()))
        });
        assert_eq!(
            exit,
            Exit::succeed((Exit::interrupt(FiberId::new(99, Time::ZERO)), Time::ZERO))
        );
        crate::test_complete!("interrupt_as_attributes_and_waits");
    }

    #[test]
    fn join_reraises_the_child_cause() {
        init_test("join_reraises_the_child_cause");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let child = cx.fork(|_cx: Cx| async move { Err::<u8, _>(Cause::fail("boom")) });
            child.join(&cx).await
        });
        assert_eq!(exit, Exit::fail("boom"));
        crate::test_complete!("join_reraises_the_child_cause");
    }

    #[test]
    fn interrupt_fork_returns_immediately() {
        init_test("interrupt_fork_returns_immediately");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let child = cx.fork(|cx: Cx| async move {
                cx.sleep(Duration::from_secs(5)).await?;
                Ok::<_, Cause<()>>(())
            });
            child.interrupt_fork(&cx, cx.id());
            let before = child.poll().is_none();
            let exit = child.await_exit(&cx).await?;
            Ok::<_, Cause<()>>((before, exit.interruptors().contains(&cx.id())))
        });
        assert_eq!(exit, Exit::succeed((true, true)));
        crate::test_complete!("interrupt_fork_returns_immediately");
    }

    #[test]
    fn panicking_body_becomes_a_defect() {
        init_test("panicking_body_becomes_a_defect");
        let rt = Runtime::new();
        let exit = rt.run(|cx: Cx| async move {
            let child = cx.fork(|_cx: Cx| async move {
                if true {
                    panic!("kaboom");
                }
                Ok::<u8, Cause<()>>(0)
            });
            let exit = child.await_exit(&cx).await?;
            Ok::<_, Cause<()>>(exit.cause().map(|c| c.defects().len()))
        });
        assert_eq!(exit, Exit::succeed(Some(1)));
        crate::test_complete!("panicking_body_becomes_a_defect");
    }
}
