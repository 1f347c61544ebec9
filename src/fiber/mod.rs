//! Fibers and the fiber algebra.
//!
//! A [`Fiber`] is either a [`RuntimeFiber`], scheduled by the runtime with a
//! real status and scope, or a [`SyntheticFiber`], derived from other fibers.
//! Both offer the same capabilities through [`FiberOps`]:
//!
//! | capability      | meaning                                                 |
//! |-----------------|---------------------------------------------------------|
//! | `await_exit`    | suspend until done; fails only if the *caller* is interrupted |
//! | `poll`          | non-blocking read of the exit                           |
//! | `interrupt_as`  | request interruption and wait; idempotent once done     |
//! | `refs`          | the fiber-local values the fiber would hand back        |
//! | `inherit_refs`  | join those values into the caller                       |
//!
//! The algebra (`map`, `cross_with`, `zip`, `collect_all`, ...) combines fibers
//! into synthetic ones without forking anything new.

pub mod algebra;
pub mod descriptor;
pub mod fiber_ref;
pub mod runtime_fiber;
pub mod synthetic;

pub use algebra::{await_all, interrupt_all, interrupt_all_as, join_all};
pub use descriptor::{FiberDescriptor, FiberDump};
pub use fiber_ref::{FiberRef, FiberRefs};
pub use runtime_fiber::RuntimeFiber;
pub use synthetic::SyntheticFiber;

use crate::cx::Cx;
use crate::types::{BoxFuture, Cause, Exit, FiberId, Interrupted};

/// The capabilities shared by every kind of fiber.
pub trait FiberOps<E, A>: Send + Sync {
    /// Suspends the caller until the fiber is done and yields its exit.
    fn await_exit(&self, cx: &Cx) -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>>;

    /// Returns the exit if the fiber is done.
    fn poll(&self) -> Option<Exit<E, A>>;

    /// Requests interruption attributed to `by` and waits for the fiber.
    fn interrupt_as(&self, cx: &Cx, by: FiberId) -> BoxFuture<'static, Exit<E, A>>;

    /// The fiber's fiber-local values.
    fn refs(&self) -> FiberRefs;

    /// Reads one fiber-local value.
    fn get_ref<V>(&self, fiber_ref: &FiberRef<V>) -> V
    where
        V: Clone + Send + Sync + 'static,
        Self: Sized,
    {
        self.refs().get(fiber_ref)
    }

    /// Joins the fiber's fiber-local values into the caller.
    fn inherit_refs(&self, cx: &Cx) {
        cx.inherit_refs(&self.refs());
    }
}

impl<E, A> FiberOps<E, A> for RuntimeFiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    fn await_exit(&self, cx: &Cx) -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>> {
        Box::pin(Self::await_exit(self, cx))
    }

    fn poll(&self) -> Option<Exit<E, A>> {
        Self::poll(self)
    }

    fn interrupt_as(&self, cx: &Cx, by: FiberId) -> BoxFuture<'static, Exit<E, A>> {
        let fiber = self.clone();
        let cx = cx.clone();
        Box::pin(async move { Self::interrupt_as(&fiber, &cx, by).await })
    }

    fn refs(&self) -> FiberRefs {
        Self::refs(self)
    }
}

impl<E, A> FiberOps<E, A> for SyntheticFiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    fn await_exit(&self, cx: &Cx) -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>> {
        Self::await_exit(self, cx)
    }

    fn poll(&self) -> Option<Exit<E, A>> {
        Self::poll(self)
    }

    fn interrupt_as(&self, cx: &Cx, by: FiberId) -> BoxFuture<'static, Exit<E, A>> {
        Self::interrupt_as(self, cx, by)
    }

    fn refs(&self) -> FiberRefs {
        Self::refs(self)
    }
}

/// A fiber of either kind.
pub enum Fiber<E, A> {
    /// A fiber scheduled by the runtime.
    Runtime(RuntimeFiber<E, A>),
    /// A fiber derived from other fibers.
    Synthetic(SyntheticFiber<E, A>),
}

impl<E, A> Clone for Fiber<E, A> {
    fn clone(&self) -> Self {
        match self {
            Self::Runtime(fiber) => Self::Runtime(fiber.clone()),
            Self::Synthetic(fiber) => Self::Synthetic(fiber.clone()),
        }
    }
}

impl<E, A> std::fmt::Debug for Fiber<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Runtime(fiber) => fiber.fmt(f),
            Self::Synthetic(fiber) => fiber.fmt(f),
        }
    }
}

impl<E, A> From<RuntimeFiber<E, A>> for Fiber<E, A> {
    fn from(fiber: RuntimeFiber<E, A>) -> Self {
        Self::Runtime(fiber)
    }
}

impl<E, A> From<SyntheticFiber<E, A>> for Fiber<E, A> {
    fn from(fiber: SyntheticFiber<E, A>) -> Self {
        Self::Synthetic(fiber)
    }
}

impl<E, A> Fiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    /// Dispatches on the fiber's kind.
    pub fn fold<R>(
        &self,
        on_runtime: impl FnOnce(&RuntimeFiber<E, A>) -> R,
        on_synthetic: impl FnOnce(&SyntheticFiber<E, A>) -> R,
    ) -> R {
        match self {
            Self::Runtime(fiber) => on_runtime(fiber),
            Self::Synthetic(fiber) => on_synthetic(fiber),
        }
    }

    /// The fiber's id, if it is a runtime fiber.
    #[must_use]
    pub fn id(&self) -> Option<FiberId> {
        self.fold(|fiber| Some(fiber.id()), |_| None)
    }

    /// Waits for the fiber and yields its value, re-raising its cause on
    /// failure. On success its fiber-local values are joined into the caller.
    pub async fn join(&self, cx: &Cx) -> Result<A, Cause<E>> {
        let exit = FiberOps::await_exit(self, cx).await?;
        if exit.is_success() {
            FiberOps::inherit_refs(self, cx);
        }
        exit.into_result()
    }

    /// Interrupts the fiber on behalf of the caller and waits for it.
    pub async fn interrupt(&self, cx: &Cx) -> Exit<E, A> {
        FiberOps::interrupt_as(self, cx, cx.id()).await
    }
}

impl<E, A> FiberOps<E, A> for Fiber<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    fn await_exit(&self, cx: &Cx) -> BoxFuture<'static, Result<Exit<E, A>, Interrupted>> {
        self.fold(
            |fiber| FiberOps::await_exit(fiber, cx),
            |fiber| fiber.await_exit(cx),
        )
    }

    fn poll(&self) -> Option<Exit<E, A>> {
        self.fold(RuntimeFiber::poll, SyntheticFiber::poll)
    }

    fn interrupt_as(&self, cx: &Cx, by: FiberId) -> BoxFuture<'static, Exit<E, A>> {
        self.fold(
            |fiber| FiberOps::interrupt_as(fiber, cx, by),
            |fiber| fiber.interrupt_as(cx, by),
        )
    }

    fn refs(&self) -> FiberRefs {
        self.fold(RuntimeFiber::refs, SyntheticFiber::refs)
    }
}
