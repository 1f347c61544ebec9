//! Interruptibility regions and interruption combinators.
//!
//! The interrupt status is lexically scoped: [`Cx::set_interrupt_status`]
//! installs a flag for the duration of one future and the ambient flag is back
//! in force as soon as that future completes. Regions nest like a stack.
//!
//! Entering an interruptible region, and leaving an uninterruptible one into an
//! interruptible ambient, are both checkpoints: an interruption queued while
//! the fiber was shielded is delivered there.
//!
//! # Masks
//!
//! [`Cx::uninterruptible_mask`] runs its body uninterruptibly and hands it an
//! [`InterruptRestore`] that reinstates the flag the mask saw on entry. Only
//! that flag: a restore from an inner mask never reaches past its own mask.
//!
//! ```ignore
//! cx.uninterruptible_mask(|restore| async move {
//!     let resource = acquire(&cx).await?;          // not interruptible
//!     let out = restore.run(&cx, use_it(&cx)).await; // ambient flag again
//!     release(&cx, resource).await;                // not interruptible
//!     out
//! })
//! ```

use super::region::{LocalOverride, Region};
use super::Cx;
use crate::types::{Cause, Exit, FiberId, InterruptStatus, Interrupted};
use std::collections::BTreeSet;
use std::future::Future;

/// Reinstates the interrupt status captured when a mask was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptRestore {
    status: InterruptStatus,
}

impl InterruptRestore {
    /// The interrupt status this restore reinstates.
    #[must_use]
    pub const fn status(self) -> InterruptStatus {
        self.status
    }

    /// Runs `fut` under the captured interrupt status.
    pub fn run<F, T, C>(self, cx: &Cx, fut: F) -> impl Future<Output = Result<T, C>>
    where
        F: Future<Output = Result<T, C>>,
        C: From<Interrupted>,
    {
        cx.set_interrupt_status(self.status, fut)
    }
}

impl Cx {
    /// Runs `fut` uninterruptibly, with no checkpoint on entry or exit.
    pub(crate) fn shielded<F: Future>(&self, fut: F) -> Region<F> {
        Region::new(
            std::sync::Arc::clone(self.record()),
            LocalOverride::InterruptStatus(InterruptStatus::Uninterruptible),
            fut,
        )
    }

    /// Runs `fut` with the interrupt status set to `status`.
    ///
    /// Entering an interruptible region with an interruption pending fails
    /// with that interruption before `fut` is polled. Leaving an
    /// uninterruptible region into an interruptible ambient replaces a
    /// successful result with the pending interruption; a failure keeps its
    /// own cause.
    pub fn set_interrupt_status<F, T, C>(
        &self,
        status: InterruptStatus,
        fut: F,
    ) -> impl Future<Output = Result<T, C>>
    where
        F: Future<Output = Result<T, C>>,
        C: From<Interrupted>,
    {
        let cx = self.clone();
        let region = Region::new(
            std::sync::Arc::clone(self.record()),
            LocalOverride::InterruptStatus(status),
            fut,
        );
        async move {
            if status.is_interruptible() {
                cx.checkpoint()?;
            }
            let result = region.await;
            if !status.is_interruptible() && result.is_ok() {
                cx.checkpoint()?;
            }
            result
        }
    }

    /// Runs `fut` interruptibly.
    pub fn interruptible<F, T, C>(&self, fut: F) -> impl Future<Output = Result<T, C>>
    where
        F: Future<Output = Result<T, C>>,
        C: From<Interrupted>,
    {
        self.set_interrupt_status(InterruptStatus::Interruptible, fut)
    }

    /// Runs `fut` uninterruptibly.
    pub fn uninterruptible<F, T, C>(&self, fut: F) -> impl Future<Output = Result<T, C>>
    where
        F: Future<Output = Result<T, C>>,
        C: From<Interrupted>,
    {
        self.set_interrupt_status(InterruptStatus::Uninterruptible, fut)
    }

    /// Runs `f(restore)` uninterruptibly, where `restore` reinstates the
    /// interrupt status in force when the mask was entered.
    pub fn uninterruptible_mask<F, Fut, T, C>(&self, f: F) -> impl Future<Output = Result<T, C>>
    where
        F: FnOnce(InterruptRestore) -> Fut,
        Fut: Future<Output = Result<T, C>>,
        C: From<Interrupted>,
    {
        let cx = self.clone();
        async move {
            let restore = InterruptRestore {
                status: cx.interrupt_status(),
            };
            cx.uninterruptible(f(restore)).await
        }
    }

    /// Runs `f(restore)` interruptibly, where `restore` reinstates the
    /// interrupt status in force when the mask was entered.
    pub fn interruptible_mask<F, Fut, T, C>(&self, f: F) -> impl Future<Output = Result<T, C>>
    where
        F: FnOnce(InterruptRestore) -> Fut,
        Fut: Future<Output = Result<T, C>>,
        C: From<Interrupted>,
    {
        let cx = self.clone();
        async move {
            let restore = InterruptRestore {
                status: cx.interrupt_status(),
            };
            cx.interruptible(f(restore)).await
        }
    }

    /// Runs `cleanup` with the interruptors if `fut` ends interrupted, then
    /// fails with the original cause.
    ///
    /// The cleanup itself runs uninterruptibly.
    pub fn on_interrupt<Fut, A, E, G, GFut>(
        &self,
        fut: Fut,
        cleanup: G,
    ) -> impl Future<Output = Result<A, Cause<E>>>
    where
        Fut: Future<Output = Result<A, Cause<E>>>,
        G: FnOnce(BTreeSet<FiberId>) -> GFut,
        GFut: Future<Output = ()>,
    {
        let cx = self.clone();
        self.uninterruptible_mask(move |restore| async move {
            match restore.run(&cx, fut).await {
                Err(cause) if cause.interrupted() => {
                    cleanup(cause.interruptors()).await;
                    Err(cause)
                }
                other => other,
            }
        })
    }

    /// Runs `f` on a daemon fiber and waits for it, but lets the caller's own
    /// interruption return immediately.
    ///
    /// When the caller is interrupted the child is interrupted on a separate
    /// background daemon, so the caller never waits for the child to unwind.
    pub fn disconnect<E, A, F, Fut>(&self, f: F) -> impl Future<Output = Result<A, Cause<E>>>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        let cx = self.clone();
        self.uninterruptible_mask(move |restore| async move {
            let child = cx.fork_daemon(move |child_cx: Cx| async move {
                let body = f(child_cx.clone());
                restore.run(&child_cx, body).await
            });
            match restore.run(&cx, child.await_exit(&cx)).await {
                Ok(exit) => join_exit(&cx, &child, exit),
                Err(interrupted) => {
                    child.interrupt_fork(&cx, cx.id());
                    Err(interrupted.into())
                }
            }
        })
    }

    /// Runs `f` with its lifetime bound to `scope` instead of the caller.
    ///
    /// `f` runs on a daemon fiber whose scope `scope` is extended with, so
    /// closing `scope` interrupts it. If the caller is interrupted while
    /// waiting, the interruption is forwarded to the child, attributed to the
    /// caller's first interruptor, and the caller waits for it to finish.
    pub fn in_scope<E, A, F, Fut>(
        &self,
        scope: &crate::scope::Scope,
        f: F,
    ) -> impl Future<Output = Result<A, Cause<E>>>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        let cx = self.clone();
        let scope = scope.clone();
        self.uninterruptible_mask(move |restore| async move {
            let child = cx.fork_daemon(move |child_cx: Cx| async move {
                let body = f(child_cx.clone());
                restore.run(&child_cx, body).await
            });
            if !scope.extend(child.scope()) {
                child.record().request_interrupt(cx.id());
            }
            match restore.run(&cx, child.await_exit(&cx)).await {
                Ok(exit) => join_exit(&cx, &child, exit),
                Err(interrupted) => {
                    let by = interrupted
                        .interruptors()
                        .first()
                        .copied()
                        .unwrap_or_else(|| cx.id());
                    child.interrupt_as(&cx, by).await;
                    Err(interrupted.into())
                }
            }
        })
    }
}

/// Finishes a join: on success the child's fiber-local values flow back.
fn join_exit<E, A>(
    cx: &Cx,
    child: &crate::fiber::RuntimeFiber<E, A>,
    exit: Exit<E, A>,
) -> Result<A, Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    if exit.is_success() {
        child.inherit_refs(cx);
    }
    exit.into_result()
}
