//! Bracket combinator for resource safety.
//!
//! The bracket pattern ensures that resources are always released, even when
//! the use step fails or the fiber is interrupted. Acquisition and release run
//! uninterruptibly; only the use step sees the caller's interrupt status.
//!
//! ```text
//! bracket_exit(acquire, use, release):
//!   uninterruptible_mask(restore =>
//!     r    ← acquire                    // not interruptible
//!     exit ← restore(use(r))            // caller's status
//!     release(r, exit)                  // not interruptible
//!     exit)
//! ```
//!
//! A failing release is sequenced after the use step's cause with
//! [`Cause::then`]; after a successful use it becomes the result.

use crate::cx::Cx;
use crate::types::{Cause, Exit};
use std::future::Future;

/// Acquires a resource, uses it, and releases it with the use step's exit.
///
/// # Example
/// ```ignore
/// let total = bracket_exit(
///     &cx,
///     |cx: Cx| async move { open_ledger(&cx).await },
///     |cx: Cx, ledger: Ledger| async move { ledger.sum(&cx).await },
///     |_cx: Cx, ledger: Ledger, exit: Exit<LedgerError, u64>| async move {
///         ledger.close(exit.is_success());
///         Ok(())
///     },
/// )
/// .await?;
/// ```
pub async fn bracket_exit<E, R, A, Acq, AcqFut, Use, UseFut, Rel, RelFut>(
    cx: &Cx,
    acquire: Acq,
    use_fn: Use,
    release: Rel,
) -> Result<A, Cause<E>>
where
    E: Clone,
    A: Clone,
    R: Clone,
    Acq: FnOnce(Cx) -> AcqFut,
    AcqFut: Future<Output = Result<R, Cause<E>>>,
    Use: FnOnce(Cx, R) -> UseFut,
    UseFut: Future<Output = Result<A, Cause<E>>>,
    Rel: FnOnce(Cx, R, Exit<E, A>) -> RelFut,
    RelFut: Future<Output = Result<(), Cause<E>>>,
{
    let cx = cx.clone();
    cx.clone()
        .uninterruptible_mask(move |restore| async move {
            let resource = acquire(cx.clone()).await?;
            let exit = Exit::from(restore.run(&cx, use_fn(cx.clone(), resource.clone())).await);
            match (release(cx.clone(), resource, exit.clone()).await, exit) {
                (Ok(()), exit) => exit.into_result(),
                (Err(released), Exit::Success(_)) => Err(released),
                (Err(released), Exit::Failure(cause)) => Err(cause.then(released)),
            }
        })
        .await
}

/// Runs `effect`, then `cleanup` with its exit, whatever the outcome.
///
/// `cleanup` runs uninterruptibly and cannot change the result.
pub async fn on_exit<E, A, F, Fut, G, GFut>(cx: &Cx, effect: F, cleanup: G) -> Result<A, Cause<E>>
where
    E: Clone,
    A: Clone,
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Result<A, Cause<E>>>,
    G: FnOnce(Cx, Exit<E, A>) -> GFut,
    GFut: Future<Output = ()>,
{
    bracket_exit(
        cx,
        |_cx: Cx| async { Ok::<_, Cause<E>>(()) },
        move |cx: Cx, ()| effect(cx),
        move |cx: Cx, (), exit: Exit<E, A>| async move {
            cleanup(cx, exit).await;
            Ok(())
        },
    )
    .await
}

/// Runs `effect`, then `finalizer`, whatever the outcome.
pub async fn ensuring<E, A, F, Fut, G, GFut>(cx: &Cx, effect: F, finalizer: G) -> Result<A, Cause<E>>
where
    E: Clone,
    A: Clone,
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Result<A, Cause<E>>>,
    G: FnOnce(Cx) -> GFut,
    GFut: Future<Output = ()>,
{
    on_exit(cx, effect, move |cx: Cx, _exit: Exit<E, A>| finalizer(cx)).await
}
