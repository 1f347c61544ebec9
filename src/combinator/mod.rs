//! Combinators for structured concurrency.
//!
//! Everything here is built from the fiber primitives on [`Cx`]: forks,
//! interruptibility masks, fork-scope transplanting and promises.
//!
//! - [`foreach`]: Parallel traversal, bounded or unbounded, fail-fast
//! - [`race`]: Run multiple effects in parallel, first success wins
//! - [`zip`]: Run two effects in parallel, keep both values
//! - [`timeout`]: Add a deadline to an effect
//! - [`bracket`](mod@bracket): Acquire/use/release resource safety pattern

pub mod bracket;
pub mod foreach;
pub mod race;
pub mod timeout;
pub mod zip;

pub use bracket::{bracket_exit, ensuring, on_exit};
pub use foreach::{
    collect_all_par, collect_all_par_n, foreach_par, foreach_par_discard, foreach_par_n,
    foreach_par_unbounded,
};
pub use race::{race, race_all, InterruptStrategy};
pub use timeout::timeout;
pub use zip::{zip_par, zip_with_par};

use crate::cx::Cx;
use crate::types::{BoxFuture, Cause};
use std::future::Future;

/// A boxed effect, for mixing effects of different closure types in one
/// collection.
pub type Effect<E, A> = Box<dyn FnOnce(Cx) -> BoxFuture<'static, Result<A, Cause<E>>> + Send>;

/// Boxes an effect.
///
/// ```ignore
/// let contenders = [
///     effect(|cx: Cx| async move { fetch_primary(&cx).await }),
///     effect(|cx: Cx| async move { fetch_replica(&cx).await }),
/// ];
/// let value = race_all(&cx, contenders, InterruptStrategy::Wait).await?;
/// ```
pub fn effect<E, A, F, Fut>(f: F) -> Effect<E, A>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
{
    Box::new(move |cx: Cx| -> BoxFuture<'static, Result<A, Cause<E>>> { Box::pin(f(cx)) })
}
